//! Application service — `bbl rotate`.

use anyhow::Result;

use crate::application::ports::{DirectorDeployer, InfrastructureActuator, Ports, StateStore};
use crate::application::services::steps::{InfrastructurePath, Run, Step};
use crate::domain::state::State;
use crate::domain::preflight;

/// Replace the SSH keypair and propagate it to the infrastructure and, when
/// present, the director host.
///
/// # Errors
///
/// Returns `NotFound` when there is no state, or the error of a failing step.
pub async fn rotate(ports: &impl Ports) -> Result<State> {
    let state = ports.store().read().await?;
    state.validate()?;
    preflight::check_director_has_infrastructure(&state)?;

    let redeploy = state.has_director() && !state.no_director;
    if redeploy {
        preflight::check_bosh_version(&ports.deployer().version().await?)?;
    }
    let path = InfrastructurePath::select(&state, false);
    if path == InfrastructurePath::Template {
        preflight::check_terraform_version(&ports.infrastructure().version().await?)?;
    }

    let mut run = Run::new(ports, state, path);
    run.execute(&[Step::RotateKeyPair, Step::ApplyInfrastructure])
        .await?;
    if redeploy {
        run.execute(&[Step::InterpolateManifest, Step::CreateDirector])
            .await?;
    }
    Ok(run.into_state())
}
