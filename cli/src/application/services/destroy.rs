//! Application service — `bbl destroy`.

use anyhow::Result;

use crate::application::ports::{
    DirectorDeployer, InfrastructureActuator, Ports, ProgressReporter, Prompter, StateStore,
};
use crate::application::services::steps::{InfrastructurePath, Run, Step};
use crate::domain::state::Bosh;
use crate::domain::{BblError, preflight};

#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyOptions {
    pub skip_if_missing: bool,
    pub no_confirm: bool,
}

/// How `destroy` finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// No state file, and `--skip-if-missing` was given.
    Missing,
    Destroyed,
}

/// Tear down the director, infrastructure, certificate and keypair, then
/// remove the state file.
///
/// # Errors
///
/// Returns `NotFound` when there is no state, `UserAborted` when the
/// operator declines, or the error of the first failing step.
pub async fn destroy(
    ports: &impl Ports,
    prompter: &impl Prompter,
    opts: DestroyOptions,
) -> Result<DestroyOutcome> {
    let Some(state) = ports.store().load().await? else {
        if opts.skip_if_missing {
            ports.reporter().step(&format!(
                "state file not found in {}, and --skip-if-missing flag provided, exiting",
                ports.store().dir().display()
            ));
            return Ok(DestroyOutcome::Missing);
        }
        return Err(BblError::NotFound {
            dir: ports.store().dir().display().to_string(),
        }
        .into());
    };
    state.validate()?;

    if !opts.no_confirm {
        let question = format!(
            "Are you sure you want to delete infrastructure for {}? This operation cannot be undone!",
            state.env_id
        );
        if !prompter.confirm(&question).await? {
            return Err(BblError::UserAborted.into());
        }
    }

    let path = InfrastructurePath::select(&state, false);
    if state.has_director() {
        preflight::check_bosh_version(&ports.deployer().version().await?)?;
    }
    if !state.tf_state.is_empty() {
        preflight::check_terraform_version(&ports.infrastructure().version().await?)?;
    }

    let mut run = Run::new(ports, state, path);
    run.execute(&[Step::DeleteDirector]).await?;

    if let Err(error) = run.execute(&[Step::DestroyInfrastructure]).await {
        run.update(|state| state.bosh = Bosh::default());
        run.checkpoint().await?;
        return Err(error);
    }

    run.execute(&[Step::DeleteCertificate]).await?;

    if let Err(error) = run.execute(&[Step::DeleteKeyPair]).await {
        run.update(|state| {
            state.stack.name.clear();
            state.stack.lb_type.clear();
        });
        run.checkpoint().await?;
        return Err(error);
    }

    run.execute(&[Step::RemoveStateFile]).await?;
    Ok(DestroyOutcome::Destroyed)
}
