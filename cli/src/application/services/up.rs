//! Application service — `bbl up`.
//!
//! Imports only from `crate::domain` and `crate::application`.
//! All I/O is routed through injected port traits.

use anyhow::Result;

use crate::application::ports::{DirectorDeployer, InfrastructureActuator, Ports, StateStore};
use crate::application::services::steps::{InfrastructurePath, Run, Step};
use crate::domain::config::{self, AwsFlags, GcpFlags};
use crate::domain::state::{Iaas, State};
use crate::domain::{BblError, env_id, preflight};

/// Options accepted by `bbl up`, already merged with environment variables.
#[derive(Debug, Clone, Default)]
pub struct UpOptions {
    pub iaas: Option<Iaas>,
    pub name: Option<String>,
    pub no_director: bool,
    /// Contents of `--ops-file` arguments.
    pub ops_files: Vec<String>,
    pub aws: AwsFlags,
    pub gcp: GcpFlags,
    pub aws_bosh_az: Option<String>,
    /// Use the template actuator for a new AWS environment.
    pub terraform: bool,
}

const INFRASTRUCTURE_STEPS: &[Step] = &[
    Step::GenerateEnvId,
    Step::EnsureKeyPair,
    Step::ApplyInfrastructure,
];

const DIRECTOR_STEPS: &[Step] = &[
    Step::GenerateDirectorCredentials,
    Step::InterpolateManifest,
    Step::CreateDirector,
    Step::UploadCloudConfig,
];

/// Create or converge the environment.
///
/// Every pre-flight check runs before the first write, so a rejected
/// invocation leaves the state file untouched.
///
/// # Errors
///
/// Returns pre-flight errors, or the error of the first failing step.
pub async fn up(ports: &impl Ports, opts: UpOptions) -> Result<State> {
    let mut state = ports.store().load().await?.unwrap_or_default();
    state.validate()?;
    preflight::check_director_has_infrastructure(&state)?;

    let iaas = config::resolve_iaas(opts.iaas, &state)?;
    if let Some(name) = &opts.name {
        if !state.env_id.is_empty() && state.env_id != *name {
            return Err(BblError::EnvIdMismatch {
                current: state.env_id.clone(),
            }
            .into());
        }
        env_id::validate_name(name)?;
    }

    if opts.no_director && state.has_director() {
        return Err(BblError::DirectorExists.into());
    }
    let no_director = opts.no_director || state.no_director;
    if !no_director {
        preflight::check_bosh_version(&ports.deployer().version().await?)?;
    }

    match iaas {
        Iaas::Aws => state.aws = config::resolve_aws(&opts.aws, &state.aws)?,
        Iaas::Gcp => state.gcp = config::resolve_gcp(&opts.gcp, &state.gcp)?,
    }
    state.iaas = Some(iaas);

    let path = InfrastructurePath::select(&state, opts.terraform);
    if path == InfrastructurePath::Template {
        preflight::check_terraform_version(&ports.infrastructure().version().await?)?;
    }

    state.no_director = no_director;
    if !opts.ops_files.is_empty() {
        state.bosh.user_ops_files = opts.ops_files;
    }

    let mut run = Run::new(ports, state, path)
        .with_env_id(opts.name)
        .with_bosh_az(opts.aws_bosh_az);
    run.execute(INFRASTRUCTURE_STEPS).await?;
    if !no_director {
        run.execute(DIRECTOR_STEPS).await?;
    }
    Ok(run.into_state())
}
