//! Read-only views over the state document.
//!
//! None of these write state. Missing fields surface as `MissingField`,
//! which renders as "Could not retrieve <field>, please make sure you are
//! targeting the proper state dir."

use anyhow::{Context, Result};

use crate::application::ports::Ports;
use crate::application::services::steps::{self, InfrastructurePath};
use crate::domain::state::State;
use crate::domain::{BblError, cloud_config, director_vars};

/// A state field exposed by a read-only command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    EnvId,
    DirectorAddress,
    DirectorUsername,
    DirectorPassword,
    DirectorCaCert,
    SshKey,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Self::EnvId => "environment id",
            Self::DirectorAddress => "director address",
            Self::DirectorUsername => "director username",
            Self::DirectorPassword => "director password",
            Self::DirectorCaCert => "director ca cert",
            Self::SshKey => "ssh key",
        }
    }

    fn value(self, state: &State) -> &str {
        match self {
            Self::EnvId => &state.env_id,
            Self::DirectorAddress => &state.bosh.director_address,
            Self::DirectorUsername => &state.bosh.director_username,
            Self::DirectorPassword => &state.bosh.director_password,
            Self::DirectorCaCert => &state.bosh.director_ssl_ca,
            Self::SshKey => &state.key_pair.private_key,
        }
    }
}

/// Fetch a required field.
///
/// # Errors
///
/// Returns `MissingField` when the field is empty.
pub fn field(state: &State, field: Field) -> Result<&str> {
    let value = field.value(state);
    if value.is_empty() {
        return Err(BblError::MissingField(field.label()).into());
    }
    Ok(value)
}

/// Shell-sourceable exports for the BOSH CLI.
///
/// # Errors
///
/// Returns `MissingField` for an environment without a director.
pub fn print_env(state: &State) -> Result<String> {
    Ok(format!(
        "export BOSH_CLIENT={}\nexport BOSH_CLIENT_SECRET={}\nexport BOSH_CA_CERT='{}'\nexport BOSH_ENVIRONMENT={}",
        field(state, Field::DirectorUsername)?,
        field(state, Field::DirectorPassword)?,
        field(state, Field::DirectorCaCert)?,
        field(state, Field::DirectorAddress)?,
    ))
}

/// Deployment vars the director was (or would be) deployed with.
///
/// # Errors
///
/// Returns an error if no infrastructure exists or its outputs are incomplete.
pub async fn deployment_vars(ports: &impl Ports, state: &State) -> Result<String> {
    let outputs = infrastructure_outputs(ports, state).await?;
    director_vars::deployment_vars(state, &outputs)
}

/// Cloud-config for the current infrastructure and load balancer.
///
/// # Errors
///
/// Returns an error if no infrastructure exists or its outputs are incomplete.
pub async fn cloud_config(ports: &impl Ports, state: &State) -> Result<String> {
    let outputs = infrastructure_outputs(ports, state).await?;
    cloud_config::generate(state, &outputs)
}

async fn infrastructure_outputs(ports: &impl Ports, state: &State) -> Result<crate::domain::Outputs> {
    if !state.has_infrastructure() {
        return Err(BblError::MissingField("infrastructure outputs").into());
    }
    let path = InfrastructurePath::select(state, false);
    steps::current_outputs(ports, state, path)
        .await
        .context("reading infrastructure outputs")
}
