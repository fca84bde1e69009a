//! Read-only commands: `env-id`, `director-*`, `ssh-key`, `print-env`,
//! `bosh-deployment-vars` and `cloud-config`.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::{Ports, StateStore};
use crate::application::services::queries::{self, Field};

/// Print a single state field.
///
/// # Errors
///
/// Returns `NotFound` without state, or `MissingField` when the field is empty.
pub async fn field(app: &AppContext, field: Field) -> Result<()> {
    let state = app.store().read().await?;
    app.output.value(queries::field(&state, field)?);
    Ok(())
}

/// Deprecated alias of `director-ca-cert`.
///
/// # Errors
///
/// As for [`field`].
pub async fn bosh_ca_cert(app: &AppContext) -> Result<()> {
    app.output.warn(
        "'bosh-ca-cert' has been deprecated and will be removed in future versions of bbl, please use 'director-ca-cert'",
    );
    field(app, Field::DirectorCaCert).await
}

/// Print shell exports for the BOSH CLI.
///
/// # Errors
///
/// Returns `NotFound` without state, or `MissingField` without a director.
pub async fn print_env(app: &AppContext) -> Result<()> {
    let state = app.store().read().await?;
    app.output.value(&queries::print_env(&state)?);
    Ok(())
}

/// Print the director deployment vars.
///
/// # Errors
///
/// Returns an error without state or infrastructure outputs.
pub async fn deployment_vars(app: &AppContext) -> Result<()> {
    let state = app.store().read().await?;
    let vars = queries::deployment_vars(app, &state).await?;
    app.output.value(vars.trim_end());
    Ok(())
}

/// Print the cloud-config.
///
/// # Errors
///
/// Returns an error without state or infrastructure outputs.
pub async fn cloud_config(app: &AppContext) -> Result<()> {
    let state = app.store().read().await?;
    let cloud_config = queries::cloud_config(app, &state).await?;
    app.output.value(cloud_config.trim_end());
    Ok(())
}
