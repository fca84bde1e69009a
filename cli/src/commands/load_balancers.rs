//! `bbl create-lbs`, `update-lbs`, `delete-lbs` and `lbs`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::{Ports, StateStore};
use crate::application::services::load_balancers::{self, CreateLbsOptions, UpdateLbsOptions};
use crate::domain::CertificateMaterial;

/// Arguments for the create-lbs command.
#[derive(Args, Debug, Default)]
pub struct CreateLbsArgs {
    /// Load balancer(s) type. Valid options: "concourse" or "cf"
    #[arg(long = "type", value_name = "TYPE", default_value = "")]
    pub lb_type: String,

    #[command(flatten)]
    pub certificate: CertificateArgs,

    /// Skip creation if load balancer already exists
    #[arg(long)]
    pub skip_if_exists: bool,
}

/// Arguments for the update-lbs command.
#[derive(Args, Debug, Default)]
pub struct UpdateLbsArgs {
    #[command(flatten)]
    pub certificate: CertificateArgs,

    /// Skip update if load balancer does not exist
    #[arg(long)]
    pub skip_if_missing: bool,
}

/// Arguments for the delete-lbs command.
#[derive(Args, Debug, Default)]
pub struct DeleteLbsArgs {
    /// Skip deletion if load balancer does not exist
    #[arg(long)]
    pub skip_if_missing: bool,
}

/// Certificate files shared by `create-lbs` and `update-lbs`.
#[derive(Args, Debug, Default)]
pub struct CertificateArgs {
    /// Path to SSL certificate
    #[arg(long, value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Path to SSL certificate key
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Path to SSL certificate chain (optional)
    #[arg(long, value_name = "PATH")]
    pub chain: Option<PathBuf>,
}

impl CertificateArgs {
    fn read(&self) -> Result<CertificateMaterial> {
        Ok(CertificateMaterial {
            cert: read_optional(self.cert.as_deref())?,
            key: read_optional(self.key.as_deref())?,
            chain: read_optional(self.chain.as_deref())?,
        })
    }
}

fn read_optional(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Ok(String::new()),
    }
}

/// Run `bbl create-lbs`.
///
/// # Errors
///
/// Returns an error if a certificate file cannot be read or the service fails.
pub async fn create(app: &AppContext, args: &CreateLbsArgs) -> Result<()> {
    let opts = CreateLbsOptions {
        lb_type: args.lb_type.clone(),
        material: args.certificate.read()?,
        skip_if_exists: args.skip_if_exists,
    };
    load_balancers::create_lbs(app, opts).await
}

/// Run `bbl update-lbs`.
///
/// # Errors
///
/// Returns an error if a certificate file cannot be read or the service fails.
pub async fn update(app: &AppContext, args: &UpdateLbsArgs) -> Result<()> {
    let opts = UpdateLbsOptions {
        material: args.certificate.read()?,
        skip_if_missing: args.skip_if_missing,
    };
    load_balancers::update_lbs(app, opts).await
}

/// Run `bbl delete-lbs`.
///
/// # Errors
///
/// Returns the error of the delete service.
pub async fn delete(app: &AppContext, args: &DeleteLbsArgs) -> Result<()> {
    load_balancers::delete_lbs(app, args.skip_if_missing).await
}

/// Run `bbl lbs`.
///
/// # Errors
///
/// Returns an error if there is no state, no LB is attached, or its
/// endpoints cannot be read.
pub async fn list(app: &AppContext) -> Result<()> {
    let state = app.store().read().await?;
    for (label, endpoint) in load_balancers::lb_endpoints(app, &state).await? {
        app.output.kv(label, &endpoint);
    }
    Ok(())
}
