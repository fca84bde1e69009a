//! `bbl up` — create or converge the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::services::up::{self, UpOptions};
use crate::domain::config::{AwsFlags, GcpFlags};
use crate::domain::Iaas;

/// Arguments for the up command.
#[derive(Args, Debug, Default)]
pub struct UpArgs {
    /// IAAS to deploy your BOSH director onto
    #[arg(long, env = "BBL_IAAS", value_parser = parse_iaas)]
    pub iaas: Option<Iaas>,

    /// Name to assign to your BOSH director (optional, will be randomly generated)
    #[arg(long)]
    pub name: Option<String>,

    /// Skip BOSH director creation
    #[arg(long)]
    pub no_director: bool,

    /// Path to BOSH ops file (repeatable)
    #[arg(long = "ops-file", value_name = "PATH")]
    pub ops_files: Vec<PathBuf>,

    /// AWS access key id to use
    #[arg(long, env = "BBL_AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key to use
    #[arg(long, env = "BBL_AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    /// AWS region to use
    #[arg(long, env = "BBL_AWS_REGION")]
    pub aws_region: Option<String>,

    /// AWS availability zone to use for BOSH director
    #[arg(long)]
    pub aws_bosh_az: Option<String>,

    /// GCP service account key: a path, or the key JSON itself
    #[arg(long, env = "BBL_GCP_SERVICE_ACCOUNT_KEY", hide_env_values = true)]
    pub gcp_service_account_key: Option<String>,

    /// GCP project ID to use
    #[arg(long, env = "BBL_GCP_PROJECT_ID")]
    pub gcp_project_id: Option<String>,

    /// GCP zone to use
    #[arg(long, env = "BBL_GCP_ZONE")]
    pub gcp_zone: Option<String>,

    /// GCP region to use
    #[arg(long, env = "BBL_GCP_REGION")]
    pub gcp_region: Option<String>,

    /// Provision AWS infrastructure from terraform templates instead of CloudFormation
    #[arg(long)]
    pub terraform: bool,
}

fn parse_iaas(s: &str) -> Result<Iaas> {
    s.parse()
}

/// Run `bbl up`.
///
/// # Errors
///
/// Returns an error if an ops file or service account key cannot be read,
/// or the up service fails.
pub async fn run(app: &AppContext, args: UpArgs) -> Result<()> {
    let ops_files = args
        .ops_files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("reading ops file {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let service_account_key = args
        .gcp_service_account_key
        .as_deref()
        .map(read_service_account_key)
        .transpose()?;

    let opts = UpOptions {
        iaas: args.iaas,
        name: args.name,
        no_director: args.no_director,
        ops_files,
        aws: AwsFlags {
            access_key_id: args.aws_access_key_id,
            secret_access_key: args.aws_secret_access_key,
            region: args.aws_region,
        },
        gcp: GcpFlags {
            service_account_key,
            project_id: args.gcp_project_id,
            region: args.gcp_region,
            zone: args.gcp_zone,
        },
        aws_bosh_az: args.aws_bosh_az,
        terraform: args.terraform,
    };
    up::up(app, opts).await?;
    Ok(())
}

/// Accept either a path to the key file or the key JSON itself.
fn read_service_account_key(value: &str) -> Result<String> {
    if value.trim_start().starts_with('{') {
        return Ok(value.to_string());
    }
    let path = Path::new(value);
    std::fs::read_to_string(path)
        .with_context(|| format!("error reading service account key from {}", path.display()))
}
