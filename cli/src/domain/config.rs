//! IaaS configuration resolution for `bbl up`.
//!
//! Pure functions only — no I/O, no async, no filesystem access. Flag and
//! environment values (already merged by clap) take precedence over values
//! persisted in state; a missing value that state cannot supply is a
//! pre-flight error.

use anyhow::Result;

use crate::domain::error::BblError;
use crate::domain::state::{AwsConfig, GcpConfig, Iaas, State};

/// AWS settings supplied via flags or `BBL_AWS_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct AwsFlags {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: Option<String>,
}

/// GCP settings supplied via flags or `BBL_GCP_*` environment variables.
///
/// `service_account_key` holds the key JSON itself, not a path.
#[derive(Debug, Clone, Default)]
pub struct GcpFlags {
    pub service_account_key: Option<String>,
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
}

/// Determine the IaaS for this invocation.
///
/// # Errors
///
/// Returns `IaasMismatch` when the requested IaaS differs from the persisted one,
/// or `MissingFlag` when neither source provides a value.
pub fn resolve_iaas(requested: Option<Iaas>, state: &State) -> Result<Iaas> {
    match (requested, state.iaas) {
        (Some(requested), Some(current)) if requested != current => Err(BblError::IaasMismatch {
            current: current.to_string(),
        }
        .into()),
        (Some(iaas), _) | (None, Some(iaas)) => Ok(iaas),
        (None, None) => Err(BblError::MissingFlag { flag: "--iaas" }.into()),
    }
}

/// Merge AWS flags over the persisted AWS configuration.
///
/// # Errors
///
/// Returns an error when a required value is missing or the region would change.
pub fn resolve_aws(flags: &AwsFlags, current: &AwsConfig) -> Result<AwsConfig> {
    let region = pick(flags.region.as_deref(), &current.region, "--aws-region")?;
    ensure_region_unchanged(&current.region, &region)?;
    Ok(AwsConfig {
        access_key_id: pick(
            flags.access_key_id.as_deref(),
            &current.access_key_id,
            "--aws-access-key-id",
        )?,
        secret_access_key: pick(
            flags.secret_access_key.as_deref(),
            &current.secret_access_key,
            "--aws-secret-access-key",
        )?,
        region,
    })
}

/// Merge GCP flags over the persisted GCP configuration.
///
/// When no project ID is given, the `project_id` field of the service
/// account key is used.
///
/// # Errors
///
/// Returns an error when a required value is missing, the key is not valid
/// JSON, or the region would change.
pub fn resolve_gcp(flags: &GcpFlags, current: &GcpConfig) -> Result<GcpConfig> {
    let service_account_key = pick(
        flags.service_account_key.as_deref(),
        &current.service_account_key,
        "--gcp-service-account-key",
    )?;
    let key: serde_json::Value = serde_json::from_str(&service_account_key)
        .map_err(|e| anyhow::anyhow!("error parsing gcp service account key: {e}"))?;

    let project_id = match pick(flags.project_id.as_deref(), &current.project_id, "--gcp-project-id") {
        Ok(id) => id,
        Err(e) => key
            .get("project_id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or(e)?,
    };

    let region = pick(flags.region.as_deref(), &current.region, "--gcp-region")?;
    ensure_region_unchanged(&current.region, &region)?;
    let zone = match pick(flags.zone.as_deref(), &current.zone, "--gcp-zone") {
        Ok(zone) => zone,
        Err(_) => format!("{region}-a"),
    };

    Ok(GcpConfig {
        project_id,
        service_account_key,
        region,
        zone,
    })
}

fn pick(flag: Option<&str>, current: &str, name: &'static str) -> Result<String> {
    match flag.filter(|v| !v.is_empty()) {
        Some(v) => Ok(v.to_string()),
        None if !current.is_empty() => Ok(current.to_string()),
        None => Err(BblError::MissingFlag { flag: name }.into()),
    }
}

fn ensure_region_unchanged(current: &str, requested: &str) -> Result<()> {
    if !current.is_empty() && current != requested {
        return Err(BblError::RegionMismatch {
            current: current.to_string(),
        }
        .into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
