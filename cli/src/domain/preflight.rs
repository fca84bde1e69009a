//! Pre-flight checks run before any command mutates state.

use anyhow::{Context, Result};
use semver::Version;

use crate::domain::error::BblError;
use crate::domain::state::State;

pub const BOSH_MIN_VERSION: Version = Version::new(2, 0, 0);
pub const TERRAFORM_MIN_VERSION: Version = Version::new(0, 10, 0);

/// Ensure the director deployer reports at least v2.0.0.
///
/// # Errors
///
/// Returns `VersionTooOld` for older versions, or a parse error.
pub fn check_bosh_version(reported: &str) -> Result<()> {
    check_minimum(reported, &BOSH_MIN_VERSION, "BOSH", "2.0.0")
}

/// Ensure the infrastructure template tool reports at least v0.10.0.
///
/// # Errors
///
/// Returns `VersionTooOld` for older versions, or a parse error.
pub fn check_terraform_version(reported: &str) -> Result<()> {
    check_minimum(reported, &TERRAFORM_MIN_VERSION, "Terraform", "0.10.0")
}

fn check_minimum(
    reported: &str,
    minimum: &Version,
    tool: &'static str,
    minimum_str: &'static str,
) -> Result<()> {
    let version = parse_version(reported)
        .with_context(|| format!("parsing {tool} version {reported:?}"))?;
    // Pre-release builds of the minimum release count as that release.
    let comparable = Version::new(version.major, version.minor, version.patch);
    if comparable < *minimum {
        return Err(BblError::VersionTooOld {
            tool,
            minimum: minimum_str,
        }
        .into());
    }
    Ok(())
}

/// Extract a semantic version from tool output such as `version 2.0.1-abc`
/// or `Terraform v0.11.3`.
///
/// # Errors
///
/// Returns an error if no `X.Y.Z` token can be found.
pub fn parse_version(reported: &str) -> Result<Version> {
    reported
        .split_whitespace()
        .map(|token| token.trim_start_matches('v'))
        .find_map(|token| {
            let core: String = token
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            Version::parse(core.trim_end_matches('.')).ok()
        })
        .ok_or_else(|| anyhow::anyhow!("no version number found"))
}

/// Reject documents that record a director but no infrastructure.
///
/// # Errors
///
/// Returns `DirectorWithoutInfrastructure` for such documents.
pub fn check_director_has_infrastructure(state: &State) -> Result<()> {
    if state.has_director() && !state.has_infrastructure() {
        return Err(BblError::DirectorWithoutInfrastructure.into());
    }
    Ok(())
}
