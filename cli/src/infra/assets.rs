//! Embedded assets compiled into the binary.
//!
//! At compile time, `include_dir!` embeds everything under `cli/assets/`:
//!   - `bosh/bosh.yml`              — director manifest template
//!   - `bosh/<iaas>/cpi.yml`        — CPI ops file applied before operator ops files
//!   - `terraform/<iaas>/*.tf`      — infrastructure templates, one per LB flavour

use std::path::Path;

use anyhow::{Context, Result};
use include_dir::{Dir, include_dir};

use crate::domain::{Iaas, LbType};

static EMBEDDED_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Return a single embedded asset as text.
///
/// # Errors
///
/// Returns an error if no asset with the given `name` exists or it is not UTF-8.
pub fn get_asset(name: &str) -> Result<&'static str> {
    EMBEDDED_ASSETS
        .get_file(name)
        .and_then(|f| f.contents_utf8())
        .ok_or_else(|| anyhow::anyhow!("embedded asset not found: {name}"))
}

/// The director manifest template.
///
/// # Errors
///
/// Returns an error if the asset is missing from the build.
pub fn director_manifest() -> Result<&'static str> {
    get_asset("bosh/bosh.yml")
}

/// The CPI ops file for `iaas`.
///
/// # Errors
///
/// Returns an error if the asset is missing from the build.
pub fn cpi_ops_file(iaas: Iaas) -> Result<&'static str> {
    get_asset(&format!("bosh/{iaas}/cpi.yml"))
}

/// Template file names making up the infrastructure for `iaas` with `lb` attached.
#[must_use]
pub fn terraform_templates(iaas: Iaas, lb: Option<LbType>) -> Vec<String> {
    let mut names = vec![format!("terraform/{iaas}/base.tf")];
    if let Some(lb) = lb {
        names.push(format!("terraform/{iaas}/{lb}_lb.tf"));
    }
    names
}

/// Write the templates for `iaas`/`lb` into `dest`, flattened.
///
/// # Errors
///
/// Returns an error if an asset is missing or a file cannot be written.
pub fn extract_terraform(iaas: Iaas, lb: Option<LbType>, dest: &Path) -> Result<()> {
    for name in terraform_templates(iaas, lb) {
        let content = get_asset(&name)?;
        let file = Path::new(&name)
            .file_name()
            .with_context(|| format!("asset {name} has no file name"))?;
        let target = dest.join(file);
        std::fs::write(&target, content)
            .with_context(|| format!("writing {}", target.display()))?;
    }
    Ok(())
}
