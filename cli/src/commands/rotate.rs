//! `bbl rotate` — replace the SSH keypair.

use anyhow::Result;

use crate::app::AppContext;
use crate::application::services::rotate;

/// Run `bbl rotate`.
///
/// # Errors
///
/// Returns the error of the rotate service.
pub async fn run(app: &AppContext) -> Result<()> {
    rotate::rotate(app).await?;
    Ok(())
}
