//! `bbl destroy` — tear down the environment.

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::services::destroy::{self, DestroyOptions};

/// Arguments for the destroy command.
#[derive(Args, Debug, Default)]
pub struct DestroyArgs {
    /// Do not prompt for confirmation
    #[arg(long)]
    pub no_confirm: bool,

    /// Gracefully exit if there is no state file
    #[arg(long)]
    pub skip_if_missing: bool,
}

/// Run `bbl destroy`.
///
/// # Errors
///
/// Returns `UserAborted` when the operator declines, or the error of the
/// destroy service.
pub async fn run(app: &AppContext, args: &DestroyArgs) -> Result<()> {
    let opts = DestroyOptions {
        skip_if_missing: args.skip_if_missing,
        no_confirm: args.no_confirm,
    };
    destroy::destroy(app, &app.prompter, opts).await?;
    Ok(())
}
