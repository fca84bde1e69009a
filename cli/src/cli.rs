//! CLI argument parsing with clap derive, and the top-level dispatcher.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::app::{AppContext, AppFlags};
use crate::application::services::queries::Field;
use crate::commands;
use crate::domain::BblError;

/// Bootstraps and lifecycle-manages a BOSH director on AWS or GCP
#[derive(Parser, Debug)]
#[command(name = "bbl", version, disable_version_flag = true)]
pub struct Cli {
    /// Directory containing bbl-state.json
    #[arg(long, global = true, env = "BBL_STATE_DIRECTORY", default_value = ".")]
    pub state_dir: PathBuf,

    /// Print debug output
    #[arg(long, global = true, env = "BBL_DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Override the AWS endpoint URL
    #[arg(long, global = true, value_name = "URL")]
    pub endpoint_override: Option<String>,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploys BOSH director on an IAAS
    Up(commands::up::UpArgs),

    /// Tears down BOSH director infrastructure
    Destroy(commands::destroy::DestroyArgs),

    /// Attaches load balancer(s)
    CreateLbs(commands::load_balancers::CreateLbsArgs),

    /// Updates load balancer(s)
    UpdateLbs(commands::load_balancers::UpdateLbsArgs),

    /// Deletes attached load balancer(s)
    DeleteLbs(commands::load_balancers::DeleteLbsArgs),

    /// Prints attached load balancer(s)
    Lbs,

    /// Rotates the SSH key of the BOSH director
    Rotate,

    /// Prints environment ID
    EnvId,

    /// Prints BOSH director address
    DirectorAddress,

    /// Prints BOSH director username
    DirectorUsername,

    /// Prints BOSH director password
    DirectorPassword,

    /// Prints BOSH director CA certificate
    DirectorCaCert,

    /// Prints BOSH director CA certificate (deprecated, use director-ca-cert)
    #[command(hide = true)]
    BoshCaCert,

    /// Prints SSH private key
    SshKey,

    /// Prints required variables for BOSH deployment
    BoshDeploymentVars,

    /// Prints suggested cloud configuration for BOSH environment
    CloudConfig,

    /// Prints BOSH friendly environment variables
    PrintEnv,

    /// Prints version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns the error of the command, or `UnknownCommand` when no
    /// subcommand was given.
    pub async fn run(self, app: &AppContext) -> Result<()> {
        let Some(command) = self.command else {
            return Err(BblError::UnknownCommand("[EMPTY]".to_string()).into());
        };
        match command {
            Command::Up(args) => commands::up::run(app, args).await,
            Command::Destroy(args) => commands::destroy::run(app, &args).await,
            Command::CreateLbs(args) => commands::load_balancers::create(app, &args).await,
            Command::UpdateLbs(args) => commands::load_balancers::update(app, &args).await,
            Command::DeleteLbs(args) => commands::load_balancers::delete(app, &args).await,
            Command::Lbs => commands::load_balancers::list(app).await,
            Command::Rotate => commands::rotate::run(app).await,
            Command::EnvId => commands::queries::field(app, Field::EnvId).await,
            Command::DirectorAddress => commands::queries::field(app, Field::DirectorAddress).await,
            Command::DirectorUsername => commands::queries::field(app, Field::DirectorUsername).await,
            Command::DirectorPassword => commands::queries::field(app, Field::DirectorPassword).await,
            Command::DirectorCaCert => commands::queries::field(app, Field::DirectorCaCert).await,
            Command::BoshCaCert => commands::queries::bosh_ca_cert(app).await,
            Command::SshKey => commands::queries::field(app, Field::SshKey).await,
            Command::BoshDeploymentVars => commands::queries::deployment_vars(app).await,
            Command::CloudConfig => commands::queries::cloud_config(app).await,
            Command::PrintEnv => commands::queries::print_env(app).await,
            Command::Version => {
                commands::version::run();
                Ok(())
            }
        }
    }
}

/// Parse `args`, run the command, and map the outcome to an exit code.
pub async fn main_with_args<I, T>(args: I) -> ExitCode
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => return parse_failure(&err),
    };
    init_tracing(cli.debug);

    let app = AppContext::new(&AppFlags {
        state_dir: cli.state_dir.clone(),
        debug: cli.debug,
        endpoint_override: cli.endpoint_override.clone(),
    });
    let wants_usage = cli.command.is_none();
    match cli.run(&app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if wants_usage {
                app.output.error(&err.to_string());
                eprintln!("{}", Cli::command().render_usage());
                return ExitCode::from(1);
            }
            command_failure(&app, &err)
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "bbl=debug" } else { "bbl=warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .try_init();
}

fn command_failure(app: &AppContext, err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<BblError>() {
        Some(BblError::UserAborted) => {
            app.output.step("exiting");
            ExitCode::SUCCESS
        }
        Some(BblError::Manager { .. }) => {
            app.output.error(&format!("{err:#}"));
            if !app.debug {
                app.output.error("use --debug for additional debug output");
            }
            ExitCode::from(1)
        }
        _ => {
            app.output.error(&format!("{err:#}"));
            ExitCode::from(1)
        }
    }
}

fn parse_failure(err: &clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        _ => {
            match dispatch_error(err) {
                Some(message) => {
                    eprintln!("{message}");
                    eprintln!("{}", Cli::command().render_usage());
                }
                None => {
                    let _ = err.print();
                }
            }
            ExitCode::from(1)
        }
    }
}

/// The dispatcher-level message for unknown flags and commands.
fn dispatch_error(err: &clap::Error) -> Option<String> {
    let context = |kind| match err.get(kind) {
        Some(ContextValue::String(value)) => Some(value.clone()),
        _ => None,
    };
    let error = match err.kind() {
        ErrorKind::UnknownArgument => {
            let flag = context(ContextKind::InvalidArg)?;
            let name = flag.trim_start_matches('-');
            let name = name.split_once('=').map_or(name, |(name, _)| name);
            BblError::BadFlag(format!("-{name}"))
        }
        ErrorKind::InvalidSubcommand => BblError::UnknownCommand(context(ContextKind::InvalidSubcommand)?),
        _ => return None,
    };
    Some(error.to_string())
}
