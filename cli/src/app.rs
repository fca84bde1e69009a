//! Application context — unified state passed to every command handler.
//!
//! `AppContext` is built once from the global flags and owns every concrete
//! port implementation, so command handlers take a single `&AppContext` and
//! services see it through the `Ports` trait.

use std::path::PathBuf;

use crate::application::ports::Ports;
use crate::infra::aws::AwsCli;
use crate::infra::bosh::BoshCli;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::credentials::OsCredentialGenerator;
use crate::infra::director::HttpDirectorClient;
use crate::infra::prompt::StdinPrompter;
use crate::infra::state::StateManager;
use crate::infra::terraform::TerraformExecutor;
use crate::output::{OutputContext, TerminalReporter};

/// Flags passed from the top-level CLI to `AppContext::new`.
#[derive(Debug, Clone, Default)]
pub struct AppFlags {
    /// Directory holding `bbl-state.json`.
    pub state_dir: PathBuf,
    /// Verbose actuator logging.
    pub debug: bool,
    /// Endpoint URL handed to the AWS actuator.
    pub endpoint_override: Option<String>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context.
    pub output: OutputContext,
    /// Whether `--debug` was given.
    pub debug: bool,
    /// Operator confirmation prompts.
    pub prompter: StdinPrompter,
    state_mgr: StateManager,
    credentials: OsCredentialGenerator,
    terraform: TerraformExecutor<TokioCommandRunner>,
    aws: AwsCli<TokioCommandRunner>,
    bosh: BoshCli<TokioCommandRunner>,
    director: HttpDirectorClient,
    reporter: TerminalReporter,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    #[must_use]
    pub fn new(flags: &AppFlags) -> Self {
        let output = OutputContext::new();
        Self {
            output,
            debug: flags.debug,
            prompter: StdinPrompter,
            state_mgr: StateManager::new(&flags.state_dir),
            credentials: OsCredentialGenerator,
            terraform: TerraformExecutor::default_runner(),
            aws: AwsCli::default_runner(flags.endpoint_override.clone()),
            bosh: BoshCli::default_runner(),
            director: HttpDirectorClient,
            reporter: TerminalReporter::new(output),
        }
    }
}

impl Ports for AppContext {
    type Store = StateManager;
    type Credentials = OsCredentialGenerator;
    type Infrastructure = TerraformExecutor<TokioCommandRunner>;
    type Stacks = AwsCli<TokioCommandRunner>;
    type Deployer = BoshCli<TokioCommandRunner>;
    type Director = HttpDirectorClient;
    type Reporter = TerminalReporter;

    fn store(&self) -> &Self::Store {
        &self.state_mgr
    }

    fn credentials(&self) -> &Self::Credentials {
        &self.credentials
    }

    fn infrastructure(&self) -> &Self::Infrastructure {
        &self.terraform
    }

    fn stacks(&self) -> &Self::Stacks {
        &self.aws
    }

    fn deployer(&self) -> &Self::Deployer {
        &self.bosh
    }

    fn director(&self) -> &Self::Director {
        &self.director
    }

    fn reporter(&self) -> &Self::Reporter {
        &self.reporter
    }
}
