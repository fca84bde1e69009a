//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;

use anyhow::Result;
use serde_json::Value;

use crate::domain::state::{AwsConfig, Bosh, Iaas};
use crate::domain::{BblError, CertificateMaterial, Outputs, State};

// ── Actuator Results ──────────────────────────────────────────────────────────

/// Failure of an actuator that may have produced partial state before failing.
///
/// Callers must persist `state` from `Partial` before surfacing the error.
#[derive(Debug)]
pub enum ActuatorFailure<P> {
    Partial { state: P, error: anyhow::Error },
    Failed(anyhow::Error),
}

impl<P> ActuatorFailure<P> {
    /// Discard any partial state and keep the underlying error.
    #[must_use]
    pub fn into_error(self) -> anyhow::Error {
        match self {
            Self::Partial { error, .. } | Self::Failed(error) => error,
        }
    }
}

impl<P> From<anyhow::Error> for ActuatorFailure<P> {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(error)
    }
}

/// Result of an actuator call whose failures may carry partial state `P`.
pub type Actuated<T, P> = std::result::Result<T, ActuatorFailure<P>>;

// ── State Store Port ──────────────────────────────────────────────────────────

/// Persistence of the bbl state document in the state directory.
#[allow(async_fn_in_trait)]
pub trait StateStore {
    /// Load the state, returning `None` if no state file exists.
    async fn load(&self) -> Result<Option<State>>;
    /// Atomically replace the state file.
    async fn write(&self, state: &State) -> Result<()>;
    /// Remove the state file. Succeeds if it is already gone.
    async fn remove(&self) -> Result<()>;
    /// The directory this store reads from.
    fn dir(&self) -> &Path;

    /// Load the state, failing with `NotFound` when absent.
    async fn read(&self) -> Result<State> {
        match self.load().await? {
            Some(state) => Ok(state),
            None => Err(BblError::NotFound {
                dir: self.dir().display().to_string(),
            }
            .into()),
        }
    }
}

// ── Credential Port ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyPair {
    /// PEM-encoded RSA private key.
    pub private_key: String,
    /// OpenSSH public key, `ssh-rsa AAAA...`.
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub ca: String,
    pub certificate: String,
    pub private_key: String,
}

/// Random secrets, SSH keys and X.509 material. Sync trait — no I/O beyond the OS RNG.
pub trait CredentialGenerator {
    /// `prefix` followed by `length` random alphanumerics.
    fn random_string(&self, prefix: &str, length: usize) -> String;
    fn ssh_key_pair(&self) -> Result<SshKeyPair>;
    /// A fresh CA named `ca_common_name` and a leaf for `common_name` (IP or DNS name).
    fn x509_key_pair(&self, ca_common_name: &str, common_name: &str) -> Result<CertificateBundle>;
    /// True when `certificate` is signed by `ca`, covers `common_name`, and is currently valid.
    fn certificate_valid_for(&self, ca: &str, certificate: &str, common_name: &str) -> bool;
}

// ── Infrastructure Ports ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutput {
    pub tf_state: String,
    pub outputs: Outputs,
}

/// Template-driven infrastructure actuator.
///
/// Failures carry whatever template state was produced before the error.
#[allow(async_fn_in_trait)]
pub trait InfrastructureActuator {
    async fn version(&self) -> Result<String>;
    /// Converge the infrastructure described by `state` (including its LB fields).
    async fn apply(&self, state: &State) -> Actuated<ApplyOutput, String>;
    /// Tear down everything recorded in `state.tf_state`; returns the remaining state.
    async fn destroy(&self, state: &State) -> Actuated<String, String>;
    /// Outputs of the infrastructure already recorded in `state.tf_state`.
    async fn outputs(&self, state: &State) -> Result<Outputs>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stack {
    pub name: String,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedCertificate {
    pub name: String,
    pub arn: String,
}

/// Legacy AWS infrastructure: keypairs, CloudFormation stacks, server certificates.
///
/// Every delete is idempotent and succeeds when the resource is absent.
#[allow(async_fn_in_trait)]
pub trait StackManager {
    async fn keypair_exists(&self, aws: &AwsConfig, name: &str) -> Result<bool>;
    async fn import_keypair(&self, aws: &AwsConfig, name: &str, public_key: &str) -> Result<()>;
    async fn delete_keypair(&self, aws: &AwsConfig, name: &str) -> Result<()>;
    /// Create or update the stack and wait for it to settle.
    async fn apply_stack(&self, aws: &AwsConfig, name: &str, template: &str) -> Result<Stack>;
    async fn describe_stack(&self, aws: &AwsConfig, name: &str) -> Result<Option<Stack>>;
    async fn delete_stack(&self, aws: &AwsConfig, name: &str) -> Result<()>;
    /// Upload under a unique random-suffixed name.
    async fn upload_certificate(
        &self,
        aws: &AwsConfig,
        material: &CertificateMaterial,
    ) -> Result<UploadedCertificate>;
    async fn certificate_arn(&self, aws: &AwsConfig, name: &str) -> Result<String>;
    async fn delete_certificate(&self, aws: &AwsConfig, name: &str) -> Result<()>;
}

// ── Director Ports ────────────────────────────────────────────────────────────

/// Everything needed to render the director manifest.
#[derive(Debug, Clone)]
pub struct InterpolateInput {
    pub iaas: Iaas,
    pub deployment_vars: String,
    /// Variables store (YAML) to reuse and extend.
    pub variables: String,
    /// Contents of operator-supplied ops files, applied after the built-in ones.
    pub ops_files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interpolated {
    pub manifest: String,
    pub variables: String,
}

/// Renders and deploys the single-node director.
///
/// `create_env`/`delete_env` failures carry the deployer state written so far.
#[allow(async_fn_in_trait)]
pub trait DirectorDeployer {
    async fn version(&self) -> Result<String>;
    async fn interpolate(&self, input: &InterpolateInput) -> Result<Interpolated>;
    async fn create_env(&self, manifest: &str, variables: &str, previous: &Value) -> Actuated<Value, Value>;
    async fn delete_env(&self, manifest: &str, variables: &str, previous: &Value) -> Actuated<Value, Value>;
}

/// Address and credentials of a running director.
#[derive(Debug, Clone, Copy)]
pub struct DirectorTarget<'a> {
    pub address: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub ca_cert: &'a str,
}

impl<'a> DirectorTarget<'a> {
    #[must_use]
    pub fn from_bosh(bosh: &'a Bosh) -> Self {
        Self {
            address: &bosh.director_address,
            username: &bosh.director_username,
            password: &bosh.director_password,
            ca_cert: &bosh.director_ssl_ca,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorInfo {
    pub name: String,
    pub uuid: String,
    pub version: String,
}

/// Day-2 API of a running director.
#[allow(async_fn_in_trait)]
pub trait DirectorClient {
    /// Reachability probe.
    async fn info(&self, target: &DirectorTarget<'_>) -> Result<DirectorInfo>;
    async fn upload_cloud_config(&self, target: &DirectorTarget<'_>, cloud_config: &str) -> Result<()>;
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so actuators can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with extra environment variables.
    async fn run_with_env(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<Output>;
    /// Run a program inside `dir` with extra environment variables.
    async fn run_in(
        &self,
        dir: &Path,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<Output>;
}

// ── Operator Interaction Ports ────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit a `step: <message>` line.
    fn step(&self, message: &str);
    /// Emit a warning on the error stream.
    fn warn(&self, message: &str);
}

/// Yes/no questions asked of the operator.
#[allow(async_fn_in_trait)]
pub trait Prompter {
    /// Ask `question`; only an explicit yes counts as consent.
    async fn confirm(&self, question: &str) -> Result<bool>;
}

// ── Composite ─────────────────────────────────────────────────────────────────

/// Every port a command service may touch, bundled so services take one argument.
pub trait Ports {
    type Store: StateStore;
    type Credentials: CredentialGenerator;
    type Infrastructure: InfrastructureActuator;
    type Stacks: StackManager;
    type Deployer: DirectorDeployer;
    type Director: DirectorClient;
    type Reporter: ProgressReporter;

    fn store(&self) -> &Self::Store;
    fn credentials(&self) -> &Self::Credentials;
    fn infrastructure(&self) -> &Self::Infrastructure;
    fn stacks(&self) -> &Self::Stacks;
    fn deployer(&self) -> &Self::Deployer;
    fn director(&self) -> &Self::Director;
    fn reporter(&self) -> &Self::Reporter;
}
