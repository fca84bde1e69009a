//! The step library.
//!
//! A command is a fixed sequence of [`Step`]s executed by a [`Run`]. Every
//! step checks its own precondition, so replaying a sequence over the state
//! left by an interrupted run resumes at the first unfinished step. Each
//! step writes the state file immediately after any externally visible
//! side-effect.

use anyhow::{Context, Result};
use chrono::Utc;

use crate::application::ports::{
    ActuatorFailure, CredentialGenerator, DirectorClient, DirectorDeployer, DirectorTarget,
    InfrastructureActuator, InterpolateInput, Ports, ProgressReporter, StackManager, StateStore,
};
use crate::domain::cloudformation::{self, TemplateInput};
use crate::domain::outputs::{self, Outputs};
use crate::domain::state::{Bosh, Iaas, KeyPair, LoadBalancer, State};
use crate::domain::{BblError, CertificateMaterial, LbType, cloud_config, director_vars, env_id};

/// Issuer of every director certificate.
pub const DIRECTOR_CA_COMMON_NAME: &str = "BOSH Bootloader";
pub const DIRECTOR_USERNAME: &str = "admin";
const PASSWORD_LENGTH: usize = 15;

/// Internal director credentials, each a random alphanumeric string.
pub const DIRECTOR_CREDENTIALS: &[&str] = &[
    "mbus_bootstrap_password",
    "nats_password",
    "postgres_password",
    "registry_password",
    "blobstore_director_password",
    "blobstore_agent_password",
    "hm_password",
];

/// Which infrastructure actuator owns the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfrastructurePath {
    /// CloudFormation stack plus separately managed keypair and certificate (AWS only).
    Legacy,
    /// Infrastructure template applied by the template actuator.
    Template,
}

impl InfrastructurePath {
    /// Pick the path for `state`. Once infrastructure exists the choice is sticky.
    #[must_use]
    pub fn select(state: &State, prefer_template: bool) -> Self {
        match state.iaas {
            Some(Iaas::Gcp) => Self::Template,
            _ if !state.stack.name.is_empty() => Self::Legacy,
            _ if !state.tf_state.is_empty() || prefer_template => Self::Template,
            _ => Self::Legacy,
        }
    }
}

/// Load balancer change requested for the next infrastructure apply.
#[derive(Debug, Clone, Default)]
pub enum LbChange {
    #[default]
    Keep,
    Attach {
        lb_type: LbType,
        material: CertificateMaterial,
    },
    Detach,
}

/// Named unit of work. See [`Run::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    GenerateEnvId,
    EnsureKeyPair,
    ApplyInfrastructure,
    GenerateDirectorCredentials,
    InterpolateManifest,
    CreateDirector,
    UploadCloudConfig,
    DeleteDirector,
    DestroyInfrastructure,
    UploadCertificate,
    DeleteCertificate,
    DeleteRetiredCertificate,
    DeleteKeyPair,
    RotateKeyPair,
    RemoveStateFile,
}

impl Step {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::GenerateEnvId => "generate-env-id",
            Self::EnsureKeyPair => "ensure-keypair",
            Self::ApplyInfrastructure => "apply-infrastructure",
            Self::GenerateDirectorCredentials => "generate-director-credentials",
            Self::InterpolateManifest => "interpolate-manifest",
            Self::CreateDirector => "create-director",
            Self::UploadCloudConfig => "upload-cloud-config",
            Self::DeleteDirector => "delete-director",
            Self::DestroyInfrastructure => "destroy-infrastructure",
            Self::UploadCertificate => "upload-certificate",
            Self::DeleteCertificate => "delete-certificate",
            Self::DeleteRetiredCertificate => "delete-retired-certificate",
            Self::DeleteKeyPair => "delete-keypair",
            Self::RotateKeyPair => "rotate-keypair",
            Self::RemoveStateFile => "remove-state-file",
        }
    }
}

/// Execution context threaded through the steps of one command.
pub struct Run<'a, P: Ports> {
    ports: &'a P,
    state: State,
    path: InfrastructurePath,
    outputs: Outputs,
    manifest: Option<String>,
    lb: LbChange,
    requested_env_id: Option<String>,
    bosh_az: Option<String>,
    certificate_arn: Option<String>,
}

impl<'a, P: Ports> Run<'a, P> {
    #[must_use]
    pub fn new(ports: &'a P, state: State, path: InfrastructurePath) -> Self {
        Self {
            ports,
            state,
            path,
            outputs: Outputs::default(),
            manifest: None,
            lb: LbChange::Keep,
            requested_env_id: None,
            bosh_az: None,
            certificate_arn: None,
        }
    }

    /// Use `name` instead of a generated env-id when none is persisted yet.
    #[must_use]
    pub fn with_env_id(mut self, name: Option<String>) -> Self {
        self.requested_env_id = name;
        self
    }

    #[must_use]
    pub fn with_bosh_az(mut self, az: Option<String>) -> Self {
        self.bosh_az = az;
        self
    }

    #[must_use]
    pub fn with_lb(mut self, lb: LbChange) -> Self {
        self.lb = lb;
        self
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> State {
        self.state
    }

    /// Persist the in-memory state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub async fn checkpoint(&self) -> Result<()> {
        self.ports.store().write(&self.state).await
    }

    /// Run `steps` in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the failing step; its checkpointed partial work
    /// is already on disk.
    pub async fn execute(&mut self, steps: &[Step]) -> Result<()> {
        for step in steps {
            self.execute_step(*step).await?;
        }
        Ok(())
    }

    /// Mutate the in-memory state outside of a step (e.g. failure cleanup).
    pub fn update(&mut self, f: impl FnOnce(&mut State)) {
        f(&mut self.state);
    }

    async fn execute_step(&mut self, step: Step) -> Result<()> {
        tracing::debug!(step = step.name(), "running");
        let result = match step {
            Step::GenerateEnvId => self.generate_env_id().await,
            Step::EnsureKeyPair => self.ensure_key_pair().await,
            Step::ApplyInfrastructure => self.apply_infrastructure().await,
            Step::GenerateDirectorCredentials => self.generate_director_credentials().await,
            Step::InterpolateManifest => self.interpolate_manifest().await,
            Step::CreateDirector => self.create_director().await,
            Step::UploadCloudConfig => self.upload_cloud_config().await,
            Step::DeleteDirector => self.delete_director().await,
            Step::DestroyInfrastructure => self.destroy_infrastructure().await,
            Step::UploadCertificate => self.upload_certificate().await,
            Step::DeleteCertificate => self.delete_certificate().await,
            Step::DeleteRetiredCertificate => self.delete_retired_certificates().await,
            Step::DeleteKeyPair => self.delete_key_pair().await,
            Step::RotateKeyPair => self.rotate_key_pair().await,
            Step::RemoveStateFile => self.remove_state_file().await,
        };
        match &result {
            Ok(()) => tracing::debug!(step = step.name(), "succeeded"),
            Err(e) => tracing::debug!(step = step.name(), error = %format!("{e:#}"), "failed"),
        }
        result
    }

    fn reporter(&self) -> &P::Reporter {
        self.ports.reporter()
    }

    // ── Environment identity ──────────────────────────────────────────────────

    async fn generate_env_id(&mut self) -> Result<()> {
        if !self.state.env_id.is_empty() {
            return Ok(());
        }
        self.state.env_id = match self.requested_env_id.take() {
            Some(name) => {
                env_id::validate_name(&name)?;
                name
            }
            None => env_id::generate(Utc::now()),
        };
        self.checkpoint().await
    }

    async fn ensure_key_pair(&mut self) -> Result<()> {
        if self.state.key_pair.private_key.is_empty() {
            let keys = self.ports.credentials().ssh_key_pair()?;
            self.state.key_pair = KeyPair {
                name: format!("keypair-{}", self.state.env_id),
                private_key: keys.private_key,
                public_key: keys.public_key,
            };
            self.checkpoint().await?;
        }
        if self.path != InfrastructurePath::Legacy {
            return Ok(());
        }

        let stacks = self.ports.stacks();
        let key_pair = &self.state.key_pair;
        if stacks.keypair_exists(&self.state.aws, &key_pair.name).await? {
            self.reporter().step("using existing keypair");
            return Ok(());
        }
        self.reporter().step("creating keypair");
        stacks
            .import_keypair(&self.state.aws, &key_pair.name, &key_pair.public_key)
            .await
            .with_context(|| format!("creating keypair {}", key_pair.name))
    }

    async fn rotate_key_pair(&mut self) -> Result<()> {
        self.reporter().step("rotating keypair");
        let keys = self.ports.credentials().ssh_key_pair()?;
        if self.state.key_pair.name.is_empty() {
            self.state.key_pair.name = format!("keypair-{}", self.state.env_id);
        }
        self.state.key_pair.private_key = keys.private_key;
        self.state.key_pair.public_key = keys.public_key;
        self.checkpoint().await?;

        if self.path == InfrastructurePath::Legacy {
            let stacks = self.ports.stacks();
            let key_pair = &self.state.key_pair;
            stacks.delete_keypair(&self.state.aws, &key_pair.name).await?;
            stacks
                .import_keypair(&self.state.aws, &key_pair.name, &key_pair.public_key)
                .await?;
        }
        Ok(())
    }

    async fn delete_key_pair(&mut self) -> Result<()> {
        if self.state.key_pair.is_empty() {
            return Ok(());
        }
        if self.path == InfrastructurePath::Legacy && !self.state.key_pair.name.is_empty() {
            self.reporter().step("deleting keypair");
            self.ports
                .stacks()
                .delete_keypair(&self.state.aws, &self.state.key_pair.name)
                .await?;
        }
        self.state.key_pair = KeyPair::default();
        self.checkpoint().await
    }

    // ── Infrastructure ────────────────────────────────────────────────────────

    /// The state the next apply should converge to.
    fn target_state(&self) -> State {
        let mut target = self.state.clone();
        match &self.lb {
            LbChange::Keep => {}
            LbChange::Attach { lb_type, material } => {
                target.lb = LoadBalancer {
                    lb_type: lb_type.as_str().to_string(),
                    cert: material.cert.clone(),
                    key: material.key.clone(),
                    chain: material.chain.clone(),
                };
                if self.path == InfrastructurePath::Legacy {
                    target.stack.lb_type = lb_type.as_str().to_string();
                }
            }
            LbChange::Detach => {
                target.lb = LoadBalancer::default();
                target.stack.lb_type.clear();
            }
        }
        target
    }

    async fn apply_infrastructure(&mut self) -> Result<()> {
        let target = self.target_state();
        match self.path {
            InfrastructurePath::Legacy => self.apply_stack(target).await,
            InfrastructurePath::Template => self.apply_template(target).await,
        }
    }

    async fn apply_template(&mut self, mut target: State) -> Result<()> {
        self.reporter().step("generating terraform template");
        match self.ports.infrastructure().apply(&target).await {
            Ok(applied) => {
                target.tf_state = applied.tf_state;
                self.state = target;
                self.outputs = applied.outputs;
                self.checkpoint().await?;
                self.reporter().step("applied terraform template");
                Ok(())
            }
            Err(ActuatorFailure::Partial { state, error }) => {
                self.state.tf_state = state;
                self.checkpoint().await?;
                Err(manager_error(&error))
            }
            Err(ActuatorFailure::Failed(error)) => Err(error),
        }
    }

    async fn apply_stack(&mut self, mut target: State) -> Result<()> {
        let name = if self.state.stack.name.is_empty() {
            format!("stack-{}", self.state.env_id)
        } else {
            self.state.stack.name.clone()
        };

        self.reporter().step("generating cloudformation template");
        let lb = target.lb_type()?;
        let certificate_arn = match lb {
            Some(_) => self.resolve_certificate_arn(&target).await?,
            None => None,
        };
        let template = cloudformation::template(&TemplateInput {
            env_id: &self.state.env_id,
            bosh_az: self.bosh_az.as_deref(),
            lb,
            certificate_arn: certificate_arn.as_deref(),
        })?;

        let stacks = self.ports.stacks();
        let exists = stacks.describe_stack(&self.state.aws, &name).await?.is_some();
        self.reporter().step(if exists {
            "updating cloudformation stack"
        } else {
            "creating cloudformation stack"
        });

        // Recorded before the apply so an interrupted create can still be torn down.
        if self.state.stack.name != name {
            self.state.stack.name.clone_from(&name);
            self.checkpoint().await?;
        }

        let stack = stacks
            .apply_stack(&self.state.aws, &name, &template)
            .await
            .with_context(|| format!("applying cloudformation stack {name}"))?;
        target.stack.name = name;
        self.state = target;
        self.outputs = cloudformation::normalize_outputs(&stack.outputs);
        self.checkpoint().await?;
        self.reporter().step("finished applying cloudformation template");
        Ok(())
    }

    async fn resolve_certificate_arn(&self, target: &State) -> Result<Option<String>> {
        if let Some(arn) = &self.certificate_arn {
            return Ok(Some(arn.clone()));
        }
        if target.stack.certificate_name.is_empty() {
            return Ok(None);
        }
        let arn = self
            .ports
            .stacks()
            .certificate_arn(&target.aws, &target.stack.certificate_name)
            .await?;
        Ok(Some(arn))
    }

    async fn destroy_infrastructure(&mut self) -> Result<()> {
        if !self.state.stack.name.is_empty() {
            self.reporter().step("deleting cloudformation stack");
            self.ports
                .stacks()
                .delete_stack(&self.state.aws, &self.state.stack.name)
                .await?;
            self.state.stack.name.clear();
            self.state.stack.lb_type.clear();
            self.state.lb = LoadBalancer::default();
            self.checkpoint().await?;
        }

        if self.state.tf_state.is_empty() {
            return Ok(());
        }
        self.reporter().step("destroying infrastructure");
        match self.ports.infrastructure().destroy(&self.state).await {
            Ok(_) => {
                self.state.tf_state.clear();
                self.state.lb = LoadBalancer::default();
                self.checkpoint().await
            }
            Err(ActuatorFailure::Partial { state, error }) => {
                self.state.tf_state = state;
                self.checkpoint().await?;
                Err(manager_error(&error))
            }
            Err(ActuatorFailure::Failed(error)) => Err(error),
        }
    }

    /// Outputs of the current infrastructure, fetched once per run.
    async fn ensure_outputs(&mut self) -> Result<()> {
        if self.outputs.is_empty() {
            self.outputs = current_outputs(self.ports, &self.state, self.path).await?;
        }
        Ok(())
    }

    // ── Certificates (legacy path) ────────────────────────────────────────────

    async fn upload_certificate(&mut self) -> Result<()> {
        let LbChange::Attach { material, .. } = &self.lb else {
            return Ok(());
        };
        if self.path != InfrastructurePath::Legacy || material.is_empty() {
            return Ok(());
        }
        self.reporter().step("uploading certificate");
        let uploaded = self
            .ports
            .stacks()
            .upload_certificate(&self.state.aws, material)
            .await?;
        // The stack references the previous certificate until the next apply succeeds.
        let previous = std::mem::replace(&mut self.state.stack.certificate_name, uploaded.name);
        if !previous.is_empty() {
            self.state.stack.retired_certificate_names.push(previous);
        }
        self.certificate_arn = Some(uploaded.arn);
        self.checkpoint().await
    }

    /// Delete certificates superseded by an upload. Only valid once the
    /// stack has been applied with the current certificate.
    async fn delete_retired_certificates(&mut self) -> Result<()> {
        while let Some(name) = self.state.stack.retired_certificate_names.first().cloned() {
            self.reporter().step("deleting certificate");
            self.ports
                .stacks()
                .delete_certificate(&self.state.aws, &name)
                .await
                .with_context(|| format!("deleting certificate {name}"))?;
            self.state.stack.retired_certificate_names.remove(0);
            self.checkpoint().await?;
        }
        Ok(())
    }

    async fn delete_certificate(&mut self) -> Result<()> {
        self.delete_retired_certificates().await?;
        if self.state.stack.certificate_name.is_empty() {
            return Ok(());
        }
        self.reporter().step("deleting certificate");
        self.ports
            .stacks()
            .delete_certificate(&self.state.aws, &self.state.stack.certificate_name)
            .await?;
        self.state.stack.certificate_name.clear();
        self.checkpoint().await
    }

    // ── Director ──────────────────────────────────────────────────────────────

    async fn generate_director_credentials(&mut self) -> Result<()> {
        self.ensure_outputs().await?;
        let external_ip = self.outputs.get(outputs::EXTERNAL_IP)?.to_string();
        let credentials = self.ports.credentials();
        let env_id = self.state.env_id.clone();
        let bosh = &mut self.state.bosh;
        let mut changed = false;

        let mut fill = |field: &mut String, value: &dyn Fn() -> String| {
            if field.is_empty() {
                *field = value();
                changed = true;
            }
        };
        fill(&mut bosh.director_name, &|| format!("bosh-{env_id}"));
        fill(&mut bosh.director_username, &|| DIRECTOR_USERNAME.to_string());
        fill(&mut bosh.director_password, &|| {
            credentials.random_string("p-", PASSWORD_LENGTH)
        });
        for name in DIRECTOR_CREDENTIALS {
            fill(
                bosh.credentials.entry((*name).to_string()).or_default(),
                &|| credentials.random_string("", PASSWORD_LENGTH),
            );
        }

        let address = format!("https://{external_ip}:25555");
        if bosh.director_address != address {
            bosh.director_address = address;
            changed = true;
        }

        let valid = !bosh.director_ssl_certificate.is_empty()
            && credentials.certificate_valid_for(
                &bosh.director_ssl_ca,
                &bosh.director_ssl_certificate,
                &external_ip,
            );
        if !valid {
            let bundle = credentials.x509_key_pair(DIRECTOR_CA_COMMON_NAME, &external_ip)?;
            bosh.director_ssl_ca = bundle.ca;
            bosh.director_ssl_certificate = bundle.certificate;
            bosh.director_ssl_private_key = bundle.private_key;
            changed = true;
        }

        if changed {
            self.checkpoint().await?;
        }
        Ok(())
    }

    async fn interpolate_manifest(&mut self) -> Result<()> {
        self.ensure_outputs().await?;
        let iaas = self.state.iaas.context("interpolating a manifest requires an iaas")?;
        let input = InterpolateInput {
            iaas,
            deployment_vars: director_vars::deployment_vars(&self.state, &self.outputs)?,
            variables: director_vars::variables_store(&self.state)?,
            ops_files: self.state.bosh.user_ops_files.clone(),
        };
        let interpolated = self
            .ports
            .deployer()
            .interpolate(&input)
            .await
            .context("interpolating director manifest")?;
        self.state.bosh.variables = interpolated.variables;
        self.state.bosh.manifest.clone_from(&interpolated.manifest);
        self.manifest = Some(interpolated.manifest);
        Ok(())
    }

    async fn create_director(&mut self) -> Result<()> {
        let manifest = self
            .manifest
            .clone()
            .context("director manifest has not been interpolated")?;
        self.reporter().step("running bosh create-env");
        let result = self
            .ports
            .deployer()
            .create_env(&manifest, &self.state.bosh.variables, &self.state.bosh.state)
            .await;
        match result {
            Ok(deployed) => {
                self.state.bosh.state = deployed;
                self.checkpoint().await?;
                self.reporter().step("finished bosh create-env");
                Ok(())
            }
            Err(ActuatorFailure::Partial { state, error }) => {
                self.state.bosh.state = state;
                self.checkpoint().await?;
                Err(manager_error(&error))
            }
            Err(ActuatorFailure::Failed(error)) => Err(error),
        }
    }

    async fn upload_cloud_config(&mut self) -> Result<()> {
        self.ensure_outputs().await?;
        self.reporter().step("generating cloud config");
        let cloud_config = cloud_config::generate(&self.state, &self.outputs)?;
        self.reporter().step("applying cloud config");
        self.ports
            .director()
            .upload_cloud_config(&DirectorTarget::from_bosh(&self.state.bosh), &cloud_config)
            .await
            .context("uploading cloud config")
    }

    async fn delete_director(&mut self) -> Result<()> {
        if !self.state.has_director() {
            self.reporter().step("no BOSH director, skipping...");
            return Ok(());
        }
        if self.state.bosh.manifest.is_empty() {
            self.interpolate_manifest().await?;
        }

        self.reporter().step("destroying bosh director");
        let bosh = &self.state.bosh;
        let result = self
            .ports
            .deployer()
            .delete_env(&bosh.manifest, &bosh.variables, &bosh.state)
            .await;
        match result {
            Ok(_) => {
                self.state.bosh = Bosh::default();
                self.checkpoint().await
            }
            Err(ActuatorFailure::Partial { state, error }) => {
                self.state.bosh.state = state;
                self.checkpoint().await?;
                Err(manager_error(&error))
            }
            Err(ActuatorFailure::Failed(error)) => Err(error),
        }
    }

    // ── State file ────────────────────────────────────────────────────────────

    async fn remove_state_file(&mut self) -> Result<()> {
        if !self.state.resources_released() {
            self.reporter()
                .warn("resources remain in bbl-state.json, not removing it");
            return self.checkpoint().await;
        }
        self.ports.store().remove().await
    }
}

/// Outputs of the infrastructure recorded in `state`, from whichever actuator owns it.
///
/// # Errors
///
/// Returns an error if the actuator cannot report outputs or the recorded
/// stack no longer exists.
pub async fn current_outputs<P: Ports>(
    ports: &P,
    state: &State,
    path: InfrastructurePath,
) -> Result<Outputs> {
    match path {
        InfrastructurePath::Legacy => {
            if state.stack.name.is_empty() {
                return Ok(Outputs::default());
            }
            let stack = ports
                .stacks()
                .describe_stack(&state.aws, &state.stack.name)
                .await?
                .with_context(|| format!("cloudformation stack {} not found", state.stack.name))?;
            Ok(cloudformation::normalize_outputs(&stack.outputs))
        }
        InfrastructurePath::Template => {
            if state.tf_state.is_empty() {
                return Ok(Outputs::default());
            }
            ports.infrastructure().outputs(state).await
        }
    }
}

fn manager_error(error: &anyhow::Error) -> anyhow::Error {
    BblError::Manager {
        message: format!("{error:#}"),
    }
    .into()
}
