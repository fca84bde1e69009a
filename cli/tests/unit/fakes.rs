//! Recording fakes for every application port.
//!
//! `FakePorts` bundles one fake per port. Mutating calls are appended to a
//! shared log so tests can assert ordering across actuators, and each fake
//! exposes knobs for injecting failures.

#![allow(clippy::expect_used, dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, bail};
use bbl::application::ports::{
    Actuated, ActuatorFailure, ApplyOutput, CertificateBundle, CredentialGenerator,
    DirectorClient, DirectorDeployer, DirectorInfo, DirectorTarget, InfrastructureActuator,
    InterpolateInput, Interpolated, Ports, ProgressReporter, Prompter, SshKeyPair, Stack,
    StackManager, StateStore, UploadedCertificate,
};
use bbl::domain::state::{AwsConfig, Bosh, GcpConfig, KeyPair, LoadBalancer};
use bbl::domain::{CertificateMaterial, Iaas, Outputs, State};
use serde_json::{Value, json};

pub const ENV_ID: &str = "bbl-env-lake-2017-01-02t03-04z";
pub const EXTERNAL_IP: &str = "52.0.0.1";
pub const DIRECTOR_ADDRESS: &str = "https://52.0.0.1:25555";
pub const CERTIFICATE_ARN_PREFIX: &str = "arn:aws:iam::123456789012:server-certificate/";

pub type CallLog = Rc<RefCell<Vec<String>>>;

fn record(log: &CallLog, call: impl Into<String>) {
    log.borrow_mut().push(call.into());
}

// ── State store ───────────────────────────────────────────────────────────────

pub struct MemoryStore {
    log: CallLog,
    dir: PathBuf,
    state: RefCell<Option<State>>,
    pub writes: Cell<usize>,
}

impl MemoryStore {
    pub fn current(&self) -> Option<State> {
        self.state.borrow().clone()
    }
}

impl StateStore for MemoryStore {
    async fn load(&self) -> Result<Option<State>> {
        Ok(self.state.borrow().clone())
    }

    async fn write(&self, state: &State) -> Result<()> {
        // Round-trip through JSON so unserializable state fails here too.
        let json = serde_json::to_string(state)?;
        self.state.replace(Some(serde_json::from_str(&json)?));
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        record(&self.log, "remove-state");
        self.state.replace(None);
        Ok(())
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

// ── Credentials ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCredentials {
    pub key_pairs: Cell<u32>,
    pub certificates: Cell<u32>,
}

impl CredentialGenerator for FakeCredentials {
    fn random_string(&self, prefix: &str, length: usize) -> String {
        format!("{prefix}{}", "x".repeat(length))
    }

    fn ssh_key_pair(&self) -> Result<SshKeyPair> {
        let n = self.key_pairs.get() + 1;
        self.key_pairs.set(n);
        Ok(SshKeyPair {
            private_key: format!("private-key-{n}"),
            public_key: format!("ssh-rsa public-key-{n}"),
        })
    }

    fn x509_key_pair(&self, ca_common_name: &str, common_name: &str) -> Result<CertificateBundle> {
        self.certificates.set(self.certificates.get() + 1);
        Ok(CertificateBundle {
            ca: format!("ca:{ca_common_name}"),
            certificate: format!("cert:{common_name}"),
            private_key: "cert-key".to_string(),
        })
    }

    fn certificate_valid_for(&self, _ca: &str, certificate: &str, common_name: &str) -> bool {
        certificate == format!("cert:{common_name}")
    }
}

// ── Template actuator ─────────────────────────────────────────────────────────

pub struct FakeInfrastructure {
    log: CallLog,
    pub version: RefCell<String>,
    pub outputs: RefCell<Outputs>,
    /// Every state passed to `apply`, in order.
    pub applied: RefCell<Vec<State>>,
    /// Partial template state returned by the next `apply`.
    pub fail_apply: RefCell<Option<String>>,
    /// Partial template state returned by the next `destroy`.
    pub fail_destroy: RefCell<Option<String>>,
}

impl InfrastructureActuator for FakeInfrastructure {
    async fn version(&self) -> Result<String> {
        Ok(self.version.borrow().clone())
    }

    async fn apply(&self, state: &State) -> Actuated<ApplyOutput, String> {
        record(&self.log, "terraform-apply");
        self.applied.borrow_mut().push(state.clone());
        if let Some(partial) = self.fail_apply.take() {
            return Err(ActuatorFailure::Partial {
                state: partial,
                error: anyhow::anyhow!("terraform apply failed"),
            });
        }
        let applies = self.applied.borrow().len();
        Ok(ApplyOutput {
            tf_state: format!("tf-state-{applies}"),
            outputs: self.outputs.borrow().clone(),
        })
    }

    async fn destroy(&self, _state: &State) -> Actuated<String, String> {
        record(&self.log, "terraform-destroy");
        if let Some(partial) = self.fail_destroy.take() {
            return Err(ActuatorFailure::Partial {
                state: partial,
                error: anyhow::anyhow!("terraform destroy failed"),
            });
        }
        Ok(String::new())
    }

    async fn outputs(&self, _state: &State) -> Result<Outputs> {
        Ok(self.outputs.borrow().clone())
    }
}

// ── Legacy AWS actuator ───────────────────────────────────────────────────────

pub struct FakeStacks {
    log: CallLog,
    pub keypairs: RefCell<BTreeSet<String>>,
    /// Number of upcoming `import_keypair` calls that fail.
    pub import_failures: Cell<u32>,
    pub stacks: RefCell<BTreeMap<String, Stack>>,
    /// Outputs every applied stack reports.
    pub outputs: RefCell<BTreeMap<String, String>>,
    /// Every template passed to `apply_stack`, in order.
    pub templates: RefCell<Vec<String>>,
    pub certificates: RefCell<BTreeMap<String, String>>,
    /// Number of upcoming `apply_stack` calls that fail.
    pub apply_failures: Cell<u32>,
    pub fail_delete_stack: Cell<bool>,
    pub fail_delete_keypair: Cell<bool>,
    uploads: Cell<u32>,
}

impl FakeStacks {
    pub fn seed_stack(&self, name: &str) {
        let stack = Stack {
            name: name.to_string(),
            outputs: self.outputs.borrow().clone(),
        };
        self.stacks.borrow_mut().insert(name.to_string(), stack);
    }

    pub fn seed_certificate(&self, name: &str) {
        self.certificates
            .borrow_mut()
            .insert(name.to_string(), format!("{CERTIFICATE_ARN_PREFIX}{name}"));
    }
}

impl StackManager for FakeStacks {
    async fn keypair_exists(&self, _aws: &AwsConfig, name: &str) -> Result<bool> {
        Ok(self.keypairs.borrow().contains(name))
    }

    async fn import_keypair(&self, _aws: &AwsConfig, name: &str, _public_key: &str) -> Result<()> {
        if self.import_failures.get() > 0 {
            self.import_failures.set(self.import_failures.get() - 1);
            bail!("RequestLimitExceeded");
        }
        record(&self.log, format!("import-key-pair {name}"));
        self.keypairs.borrow_mut().insert(name.to_string());
        Ok(())
    }

    async fn delete_keypair(&self, _aws: &AwsConfig, name: &str) -> Result<()> {
        if self.fail_delete_keypair.get() {
            bail!("UnauthorizedOperation");
        }
        record(&self.log, format!("delete-key-pair {name}"));
        self.keypairs.borrow_mut().remove(name);
        Ok(())
    }

    async fn apply_stack(&self, _aws: &AwsConfig, name: &str, template: &str) -> Result<Stack> {
        if self.apply_failures.get() > 0 {
            self.apply_failures.set(self.apply_failures.get() - 1);
            bail!("stack {name} entered UPDATE_ROLLBACK_COMPLETE");
        }
        record(&self.log, format!("deploy-stack {name}"));
        self.templates.borrow_mut().push(template.to_string());
        self.seed_stack(name);
        Ok(Stack {
            name: name.to_string(),
            outputs: self.outputs.borrow().clone(),
        })
    }

    async fn describe_stack(&self, _aws: &AwsConfig, name: &str) -> Result<Option<Stack>> {
        Ok(self.stacks.borrow().get(name).cloned())
    }

    async fn delete_stack(&self, _aws: &AwsConfig, name: &str) -> Result<()> {
        if self.fail_delete_stack.get() {
            bail!("stack {name} entered DELETE_FAILED");
        }
        record(&self.log, format!("delete-stack {name}"));
        self.stacks.borrow_mut().remove(name);
        Ok(())
    }

    async fn upload_certificate(
        &self,
        _aws: &AwsConfig,
        _material: &CertificateMaterial,
    ) -> Result<UploadedCertificate> {
        let n = self.uploads.get() + 1;
        self.uploads.set(n);
        let name = format!("bbl-cert-{n}");
        record(&self.log, format!("upload-certificate {name}"));
        self.seed_certificate(&name);
        Ok(UploadedCertificate {
            arn: format!("{CERTIFICATE_ARN_PREFIX}{name}"),
            name,
        })
    }

    async fn certificate_arn(&self, _aws: &AwsConfig, name: &str) -> Result<String> {
        match self.certificates.borrow().get(name) {
            Some(arn) => Ok(arn.clone()),
            None => bail!("certificate {name} not found"),
        }
    }

    async fn delete_certificate(&self, _aws: &AwsConfig, name: &str) -> Result<()> {
        record(&self.log, format!("delete-certificate {name}"));
        self.certificates.borrow_mut().remove(name);
        Ok(())
    }
}

// ── Director deployer ─────────────────────────────────────────────────────────

pub struct FakeDeployer {
    log: CallLog,
    pub version: RefCell<String>,
    pub interpolations: RefCell<Vec<InterpolateInput>>,
    /// Partial deployer state returned by the next `create_env`.
    pub fail_create: RefCell<Option<Value>>,
    /// Partial deployer state returned by the next `delete_env`.
    pub fail_delete: RefCell<Option<Value>>,
}

impl DirectorDeployer for FakeDeployer {
    async fn version(&self) -> Result<String> {
        Ok(self.version.borrow().clone())
    }

    async fn interpolate(&self, input: &InterpolateInput) -> Result<Interpolated> {
        self.interpolations.borrow_mut().push(input.clone());
        Ok(Interpolated {
            manifest: format!("manifest-for-{}", input.iaas),
            variables: input.variables.clone(),
        })
    }

    async fn create_env(&self, _manifest: &str, _variables: &str, _previous: &Value) -> Actuated<Value, Value> {
        record(&self.log, "create-env");
        if let Some(partial) = self.fail_create.take() {
            return Err(ActuatorFailure::Partial {
                state: partial,
                error: anyhow::anyhow!("bosh create-env failed"),
            });
        }
        Ok(json!({ "current_vm_cid": "vm-1" }))
    }

    async fn delete_env(&self, _manifest: &str, _variables: &str, _previous: &Value) -> Actuated<Value, Value> {
        record(&self.log, "delete-env");
        if let Some(partial) = self.fail_delete.take() {
            return Err(ActuatorFailure::Partial {
                state: partial,
                error: anyhow::anyhow!("bosh delete-env failed"),
            });
        }
        Ok(Value::Null)
    }
}

// ── Director API ──────────────────────────────────────────────────────────────

pub struct FakeDirector {
    log: CallLog,
    pub reachable: Cell<bool>,
    pub cloud_configs: RefCell<Vec<String>>,
}

impl DirectorClient for FakeDirector {
    async fn info(&self, target: &DirectorTarget<'_>) -> Result<DirectorInfo> {
        if !self.reachable.get() {
            bail!("connecting to director at {}: connection refused", target.address);
        }
        Ok(DirectorInfo {
            name: "bosh".to_string(),
            uuid: "uuid".to_string(),
            version: "262.3.0".to_string(),
        })
    }

    async fn upload_cloud_config(&self, _target: &DirectorTarget<'_>, cloud_config: &str) -> Result<()> {
        record(&self.log, "update-cloud-config");
        self.cloud_configs.borrow_mut().push(cloud_config.to_string());
        Ok(())
    }
}

// ── Operator interaction ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingReporter {
    pub steps: RefCell<Vec<String>>,
    pub warnings: RefCell<Vec<String>>,
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.steps.borrow_mut().push(message.to_string());
    }

    fn warn(&self, message: &str) {
        self.warnings.borrow_mut().push(message.to_string());
    }
}

pub struct FakePrompter {
    answer: bool,
    pub questions: RefCell<Vec<String>>,
}

impl FakePrompter {
    pub fn accepting() -> Self {
        Self {
            answer: true,
            questions: RefCell::new(Vec::new()),
        }
    }

    /// An operator who answers no, or closes stdin.
    pub fn declining() -> Self {
        Self {
            answer: false,
            questions: RefCell::new(Vec::new()),
        }
    }
}

impl Prompter for FakePrompter {
    async fn confirm(&self, question: &str) -> Result<bool> {
        self.questions.borrow_mut().push(question.to_string());
        Ok(self.answer)
    }
}

// ── Composite ─────────────────────────────────────────────────────────────────

pub struct FakePorts {
    pub log: CallLog,
    pub store: MemoryStore,
    pub credentials: FakeCredentials,
    pub infrastructure: FakeInfrastructure,
    pub stacks: FakeStacks,
    pub deployer: FakeDeployer,
    pub director: FakeDirector,
    pub reporter: RecordingReporter,
}

impl FakePorts {
    /// Ports over an empty state directory.
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            store: MemoryStore {
                log: Rc::clone(&log),
                dir: PathBuf::from("/tmp/bbl-test"),
                state: RefCell::new(None),
                writes: Cell::new(0),
            },
            credentials: FakeCredentials::default(),
            infrastructure: FakeInfrastructure {
                log: Rc::clone(&log),
                version: RefCell::new("Terraform v0.11.7".to_string()),
                outputs: RefCell::new(template_outputs()),
                applied: RefCell::new(Vec::new()),
                fail_apply: RefCell::new(None),
                fail_destroy: RefCell::new(None),
            },
            stacks: FakeStacks {
                log: Rc::clone(&log),
                keypairs: RefCell::new(BTreeSet::new()),
                import_failures: Cell::new(0),
                stacks: RefCell::new(BTreeMap::new()),
                outputs: RefCell::new(stack_outputs()),
                templates: RefCell::new(Vec::new()),
                certificates: RefCell::new(BTreeMap::new()),
                apply_failures: Cell::new(0),
                fail_delete_stack: Cell::new(false),
                fail_delete_keypair: Cell::new(false),
                uploads: Cell::new(0),
            },
            deployer: FakeDeployer {
                log: Rc::clone(&log),
                version: RefCell::new("version 2.0.48-e94aeeb-2018-01-09T23:08:07Z".to_string()),
                interpolations: RefCell::new(Vec::new()),
                fail_create: RefCell::new(None),
                fail_delete: RefCell::new(None),
            },
            director: FakeDirector {
                log: Rc::clone(&log),
                reachable: Cell::new(true),
                cloud_configs: RefCell::new(Vec::new()),
            },
            reporter: RecordingReporter::default(),
            log,
        }
    }

    /// Ports over a state directory holding `state`. Does not count as a write.
    pub fn with_state(state: State) -> Self {
        let ports = Self::new();
        ports.store.state.replace(Some(state));
        ports
    }

    /// A legacy AWS environment whose keypair and stack exist in the fake cloud.
    pub fn aws_environment(state: State) -> Self {
        let ports = Self::with_state(state.clone());
        ports.stacks.keypairs.borrow_mut().insert(state.key_pair.name.clone());
        ports.stacks.seed_stack(&state.stack.name);
        if !state.stack.certificate_name.is_empty() {
            ports.stacks.seed_certificate(&state.stack.certificate_name);
        }
        ports
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn steps(&self) -> Vec<String> {
        self.reporter.steps.borrow().clone()
    }

    pub fn stored(&self) -> State {
        self.store.current().expect("state file should exist")
    }
}

impl Ports for FakePorts {
    type Store = MemoryStore;
    type Credentials = FakeCredentials;
    type Infrastructure = FakeInfrastructure;
    type Stacks = FakeStacks;
    type Deployer = FakeDeployer;
    type Director = FakeDirector;
    type Reporter = RecordingReporter;

    fn store(&self) -> &Self::Store {
        &self.store
    }

    fn credentials(&self) -> &Self::Credentials {
        &self.credentials
    }

    fn infrastructure(&self) -> &Self::Infrastructure {
        &self.infrastructure
    }

    fn stacks(&self) -> &Self::Stacks {
        &self.stacks
    }

    fn deployer(&self) -> &Self::Deployer {
        &self.deployer
    }

    fn director(&self) -> &Self::Director {
        &self.director
    }

    fn reporter(&self) -> &Self::Reporter {
        &self.reporter
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// CloudFormation outputs of a stack with every load balancer attached.
pub fn stack_outputs() -> BTreeMap<String, String> {
    [
        ("VPCID", "vpc-1234"),
        ("BOSHSubnet", "subnet-1234"),
        ("BOSHSubnetAZ", "us-west-1a"),
        ("BOSHEIP", EXTERNAL_IP),
        ("BOSHURL", DIRECTOR_ADDRESS),
        ("BOSHSecurityGroup", "sg-bosh"),
        ("InternalSecurityGroup", "sg-internal"),
        ("BOSHUserAccessKey", "bosh-access-key"),
        ("BOSHUserSecretAccessKey", "bosh-secret-key"),
        ("CFRouterLoadBalancer", "cf-router-elb"),
        ("CFRouterLoadBalancerURL", "cf-router.elb.amazonaws.com"),
        ("CFRouterInternalSecurityGroup", "sg-cf-router"),
        ("CFSSHProxyLoadBalancer", "cf-ssh-proxy-elb"),
        ("CFSSHProxyLoadBalancerURL", "cf-ssh-proxy.elb.amazonaws.com"),
        ("CFSSHProxyInternalSecurityGroup", "sg-cf-ssh-proxy"),
        ("ConcourseLoadBalancer", "concourse-elb"),
        ("ConcourseLoadBalancerURL", "concourse.elb.amazonaws.com"),
        ("ConcourseInternalSecurityGroup", "sg-concourse"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Template outputs covering both providers and every load balancer.
pub fn template_outputs() -> Outputs {
    [
        ("external_ip", EXTERNAL_IP),
        ("director_address", DIRECTOR_ADDRESS),
        ("network_name", "bbl-network"),
        ("subnetwork_name", "bbl-subnet"),
        ("bosh_open_tag_name", "bbl-bosh-open"),
        ("internal_tag_name", "bbl-internal"),
        ("vpc_id", "vpc-1234"),
        ("subnet_id", "subnet-1234"),
        ("az", "us-west-1a"),
        ("default_security_group", "sg-bosh"),
        ("internal_security_group", "sg-internal"),
        ("router_lb_ip", "35.0.0.1"),
        ("ssh_proxy_lb_ip", "35.0.0.2"),
        ("tcp_router_lb_ip", "35.0.0.3"),
        ("ws_lb_ip", "35.0.0.4"),
        ("concourse_lb_ip", "35.0.0.5"),
        ("router_backend_service", "router-backend"),
        ("ssh_proxy_target_pool", "ssh-proxy-pool"),
        ("tcp_router_target_pool", "tcp-router-pool"),
        ("ws_target_pool", "ws-pool"),
        ("concourse_target_pool", "concourse-pool"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn director() -> Bosh {
    Bosh {
        director_name: format!("bosh-{ENV_ID}"),
        director_username: "admin".to_string(),
        director_password: "p-secret".to_string(),
        director_address: DIRECTOR_ADDRESS.to_string(),
        director_ssl_ca: "ca:BOSH Bootloader".to_string(),
        director_ssl_certificate: format!("cert:{EXTERNAL_IP}"),
        director_ssl_private_key: "cert-key".to_string(),
        manifest: "manifest-for-aws".to_string(),
        state: json!({ "current_vm_cid": "vm-1" }),
        variables: "admin_password: p-secret\n".to_string(),
        ..Bosh::default()
    }
}

/// A legacy AWS environment with a running director and no load balancer.
pub fn aws_state() -> State {
    State {
        iaas: Some(Iaas::Aws),
        env_id: ENV_ID.to_string(),
        aws: AwsConfig {
            access_key_id: "access-key-id".to_string(),
            secret_access_key: "secret-access-key".to_string(),
            region: "us-west-1".to_string(),
        },
        key_pair: KeyPair {
            name: format!("keypair-{ENV_ID}"),
            private_key: "private-key-0".to_string(),
            public_key: "ssh-rsa public-key-0".to_string(),
        },
        stack: bbl::domain::state::Stack {
            name: format!("stack-{ENV_ID}"),
            ..Default::default()
        },
        bosh: director(),
        ..State::default()
    }
}

/// `aws_state` with a cf load balancer and its uploaded certificate.
pub fn aws_state_with_cf_lb() -> State {
    let mut state = aws_state();
    state.stack.lb_type = "cf".to_string();
    state.stack.certificate_name = "bbl-cert-old".to_string();
    state.lb = LoadBalancer {
        lb_type: "cf".to_string(),
        cert: "OLD CERT".to_string(),
        key: "OLD KEY".to_string(),
        chain: String::new(),
    };
    state
}

/// A template-driven GCP environment without a director.
pub fn gcp_state() -> State {
    State {
        iaas: Some(Iaas::Gcp),
        env_id: ENV_ID.to_string(),
        no_director: true,
        gcp: GcpConfig {
            project_id: "gcp-project".to_string(),
            service_account_key: r#"{"project_id":"gcp-project"}"#.to_string(),
            region: "us-east1".to_string(),
            zone: "us-east1-b".to_string(),
        },
        key_pair: KeyPair {
            name: format!("keypair-{ENV_ID}"),
            private_key: "private-key-0".to_string(),
            public_key: "ssh-rsa public-key-0".to_string(),
        },
        tf_state: "tf-state-0".to_string(),
        ..State::default()
    }
}

pub fn certificate(cert: &str, key: &str) -> CertificateMaterial {
    CertificateMaterial {
        cert: cert.to_string(),
        key: key.to_string(),
        chain: String::new(),
    }
}
