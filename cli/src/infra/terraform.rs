//! Infrastructure implementation of the `InfrastructureActuator` port.
//!
//! `TerraformExecutor<R>` lays out a scratch directory per call (embedded
//! templates, a tfvars file, certificate and credential files, the prior
//! `tfState`), runs `terraform` inside it through a `CommandRunner`, and reads
//! `terraform.tfstate` back whether or not the run succeeded.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::application::ports::{
    ActuatorFailure, Actuated, ApplyOutput, CommandRunner, InfrastructureActuator,
};
use crate::domain::{Iaas, Outputs, State};
use crate::infra::assets;
use crate::infra::command_runner::{
    ACTUATOR_TIMEOUT, DEFAULT_CMD_TIMEOUT, TokioCommandRunner, check_success,
};

const STATE_FILE: &str = "terraform.tfstate";
const VARS_FILE: &str = "bbl.tfvars.json";
const CREDENTIALS_FILE: &str = "credentials.json";
const CERT_FILE: &str = "lb.crt";
const KEY_FILE: &str = "lb.key";
const CHAIN_FILE: &str = "lb_chain.crt";

/// Template-driven actuator over the `terraform` binary.
///
/// Generic over `R: CommandRunner` so that tests can script terraform
/// without spawning real processes.
pub struct TerraformExecutor<R: CommandRunner> {
    cmd_runner: R,
    apply_runner: R,
}

impl<R: CommandRunner> TerraformExecutor<R> {
    pub fn new(cmd_runner: R, apply_runner: R) -> Self {
        Self {
            cmd_runner,
            apply_runner,
        }
    }

    /// Run a converging subcommand (`apply`/`destroy`) and read the state back.
    async fn converge(&self, state: &State, subcommand: &str) -> Actuated<String, String> {
        let workdir = tempfile::tempdir().context("creating terraform working directory")?;
        let dir = workdir.path();
        prepare(state, dir)?;

        let init = self
            .apply_runner
            .run_in(dir, "terraform", &["init", "-input=false"], &[])
            .await
            .context("terraform init")?;
        check_success(&init, "terraform init")?;

        let var_file = format!("-var-file={VARS_FILE}");
        let run = self
            .apply_runner
            .run_in(
                dir,
                "terraform",
                &[subcommand, "-auto-approve", "-input=false", var_file.as_str()],
                &[],
            )
            .await
            .with_context(|| format!("terraform {subcommand}"));
        let written = read_state(dir)?.unwrap_or_else(|| state.tf_state.clone());

        let error = match run {
            Ok(output) => match check_success(&output, &format!("terraform {subcommand}")) {
                Ok(()) => return Ok(written),
                Err(e) => e,
            },
            Err(e) => e,
        };
        Err(ActuatorFailure::Partial {
            state: written,
            error,
        })
    }
}

impl TerraformExecutor<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(
            TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            TokioCommandRunner::new(ACTUATOR_TIMEOUT),
        )
    }
}

impl<R: CommandRunner> InfrastructureActuator for TerraformExecutor<R> {
    async fn version(&self) -> Result<String> {
        let output = self
            .cmd_runner
            .run("terraform", &["version"])
            .await
            .context("terraform version")?;
        check_success(&output, "terraform version")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn apply(&self, state: &State) -> Actuated<ApplyOutput, String> {
        let tf_state = self.converge(state, "apply").await?;
        let mut applied = state.clone();
        applied.tf_state.clone_from(&tf_state);
        let outputs = self.outputs(&applied).await.map_err(|error| ActuatorFailure::Partial {
            state: tf_state.clone(),
            error,
        })?;
        Ok(ApplyOutput { tf_state, outputs })
    }

    async fn destroy(&self, state: &State) -> Actuated<String, String> {
        self.converge(state, "destroy").await
    }

    async fn outputs(&self, state: &State) -> Result<Outputs> {
        let workdir = tempfile::tempdir().context("creating terraform working directory")?;
        let dir = workdir.path();
        std::fs::write(dir.join(STATE_FILE), &state.tf_state).context("writing terraform state")?;
        let output = self
            .cmd_runner
            .run_in(dir, "terraform", &["output", "-json"], &[])
            .await
            .context("terraform output")?;
        check_success(&output, "terraform output")?;
        parse_outputs(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Write templates, variables and the prior state into `dir`.
fn prepare(state: &State, dir: &Path) -> Result<()> {
    let iaas = state.iaas.context("terraform requires an iaas")?;
    let lb = state.lb_type()?;
    assets::extract_terraform(iaas, lb, dir)?;
    if !state.tf_state.is_empty() {
        std::fs::write(dir.join(STATE_FILE), &state.tf_state).context("writing terraform state")?;
    }
    let vars = variables(state, dir)?;
    let content = serde_json::to_string_pretty(&vars).context("serializing terraform variables")?;
    std::fs::write(dir.join(VARS_FILE), content).context("writing terraform variables")?;
    Ok(())
}

/// Template variables for `state`; secrets that templates read as files are
/// written next to the templates.
fn variables(state: &State, dir: &Path) -> Result<Value> {
    let mut vars = Map::new();
    vars.insert("env_id".into(), json!(state.env_id));
    match state.iaas {
        Some(Iaas::Gcp) => {
            std::fs::write(dir.join(CREDENTIALS_FILE), &state.gcp.service_account_key)
                .context("writing gcp credentials")?;
            vars.insert("project_id".into(), json!(state.gcp.project_id));
            vars.insert("region".into(), json!(state.gcp.region));
            vars.insert("zone".into(), json!(state.gcp.zone));
            vars.insert("credentials".into(), json!(CREDENTIALS_FILE));
        }
        Some(Iaas::Aws) => {
            vars.insert("access_key".into(), json!(state.aws.access_key_id));
            vars.insert("secret_key".into(), json!(state.aws.secret_access_key));
            vars.insert("region".into(), json!(state.aws.region));
            vars.insert("ssh_public_key".into(), json!(state.key_pair.public_key));
        }
        None => anyhow::bail!("terraform requires an iaas"),
    }

    if !state.lb.cert.is_empty() {
        std::fs::write(dir.join(CERT_FILE), &state.lb.cert).context("writing lb certificate")?;
        std::fs::write(dir.join(KEY_FILE), &state.lb.key).context("writing lb key")?;
        vars.insert("ssl_certificate".into(), json!(CERT_FILE));
        vars.insert("ssl_certificate_private_key".into(), json!(KEY_FILE));
        if state.iaas == Some(Iaas::Aws) && !state.lb.chain.is_empty() {
            std::fs::write(dir.join(CHAIN_FILE), &state.lb.chain).context("writing lb chain")?;
            vars.insert("ssl_certificate_chain".into(), json!(CHAIN_FILE));
        }
    }
    Ok(Value::Object(vars))
}

fn read_state(dir: &Path) -> Result<Option<String>> {
    let path = dir.join(STATE_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Flatten `terraform output -json` into the canonical output map.
fn parse_outputs(json: &str) -> Result<Outputs> {
    if json.trim().is_empty() {
        return Ok(Outputs::default());
    }
    let document: Map<String, Value> =
        serde_json::from_str(json).context("parsing terraform outputs")?;
    Ok(document
        .into_iter()
        .map(|(name, output)| {
            let value = match output.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            (name, value)
        })
        .collect())
}
