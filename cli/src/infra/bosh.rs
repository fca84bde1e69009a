//! Infrastructure implementation of the `DirectorDeployer` port.
//!
//! `BoshCli<R>` drives `bosh interpolate`, `bosh create-env` and
//! `bosh delete-env` against files in a scratch directory. The deployer's
//! state file is read back after every run, successful or not.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::application::ports::{
    ActuatorFailure, Actuated, CommandRunner, DirectorDeployer, InterpolateInput, Interpolated,
};
use crate::infra::assets;
use crate::infra::command_runner::{
    ACTUATOR_TIMEOUT, DEFAULT_CMD_TIMEOUT, TokioCommandRunner, check_success,
};

const MANIFEST_TEMPLATE: &str = "bosh.yml";
const CPI_OPS_FILE: &str = "cpi.yml";
const DEPLOYMENT_VARS: &str = "deployment-vars.yml";
const VARS_STORE: &str = "variables.yml";
const MANIFEST: &str = "manifest.yml";
const DEPLOYER_STATE: &str = "state.json";

/// Director deployer over the `bosh` CLI.
pub struct BoshCli<R: CommandRunner> {
    cmd_runner: R,
    deploy_runner: R,
}

impl<R: CommandRunner> BoshCli<R> {
    pub fn new(cmd_runner: R, deploy_runner: R) -> Self {
        Self {
            cmd_runner,
            deploy_runner,
        }
    }

    async fn converge(
        &self,
        subcommand: &str,
        manifest: &str,
        variables: &str,
        previous: &Value,
    ) -> Actuated<Value, Value> {
        let workdir = tempfile::tempdir().context("creating bosh working directory")?;
        let dir = workdir.path();
        write(dir, MANIFEST, manifest)?;
        write(dir, VARS_STORE, variables)?;
        if !previous.is_null() {
            let content = serde_json::to_string(previous).context("serializing deployer state")?;
            write(dir, DEPLOYER_STATE, &content)?;
        }

        let run = self
            .deploy_runner
            .run_in(
                dir,
                "bosh",
                &[
                    subcommand,
                    MANIFEST,
                    "--state",
                    DEPLOYER_STATE,
                    "--vars-store",
                    VARS_STORE,
                ],
                &[],
            )
            .await
            .with_context(|| format!("bosh {subcommand}"));
        let written = read_state(dir)?.unwrap_or_else(|| previous.clone());

        let error = match run {
            Ok(output) => match check_success(&output, &format!("bosh {subcommand}")) {
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

impl BoshCli<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(
            TokioCommandRunner::new(DEFAULT_CMD_TIMEOUT),
            TokioCommandRunner::new(ACTUATOR_TIMEOUT),
        )
    }
}

impl<R: CommandRunner> DirectorDeployer for BoshCli<R> {
    async fn version(&self) -> Result<String> {
        let output = self.cmd_runner.run("bosh", &["-v"]).await.context("bosh -v")?;
        check_success(&output, "bosh -v")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn interpolate(&self, input: &InterpolateInput) -> Result<Interpolated> {
        let workdir = tempfile::tempdir().context("creating bosh working directory")?;
        let dir = workdir.path();
        write(dir, MANIFEST_TEMPLATE, assets::director_manifest()?)?;
        write(dir, CPI_OPS_FILE, assets::cpi_ops_file(input.iaas)?)?;
        write(dir, DEPLOYMENT_VARS, &input.deployment_vars)?;
        write(dir, VARS_STORE, &input.variables)?;

        let user_ops: Vec<String> = (0..input.ops_files.len())
            .map(|i| format!("user-ops-{i}.yml"))
            .collect();
        for (name, content) in user_ops.iter().zip(&input.ops_files) {
            write(dir, name, content)?;
        }

        let mut args = vec![
            "interpolate",
            MANIFEST_TEMPLATE,
            "--vars-store",
            VARS_STORE,
            "--vars-file",
            DEPLOYMENT_VARS,
            "-o",
            CPI_OPS_FILE,
        ];
        for name in &user_ops {
            args.push("-o");
            args.push(name);
        }

        let output = self
            .cmd_runner
            .run_in(dir, "bosh", &args, &[])
            .await
            .context("bosh interpolate")?;
        check_success(&output, "bosh interpolate")?;

        let variables = std::fs::read_to_string(dir.join(VARS_STORE))
            .context("reading bosh variables store")?;
        Ok(Interpolated {
            manifest: String::from_utf8_lossy(&output.stdout).into_owned(),
            variables,
        })
    }

    async fn create_env(&self, manifest: &str, variables: &str, previous: &Value) -> Actuated<Value, Value> {
        self.converge("create-env", manifest, variables, previous).await
    }

    async fn delete_env(&self, manifest: &str, variables: &str, previous: &Value) -> Actuated<Value, Value> {
        self.converge("delete-env", manifest, variables, previous).await
    }
}

fn write(dir: &Path, name: &str, content: &str) -> Result<()> {
    std::fs::write(dir.join(name), content).with_context(|| format!("writing {name}"))
}

/// The deployer's state document, if it wrote a non-empty one.
fn read_state(dir: &Path) -> Result<Option<Value>> {
    let path = dir.join(DEPLOYER_STATE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    let state = serde_json::from_str(&content).context("parsing bosh deployer state")?;
    Ok(Some(state))
}
