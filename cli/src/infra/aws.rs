//! Infrastructure implementation of the `StackManager` port over the `aws` CLI.
//!
//! Credentials travel in the child's environment; an endpoint override is
//! passed as `--endpoint-url` on every call.

use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use serde_json::Value;

use crate::application::ports::{CommandRunner, Stack, StackManager, UploadedCertificate};
use crate::domain::CertificateMaterial;
use crate::domain::state::AwsConfig;
use crate::infra::command_runner::{ACTUATOR_TIMEOUT, TokioCommandRunner, check_success};

const CERTIFICATE_PREFIX: &str = "bbl-cert-";

/// Legacy AWS stack manager.
pub struct AwsCli<R: CommandRunner> {
    runner: R,
    endpoint: Option<String>,
}

impl<R: CommandRunner> AwsCli<R> {
    pub fn new(runner: R, endpoint: Option<String>) -> Self {
        Self { runner, endpoint }
    }

    async fn aws(&self, aws: &AwsConfig, args: &[&str]) -> Result<std::process::Output> {
        let mut full: Vec<&str> = vec!["--output", "json"];
        if let Some(endpoint) = &self.endpoint {
            full.push("--endpoint-url");
            full.push(endpoint);
        }
        full.extend_from_slice(args);
        let env = [
            ("AWS_ACCESS_KEY_ID", aws.access_key_id.as_str()),
            ("AWS_SECRET_ACCESS_KEY", aws.secret_access_key.as_str()),
            ("AWS_DEFAULT_REGION", aws.region.as_str()),
        ];
        self.runner
            .run_with_env("aws", &full, &env)
            .await
            .with_context(|| format!("aws {}", args.iter().take(2).copied().collect::<Vec<_>>().join(" ")))
    }

    /// Run and parse stdout as JSON, failing on non-zero exit.
    async fn aws_json(&self, aws: &AwsConfig, args: &[&str], what: &str) -> Result<Value> {
        let output = self.aws(aws, args).await?;
        check_success(&output, what)?;
        parse_json(&output.stdout, what)
    }
}

impl AwsCli<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner(endpoint: Option<String>) -> Self {
        Self::new(TokioCommandRunner::new(ACTUATOR_TIMEOUT), endpoint)
    }
}

impl<R: CommandRunner> StackManager for AwsCli<R> {
    async fn keypair_exists(&self, aws: &AwsConfig, name: &str) -> Result<bool> {
        let output = self
            .aws(aws, &["ec2", "describe-key-pairs", "--key-names", name])
            .await?;
        if output.status.success() {
            return Ok(true);
        }
        if stderr_contains(&output, "InvalidKeyPair.NotFound") {
            return Ok(false);
        }
        check_success(&output, "describing keypair").map(|()| false)
    }

    async fn import_keypair(&self, aws: &AwsConfig, name: &str, public_key: &str) -> Result<()> {
        let workdir = tempfile::tempdir().context("creating aws working directory")?;
        let key_path = write(workdir.path(), "key.pub", public_key)?;
        let material = format!("fileb://{}", key_path.display());
        let output = self
            .aws(
                aws,
                &["ec2", "import-key-pair", "--key-name", name, "--public-key-material", material.as_str()],
            )
            .await?;
        check_success(&output, "importing keypair")
    }

    async fn delete_keypair(&self, aws: &AwsConfig, name: &str) -> Result<()> {
        let output = self.aws(aws, &["ec2", "delete-key-pair", "--key-name", name]).await?;
        if stderr_contains(&output, "InvalidKeyPair.NotFound") {
            return Ok(());
        }
        check_success(&output, "deleting keypair")
    }

    async fn apply_stack(&self, aws: &AwsConfig, name: &str, template: &str) -> Result<Stack> {
        let workdir = tempfile::tempdir().context("creating aws working directory")?;
        let template_path = write(workdir.path(), "template.json", template)?;
        let template_arg = template_path.display().to_string();
        let output = self
            .aws(
                aws,
                &[
                    "cloudformation",
                    "deploy",
                    "--stack-name",
                    name,
                    "--template-file",
                    template_arg.as_str(),
                    "--capabilities",
                    "CAPABILITY_IAM",
                    "CAPABILITY_NAMED_IAM",
                    "--no-fail-on-empty-changeset",
                ],
            )
            .await?;
        check_success(&output, "deploying cloudformation stack")?;
        self.describe_stack(aws, name)
            .await?
            .with_context(|| format!("cloudformation stack {name} not found after deploy"))
    }

    async fn describe_stack(&self, aws: &AwsConfig, name: &str) -> Result<Option<Stack>> {
        let output = self
            .aws(aws, &["cloudformation", "describe-stacks", "--stack-name", name])
            .await?;
        if stderr_contains(&output, "does not exist") {
            return Ok(None);
        }
        check_success(&output, "describing cloudformation stack")?;
        parse_stack(&parse_json(&output.stdout, "describing cloudformation stack")?)
    }

    async fn delete_stack(&self, aws: &AwsConfig, name: &str) -> Result<()> {
        if self.describe_stack(aws, name).await?.is_none() {
            return Ok(());
        }
        let output = self
            .aws(aws, &["cloudformation", "delete-stack", "--stack-name", name])
            .await?;
        check_success(&output, "deleting cloudformation stack")?;
        let output = self
            .aws(
                aws,
                &["cloudformation", "wait", "stack-delete-complete", "--stack-name", name],
            )
            .await?;
        check_success(&output, "waiting for cloudformation stack deletion")
    }

    async fn upload_certificate(
        &self,
        aws: &AwsConfig,
        material: &CertificateMaterial,
    ) -> Result<UploadedCertificate> {
        let name = certificate_name();
        let workdir = tempfile::tempdir().context("creating aws working directory")?;
        let cert = format!("file://{}", write(workdir.path(), "cert.pem", &material.cert)?.display());
        let key = format!("file://{}", write(workdir.path(), "key.pem", &material.key)?.display());
        let chain = if material.chain.is_empty() {
            None
        } else {
            let path = write(workdir.path(), "chain.pem", &material.chain)?;
            Some(format!("file://{}", path.display()))
        };
        let mut args = vec![
            "iam",
            "upload-server-certificate",
            "--server-certificate-name",
            name.as_str(),
            "--certificate-body",
            cert.as_str(),
            "--private-key",
            key.as_str(),
        ];
        if let Some(chain) = &chain {
            args.push("--certificate-chain");
            args.push(chain);
        }
        let response = self.aws_json(aws, &args, "uploading certificate").await?;
        let arn = response
            .pointer("/ServerCertificateMetadata/Arn")
            .and_then(Value::as_str)
            .context("upload-server-certificate response has no ARN")?
            .to_string();
        Ok(UploadedCertificate { name, arn })
    }

    async fn certificate_arn(&self, aws: &AwsConfig, name: &str) -> Result<String> {
        let response = self
            .aws_json(
                aws,
                &["iam", "get-server-certificate", "--server-certificate-name", name],
                "describing certificate",
            )
            .await?;
        response
            .pointer("/ServerCertificate/ServerCertificateMetadata/Arn")
            .and_then(Value::as_str)
            .map(str::to_string)
            .with_context(|| format!("certificate {name} has no ARN"))
    }

    async fn delete_certificate(&self, aws: &AwsConfig, name: &str) -> Result<()> {
        let output = self
            .aws(aws, &["iam", "delete-server-certificate", "--server-certificate-name", name])
            .await?;
        if stderr_contains(&output, "NoSuchEntity") {
            return Ok(());
        }
        check_success(&output, "deleting certificate")
    }
}

fn certificate_name() -> String {
    let suffix: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{CERTIFICATE_PREFIX}{}", suffix.to_lowercase())
}

fn write(dir: &Path, name: &str, content: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn stderr_contains(output: &std::process::Output, needle: &str) -> bool {
    !output.status.success() && String::from_utf8_lossy(&output.stderr).contains(needle)
}

fn parse_json(stdout: &[u8], what: &str) -> Result<Value> {
    serde_json::from_slice(stdout).with_context(|| format!("{what}: unparsable aws response"))
}

/// The first stack of a `describe-stacks` response; deleted stacks count as absent.
fn parse_stack(response: &Value) -> Result<Option<Stack>> {
    let Some(stack) = response.pointer("/Stacks/0") else {
        return Ok(None);
    };
    if stack.get("StackStatus").and_then(Value::as_str) == Some("DELETE_COMPLETE") {
        return Ok(None);
    }
    let name = stack
        .get("StackName")
        .and_then(Value::as_str)
        .context("stack has no name")?
        .to_string();
    let outputs = stack
        .get("Outputs")
        .and_then(Value::as_array)
        .map(|outputs| {
            outputs
                .iter()
                .filter_map(|o| {
                    let key = o.get("OutputKey")?.as_str()?;
                    let value = o.get("OutputValue")?.as_str()?;
                    Some((key.to_string(), value.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(Some(Stack { name, outputs }))
}
