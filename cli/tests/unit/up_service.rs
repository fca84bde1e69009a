//! Unit tests for the `bbl up` service.
//!
//! Exercises both infrastructure paths, resumption after a failed step, and
//! the pre-flight checks that must reject an invocation before any write.

#![allow(clippy::expect_used)]

use bbl::application::services::up::{UpOptions, up};
use bbl::domain::config::{AwsFlags, GcpFlags};
use bbl::domain::{BblError, Iaas, env_id};
use serde_json::json;

use crate::fakes::{DIRECTOR_ADDRESS, ENV_ID, FakePorts, aws_state, gcp_state};

fn aws_up() -> UpOptions {
    UpOptions {
        iaas: Some(Iaas::Aws),
        aws: AwsFlags {
            access_key_id: Some("access-key-id".to_string()),
            secret_access_key: Some("secret-access-key".to_string()),
            region: Some("us-west-1".to_string()),
        },
        ..UpOptions::default()
    }
}

fn gcp_up() -> UpOptions {
    UpOptions {
        iaas: Some(Iaas::Gcp),
        gcp: GcpFlags {
            service_account_key: Some(r#"{"project_id":"gcp-project"}"#.to_string()),
            region: Some("us-east1".to_string()),
            ..GcpFlags::default()
        },
        ..UpOptions::default()
    }
}

// ── Fresh environments ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_aws_up_creates_legacy_environment() {
    let ports = FakePorts::new();

    let state = up(&ports, aws_up()).await.expect("up");

    let env = state.env_id.clone();
    assert!(env_id::is_generated(&env), "unexpected env id {env}");
    assert_eq!(state.key_pair.name, format!("keypair-{env}"));
    assert_eq!(state.stack.name, format!("stack-{env}"));
    assert_eq!(state.bosh.director_name, format!("bosh-{env}"));
    assert_eq!(state.bosh.director_address, DIRECTOR_ADDRESS);
    assert_eq!(state.bosh.director_username, "admin");
    assert!(state.bosh.director_password.starts_with("p-"));
    assert!(state.tf_state.is_empty());
    assert!(state.has_director());

    assert_eq!(
        ports.steps(),
        vec![
            "creating keypair",
            "generating cloudformation template",
            "creating cloudformation stack",
            "finished applying cloudformation template",
            "running bosh create-env",
            "finished bosh create-env",
            "generating cloud config",
            "applying cloud config",
        ]
    );
    assert_eq!(
        ports.calls(),
        vec![
            format!("import-key-pair keypair-{env}"),
            format!("deploy-stack stack-{env}"),
            "create-env".to_string(),
            "update-cloud-config".to_string(),
        ]
    );
    assert_eq!(ports.stored(), state);
}

#[tokio::test]
async fn test_fresh_gcp_up_uses_template_actuator() {
    let ports = FakePorts::new();

    let state = up(&ports, gcp_up()).await.expect("up");

    assert_eq!(state.gcp.project_id, "gcp-project");
    assert_eq!(state.gcp.zone, "us-east1-a");
    assert_eq!(state.tf_state, "tf-state-1");
    assert!(state.stack.name.is_empty());
    assert_eq!(
        ports.calls(),
        vec!["terraform-apply", "create-env", "update-cloud-config"]
    );
    let applied = ports.infrastructure.applied.borrow();
    assert_eq!(applied[0].key_pair.public_key, "ssh-rsa public-key-1");
}

#[tokio::test]
async fn test_aws_up_with_terraform_flag_skips_legacy_actuator() {
    let ports = FakePorts::new();

    let state = up(&ports, UpOptions { terraform: true, ..aws_up() })
        .await
        .expect("up");

    assert_eq!(state.tf_state, "tf-state-1");
    assert!(state.stack.name.is_empty());
    assert!(ports.stacks.keypairs.borrow().is_empty());
    assert!(!ports.calls().iter().any(|c| c.starts_with("deploy-stack")));
}

#[tokio::test]
async fn test_up_with_name_uses_it_as_env_id() {
    let ports = FakePorts::new();

    let state = up(&ports, UpOptions { name: Some("my-env".to_string()), ..aws_up() })
        .await
        .expect("up");

    assert_eq!(state.env_id, "my-env");
    assert_eq!(state.stack.name, "stack-my-env");
}

#[tokio::test]
async fn test_up_no_director_stops_after_infrastructure() {
    let ports = FakePorts::new();
    ports.deployer.version.replace("bosh: command not found".to_string());

    let state = up(&ports, UpOptions { no_director: true, ..aws_up() })
        .await
        .expect("up");

    assert!(state.no_director);
    assert!(!state.has_director());
    assert!(state.bosh.director_password.is_empty());
    assert!(!ports.calls().contains(&"create-env".to_string()));
}

#[tokio::test]
async fn test_ops_files_are_passed_to_interpolation_and_persisted() {
    let ports = FakePorts::new();
    let ops = vec!["- type: replace\n  path: /name\n  value: x\n".to_string()];

    let state = up(&ports, UpOptions { ops_files: ops.clone(), ..gcp_up() })
        .await
        .expect("up");

    assert_eq!(state.bosh.user_ops_files, ops);
    assert_eq!(ports.deployer.interpolations.borrow()[0].ops_files, ops);
}

// ── Convergence and resumption ────────────────────────────────────────────────

#[tokio::test]
async fn test_up_resumes_after_keypair_import_failure() {
    let ports = FakePorts::new();
    ports.stacks.import_failures.set(1);

    let err = up(&ports, aws_up()).await.expect_err("keypair import fails");
    assert!(format!("{err:#}").contains("creating keypair"));
    let interrupted = ports.stored();
    assert!(!interrupted.env_id.is_empty());
    assert!(!interrupted.key_pair.private_key.is_empty());
    assert!(interrupted.stack.name.is_empty());

    let state = up(&ports, aws_up()).await.expect("resumed up");

    assert_eq!(state.env_id, interrupted.env_id);
    assert_eq!(state.key_pair, interrupted.key_pair);
    assert_eq!(ports.credentials.key_pairs.get(), 1);
    let imports = ports
        .calls()
        .iter()
        .filter(|c| c.starts_with("import-key-pair"))
        .count();
    assert_eq!(imports, 1);
    assert!(ports.stacks.keypairs.borrow().contains(&state.key_pair.name));
}

#[tokio::test]
async fn test_second_up_reuses_existing_resources() {
    let ports = FakePorts::aws_environment(aws_state());

    let state = up(&ports, UpOptions::default()).await.expect("up");

    assert_eq!(state.env_id, ENV_ID);
    assert_eq!(state.bosh.director_password, "p-secret");
    assert_eq!(ports.credentials.key_pairs.get(), 0);
    assert_eq!(ports.credentials.certificates.get(), 0);
    assert!(ports.steps().contains(&"using existing keypair".to_string()));
    assert!(ports.steps().contains(&"updating cloudformation stack".to_string()));
    assert!(!ports.calls().iter().any(|c| c.starts_with("import-key-pair")));
}

#[tokio::test]
async fn test_director_certificate_is_reissued_when_ip_changes() {
    let mut state = aws_state();
    state.bosh.director_ssl_certificate = "cert:10.0.0.99".to_string();
    let ports = FakePorts::aws_environment(state);

    let state = up(&ports, UpOptions::default()).await.expect("up");

    assert_eq!(ports.credentials.certificates.get(), 1);
    assert_eq!(state.bosh.director_ssl_certificate, "cert:52.0.0.1");
}

#[tokio::test]
async fn test_create_env_failure_persists_partial_deployer_state() {
    let ports = FakePorts::new();
    ports
        .deployer
        .fail_create
        .replace(Some(json!({ "current_vm_cid": "vm-partial" })));

    let err = up(&ports, gcp_up()).await.expect_err("create-env fails");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::Manager { .. })));
    let stored = ports.stored();
    assert_eq!(stored.bosh.state, json!({ "current_vm_cid": "vm-partial" }));
    assert_eq!(stored.tf_state, "tf-state-1");
    assert!(!ports.calls().contains(&"update-cloud-config".to_string()));
}

#[tokio::test]
async fn test_template_apply_failure_persists_partial_template_state() {
    let ports = FakePorts::new();
    ports.infrastructure.fail_apply.replace(Some("tf-partial".to_string()));

    let err = up(&ports, gcp_up()).await.expect_err("apply fails");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::Manager { .. })));
    assert_eq!(err.to_string(), "terraform apply failed");
    assert_eq!(ports.stored().tf_state, "tf-partial");
}

// ── Pre-flight rejections ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_iaas_mismatch_leaves_state_unchanged() {
    let ports = FakePorts::with_state(gcp_state());

    let err = up(&ports, aws_up()).await.expect_err("iaas cannot change");

    assert_eq!(
        err.to_string(),
        "The iaas type cannot be changed for an existing environment. The current iaas type is gcp."
    );
    assert_eq!(ports.store.writes.get(), 0);
    assert_eq!(ports.stored(), gcp_state());
    assert!(ports.calls().is_empty());
}

#[tokio::test]
async fn test_region_change_is_rejected() {
    let ports = FakePorts::aws_environment(aws_state());
    let mut opts = aws_up();
    opts.aws.region = Some("eu-west-1".to_string());

    let err = up(&ports, opts).await.expect_err("region cannot change");

    assert!(err.to_string().contains("The current region is us-west-1."));
    assert_eq!(ports.store.writes.get(), 0);
}

#[tokio::test]
async fn test_old_bosh_is_rejected_before_any_write() {
    let ports = FakePorts::new();
    ports
        .deployer
        .version
        .replace("version 1.9.0-abc-2017-01-01T00:00:00Z".to_string());

    let err = up(&ports, aws_up()).await.expect_err("bosh too old");

    assert_eq!(err.to_string(), "BOSH version must be at least v2.0.0");
    assert_eq!(ports.store.writes.get(), 0);
}

#[tokio::test]
async fn test_missing_iaas_is_reported() {
    let ports = FakePorts::new();

    let err = up(&ports, UpOptions::default()).await.expect_err("no iaas");

    assert_eq!(err.to_string(), "--iaas must be provided");
}

#[tokio::test]
async fn test_missing_aws_credentials_are_reported() {
    let ports = FakePorts::new();
    let mut opts = aws_up();
    opts.aws.secret_access_key = None;

    let err = up(&ports, opts).await.expect_err("no secret");

    assert_eq!(err.to_string(), "--aws-secret-access-key must be provided");
    assert_eq!(ports.store.writes.get(), 0);
}

#[tokio::test]
async fn test_no_director_rejected_once_director_exists() {
    let ports = FakePorts::aws_environment(aws_state());

    let err = up(&ports, UpOptions { no_director: true, ..UpOptions::default() })
        .await
        .expect_err("director exists");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::DirectorExists)));
}

#[tokio::test]
async fn test_name_cannot_change_for_existing_environment() {
    let ports = FakePorts::aws_environment(aws_state());

    let err = up(&ports, UpOptions { name: Some("other".to_string()), ..UpOptions::default() })
        .await
        .expect_err("name cannot change");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::EnvIdMismatch { .. })));
}

#[tokio::test]
async fn test_invalid_name_is_rejected() {
    let ports = FakePorts::new();

    let err = up(&ports, UpOptions { name: Some("Bad_Name".to_string()), ..aws_up() })
        .await
        .expect_err("invalid name");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::InvalidEnvId(_))));
    assert_eq!(ports.store.writes.get(), 0);
}
