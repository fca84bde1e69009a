//! Unit tests for the read-only views over the state document.

#![allow(clippy::expect_used)]

use bbl::application::services::queries::{self, Field};
use bbl::domain::State;

use crate::fakes::{DIRECTOR_ADDRESS, ENV_ID, FakePorts, aws_state, gcp_state};

#[test]
fn test_fields_read_from_state() {
    let state = aws_state();
    assert_eq!(queries::field(&state, Field::EnvId).expect("env id"), ENV_ID);
    assert_eq!(
        queries::field(&state, Field::DirectorAddress).expect("address"),
        DIRECTOR_ADDRESS
    );
    assert_eq!(queries::field(&state, Field::DirectorUsername).expect("username"), "admin");
    assert_eq!(queries::field(&state, Field::DirectorPassword).expect("password"), "p-secret");
    assert_eq!(
        queries::field(&state, Field::DirectorCaCert).expect("ca"),
        "ca:BOSH Bootloader"
    );
    assert_eq!(queries::field(&state, Field::SshKey).expect("ssh key"), "private-key-0");
}

#[test]
fn test_missing_fields_name_what_was_requested() {
    let state = State::default();
    for (field, label) in [
        (Field::EnvId, "environment id"),
        (Field::DirectorPassword, "director password"),
        (Field::SshKey, "ssh key"),
    ] {
        let err = queries::field(&state, field).expect_err("missing");
        assert_eq!(
            err.to_string(),
            format!("Could not retrieve {label}, please make sure you are targeting the proper state dir.")
        );
    }
}

#[test]
fn test_print_env_requires_a_director() {
    let err = queries::print_env(&gcp_state()).expect_err("no director");
    assert!(err.to_string().contains("director username"));
}

#[tokio::test]
async fn test_deployment_vars_for_gcp_come_from_template_outputs() {
    let state = gcp_state();
    let ports = FakePorts::with_state(state.clone());

    let vars = queries::deployment_vars(&ports, &state).await.expect("vars");

    let yaml: serde_yaml::Value = serde_yaml::from_str(&vars).expect("yaml");
    assert_eq!(yaml["network"], "bbl-network");
    assert_eq!(yaml["zone"], "us-east1-b");
    assert_eq!(yaml["project_id"], "gcp-project");
    assert_eq!(yaml["internal_ip"], "10.0.0.6");
    assert!(ports.calls().is_empty());
}

#[tokio::test]
async fn test_cloud_config_for_aws_comes_from_stack_outputs() {
    let state = aws_state();
    let ports = FakePorts::aws_environment(state.clone());

    let cloud_config = queries::cloud_config(&ports, &state).await.expect("cloud config");

    assert!(cloud_config.contains("subnet-1234"));
    assert!(cloud_config.contains("sg-internal"));
}

#[tokio::test]
async fn test_cloud_config_without_infrastructure() {
    let state = State::default();
    let ports = FakePorts::with_state(state.clone());

    let err = queries::cloud_config(&ports, &state).await.expect_err("no infrastructure");

    assert!(err.to_string().starts_with("Could not retrieve infrastructure outputs"));
}
