//! Unit tests for `create-lbs`, `update-lbs`, `delete-lbs` and `lbs`.

#![allow(clippy::expect_used)]

use bbl::application::services::load_balancers::{
    CreateLbsOptions, UpdateLbsOptions, create_lbs, delete_lbs, lb_endpoints, update_lbs,
};
use bbl::domain::BblError;
use bbl::domain::state::LoadBalancer;

use crate::fakes::{
    CERTIFICATE_ARN_PREFIX, ENV_ID, FakePorts, aws_state, aws_state_with_cf_lb, certificate,
    gcp_state,
};

fn create(lb_type: &str) -> CreateLbsOptions {
    CreateLbsOptions {
        lb_type: lb_type.to_string(),
        material: certificate("CERT", "KEY"),
        skip_if_exists: false,
    }
}

// ── create-lbs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_lbs_on_aws_uploads_certificate_and_updates_stack() {
    let ports = FakePorts::aws_environment(aws_state());

    create_lbs(&ports, create("cf")).await.expect("create-lbs");

    assert_eq!(
        ports.calls(),
        vec![
            "upload-certificate bbl-cert-1".to_string(),
            format!("deploy-stack stack-{ENV_ID}"),
            "update-cloud-config".to_string(),
        ]
    );
    let stored = ports.stored();
    assert_eq!(stored.stack.lb_type, "cf");
    assert_eq!(stored.stack.certificate_name, "bbl-cert-1");
    assert_eq!(stored.lb.cert, "CERT");
    assert_eq!(stored.lb.key, "KEY");

    let template = ports.stacks.templates.borrow().last().cloned().expect("template");
    assert!(template.contains(&format!("{CERTIFICATE_ARN_PREFIX}bbl-cert-1")));
    let cloud_config = ports.director.cloud_configs.borrow().last().cloned().expect("cloud config");
    assert!(cloud_config.contains("cf-router-elb"));
}

#[tokio::test]
async fn test_create_lbs_rejects_a_second_type() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());

    let err = create_lbs(&ports, create("concourse"))
        .await
        .expect_err("cf already attached");

    assert_eq!(
        err.to_string(),
        "bbl already has a cf load balancer attached, please remove the previous load balancer before attaching a new one"
    );
    assert!(ports.calls().is_empty());
    assert_eq!(ports.store.writes.get(), 0);
}

#[tokio::test]
async fn test_create_lbs_skip_if_exists_is_a_no_op() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());
    let opts = CreateLbsOptions {
        skip_if_exists: true,
        ..create("concourse")
    };

    create_lbs(&ports, opts).await.expect("skipped");

    assert_eq!(ports.steps(), vec!["lb type \"cf\" exists, skipping..."]);
    assert!(ports.calls().is_empty());
}

#[tokio::test]
async fn test_create_lbs_rejects_unknown_type() {
    let ports = FakePorts::aws_environment(aws_state());

    let err = create_lbs(&ports, create("haproxy")).await.expect_err("bad type");

    assert_eq!(
        err.to_string(),
        "\"haproxy\" is not a valid lb type, valid lb types are: concourse and cf"
    );
}

#[tokio::test]
async fn test_create_lbs_on_aws_requires_certificate_and_key() {
    let ports = FakePorts::aws_environment(aws_state());

    let mut opts = create("concourse");
    opts.material.cert.clear();
    let err = create_lbs(&ports, opts).await.expect_err("no cert");
    assert_eq!(err.to_string(), "--cert must be provided");

    let mut opts = create("concourse");
    opts.material.key.clear();
    let err = create_lbs(&ports, opts).await.expect_err("no key");
    assert_eq!(err.to_string(), "--key must be provided");
}

#[tokio::test]
async fn test_create_concourse_lb_on_gcp_needs_no_certificate() {
    let ports = FakePorts::with_state(gcp_state());
    let opts = CreateLbsOptions {
        lb_type: "concourse".to_string(),
        ..CreateLbsOptions::default()
    };

    create_lbs(&ports, opts).await.expect("create-lbs");

    assert_eq!(ports.calls(), vec!["terraform-apply"]);
    let applied = ports.infrastructure.applied.borrow();
    assert_eq!(applied[0].lb.lb_type, "concourse");
    assert_eq!(ports.stored().lb.lb_type, "concourse");
    assert_eq!(ports.stored().tf_state, "tf-state-1");
}

#[tokio::test]
async fn test_create_lbs_requires_reachable_director() {
    let ports = FakePorts::aws_environment(aws_state());
    ports.director.reachable.set(false);

    let err = create_lbs(&ports, create("cf")).await.expect_err("unreachable");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::DirectorUnreachable(_))));
    assert!(err.to_string().contains("https://52.0.0.1:25555"));
    assert!(ports.calls().is_empty());
}

#[tokio::test]
async fn test_create_lbs_without_infrastructure_is_rejected() {
    let mut state = gcp_state();
    state.tf_state.clear();
    let ports = FakePorts::with_state(state);

    let err = create_lbs(&ports, create("cf")).await.expect_err("no infrastructure");

    assert!(err.to_string().contains("run bbl up first"));
}

#[tokio::test]
async fn test_create_lbs_retry_deletes_certificate_of_failed_attempt() {
    let ports = FakePorts::aws_environment(aws_state());
    ports.stacks.apply_failures.set(1);

    create_lbs(&ports, create("cf")).await.expect_err("stack apply fails");

    let stored = ports.stored();
    assert_eq!(stored.stack.certificate_name, "bbl-cert-1");
    assert!(stored.stack.lb_type.is_empty());

    create_lbs(&ports, create("cf")).await.expect("retry");

    assert_eq!(
        ports.calls(),
        vec![
            "upload-certificate bbl-cert-1".to_string(),
            "upload-certificate bbl-cert-2".to_string(),
            format!("deploy-stack stack-{ENV_ID}"),
            "delete-certificate bbl-cert-1".to_string(),
            "update-cloud-config".to_string(),
        ]
    );
    let stored = ports.stored();
    assert_eq!(stored.stack.certificate_name, "bbl-cert-2");
    assert!(stored.stack.retired_certificate_names.is_empty());
    let remaining: Vec<String> = ports.stacks.certificates.borrow().keys().cloned().collect();
    assert_eq!(remaining, vec!["bbl-cert-2"]);
}

// ── update-lbs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_update_lbs_with_identical_certificate_is_a_no_op() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());
    let opts = UpdateLbsOptions {
        material: certificate("OLD CERT\n", "OLD KEY\n"),
        skip_if_missing: false,
    };

    update_lbs(&ports, opts).await.expect("update-lbs");

    assert_eq!(ports.steps(), vec!["no updates are to be performed"]);
    assert!(ports.calls().is_empty());
    assert!(ports.infrastructure.applied.borrow().is_empty());
    assert_eq!(ports.store.writes.get(), 0);
}

#[tokio::test]
async fn test_update_lbs_rotates_the_certificate() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());
    let opts = UpdateLbsOptions {
        material: certificate("NEW CERT", "NEW KEY"),
        skip_if_missing: false,
    };

    update_lbs(&ports, opts).await.expect("update-lbs");

    assert_eq!(
        ports.calls(),
        vec![
            "upload-certificate bbl-cert-1".to_string(),
            format!("deploy-stack stack-{ENV_ID}"),
            "delete-certificate bbl-cert-old".to_string(),
        ]
    );
    let stored = ports.stored();
    assert_eq!(stored.stack.certificate_name, "bbl-cert-1");
    assert_eq!(stored.lb.cert, "NEW CERT");
    assert_eq!(stored.stack.lb_type, "cf");
}

#[tokio::test]
async fn test_failed_update_keeps_replaced_certificate_on_record() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());
    ports.stacks.apply_failures.set(1);
    let opts = UpdateLbsOptions {
        material: certificate("NEW CERT", "NEW KEY"),
        skip_if_missing: false,
    };

    update_lbs(&ports, opts.clone()).await.expect_err("stack apply fails");

    let stored = ports.stored();
    assert_eq!(stored.stack.certificate_name, "bbl-cert-1");
    assert_eq!(stored.stack.retired_certificate_names, vec!["bbl-cert-old"]);
    assert_eq!(stored.lb.cert, "OLD CERT");

    update_lbs(&ports, opts).await.expect("retry");

    assert_eq!(
        ports.calls(),
        vec![
            "upload-certificate bbl-cert-1".to_string(),
            "upload-certificate bbl-cert-2".to_string(),
            format!("deploy-stack stack-{ENV_ID}"),
            "delete-certificate bbl-cert-old".to_string(),
            "delete-certificate bbl-cert-1".to_string(),
        ]
    );
    let stored = ports.stored();
    assert_eq!(stored.stack.certificate_name, "bbl-cert-2");
    assert!(stored.stack.retired_certificate_names.is_empty());
    assert_eq!(stored.lb.cert, "NEW CERT");
    let remaining: Vec<String> = ports.stacks.certificates.borrow().keys().cloned().collect();
    assert_eq!(remaining, vec!["bbl-cert-2"]);
}

#[tokio::test]
async fn test_update_lbs_requires_certificate_and_key() {
    let mut state = gcp_state();
    state.lb = LoadBalancer {
        lb_type: "cf".to_string(),
        cert: "OLD CERT".to_string(),
        key: "OLD KEY".to_string(),
        chain: String::new(),
    };
    let ports = FakePorts::with_state(state.clone());

    let err = update_lbs(&ports, UpdateLbsOptions::default())
        .await
        .expect_err("no cert");
    assert_eq!(err.to_string(), "--cert must be provided");

    let opts = UpdateLbsOptions {
        material: certificate("NEW CERT", ""),
        skip_if_missing: false,
    };
    let err = update_lbs(&ports, opts).await.expect_err("no key");
    assert_eq!(err.to_string(), "--key must be provided");

    assert!(ports.infrastructure.applied.borrow().is_empty());
    assert_eq!(ports.store.writes.get(), 0);
    assert_eq!(ports.stored().lb, state.lb);
}

#[tokio::test]
async fn test_update_lbs_without_lb_is_not_found() {
    let ports = FakePorts::aws_environment(aws_state());

    let err = update_lbs(&ports, UpdateLbsOptions::default())
        .await
        .expect_err("no lb");

    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::LbNotFound)));
}

#[tokio::test]
async fn test_update_lbs_skip_if_missing() {
    let ports = FakePorts::aws_environment(aws_state());
    let opts = UpdateLbsOptions {
        skip_if_missing: true,
        ..UpdateLbsOptions::default()
    };

    update_lbs(&ports, opts).await.expect("skipped");

    assert_eq!(ports.steps(), vec!["no lb type exists, skipping..."]);
}

// ── delete-lbs ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_lbs_detaches_and_deletes_certificate() {
    let ports = FakePorts::aws_environment(aws_state_with_cf_lb());

    delete_lbs(&ports, false).await.expect("delete-lbs");

    assert_eq!(
        ports.calls(),
        vec![
            format!("deploy-stack stack-{ENV_ID}"),
            "update-cloud-config".to_string(),
            "delete-certificate bbl-cert-old".to_string(),
        ]
    );
    let stored = ports.stored();
    assert!(stored.stack.lb_type.is_empty());
    assert!(stored.stack.certificate_name.is_empty());
    assert_eq!(stored.lb, LoadBalancer::default());
    let template = ports.stacks.templates.borrow().last().cloned().expect("template");
    assert!(!template.contains("CFRouter"));
}

#[tokio::test]
async fn test_delete_lbs_also_deletes_retired_certificates() {
    let mut state = aws_state_with_cf_lb();
    state.stack.retired_certificate_names = vec!["bbl-cert-older".to_string()];
    let ports = FakePorts::aws_environment(state);
    ports.stacks.seed_certificate("bbl-cert-older");

    delete_lbs(&ports, false).await.expect("delete-lbs");

    assert_eq!(
        ports.calls(),
        vec![
            format!("deploy-stack stack-{ENV_ID}"),
            "update-cloud-config".to_string(),
            "delete-certificate bbl-cert-older".to_string(),
            "delete-certificate bbl-cert-old".to_string(),
        ]
    );
    let stored = ports.stored();
    assert!(stored.stack.retired_certificate_names.is_empty());
    assert!(stored.stack.certificate_name.is_empty());
    assert!(ports.stacks.certificates.borrow().is_empty());
}

#[tokio::test]
async fn test_delete_lbs_without_lb() {
    let ports = FakePorts::aws_environment(aws_state());
    let err = delete_lbs(&ports, false).await.expect_err("no lb");
    assert!(matches!(err.downcast_ref::<BblError>(), Some(BblError::LbNotFound)));

    delete_lbs(&ports, true).await.expect("skipped");
    assert_eq!(ports.steps(), vec!["no lb type exists, skipping..."]);
}

// ── lbs ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_lb_endpoints_for_gcp_cf() {
    let mut state = gcp_state();
    state.lb.lb_type = "cf".to_string();
    let ports = FakePorts::with_state(state.clone());

    let endpoints = lb_endpoints(&ports, &state).await.expect("endpoints");

    assert_eq!(
        endpoints,
        vec![
            ("CF Router LB", "35.0.0.1".to_string()),
            ("CF SSH Proxy LB", "35.0.0.2".to_string()),
            ("CF TCP Router LB", "35.0.0.3".to_string()),
            ("CF WebSocket LB", "35.0.0.4".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_lb_endpoints_for_aws_concourse() {
    let mut state = aws_state();
    state.stack.lb_type = "concourse".to_string();
    let ports = FakePorts::aws_environment(state.clone());

    let endpoints = lb_endpoints(&ports, &state).await.expect("endpoints");

    assert_eq!(
        endpoints,
        vec![("Concourse LB", "concourse.elb.amazonaws.com".to_string())]
    );
}

#[tokio::test]
async fn test_lb_endpoints_without_lb() {
    let ports = FakePorts::with_state(gcp_state());
    let err = lb_endpoints(&ports, &gcp_state()).await.expect_err("no lb");
    assert_eq!(err.to_string(), "no load balancer has been found for this bbl environment");
}
