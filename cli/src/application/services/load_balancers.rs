//! Application services — `create-lbs`, `update-lbs`, `delete-lbs` and `lbs`.

use anyhow::{Context, Result};

use crate::application::ports::{
    DirectorClient, DirectorTarget, Ports, ProgressReporter, StateStore,
};
use crate::application::services::steps::{self, InfrastructurePath, LbChange, Run, Step};
use crate::domain::outputs;
use crate::domain::state::{Iaas, State};
use crate::domain::{BblError, CertificateMaterial, LbType};

#[derive(Debug, Clone, Default)]
pub struct CreateLbsOptions {
    pub lb_type: String,
    pub material: CertificateMaterial,
    pub skip_if_exists: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLbsOptions {
    pub material: CertificateMaterial,
    pub skip_if_missing: bool,
}

/// Attach a load balancer of the requested type.
///
/// # Errors
///
/// Returns an error if the type is invalid, an LB is already attached,
/// certificate material is missing, the director is unreachable, or a
/// step fails.
pub async fn create_lbs(ports: &impl Ports, opts: CreateLbsOptions) -> Result<()> {
    let state = load(ports).await?;
    let lb_type: LbType = opts.lb_type.parse()?;
    let iaas = state.iaas.context("bbl-state.json does not record an iaas")?;

    if let Some(current) = state.lb_type()? {
        if opts.skip_if_exists {
            ports
                .reporter()
                .step(&format!("lb type \"{current}\" exists, skipping..."));
            return Ok(());
        }
        return Err(BblError::LbAlreadyAttached(current.to_string()).into());
    }

    require_certificate(lb_type, iaas, &opts.material)?;
    if !state.has_infrastructure() {
        anyhow::bail!("no infrastructure has been created for this environment, run bbl up first");
    }
    ensure_director_reachable(ports, &state).await?;

    let director = has_reachable_director(&state);
    let path = InfrastructurePath::select(&state, false);
    let mut run = Run::new(ports, state, path).with_lb(LbChange::Attach {
        lb_type,
        material: opts.material,
    });
    run.execute(&[
        Step::UploadCertificate,
        Step::ApplyInfrastructure,
        Step::DeleteRetiredCertificate,
    ])
    .await?;
    if director {
        run.execute(&[Step::UploadCloudConfig]).await?;
    }
    Ok(())
}

/// Replace the certificate of the attached load balancer.
///
/// A certificate and key identical to the ones already applied is a no-op.
///
/// # Errors
///
/// Returns `LbNotFound` when no LB is attached (unless skipping),
/// `MissingFlag` when the LB needs a certificate and none was given, or the
/// error of a failing step.
pub async fn update_lbs(ports: &impl Ports, opts: UpdateLbsOptions) -> Result<()> {
    let state = load(ports).await?;
    let Some(lb_type) = state.lb_type()? else {
        if opts.skip_if_missing {
            ports.reporter().step("no lb type exists, skipping...");
            return Ok(());
        }
        return Err(BblError::LbNotFound.into());
    };
    let iaas = state.iaas.context("bbl-state.json does not record an iaas")?;
    require_certificate(lb_type, iaas, &opts.material)?;

    if opts.material.matches(&state.lb) {
        ports.reporter().step("no updates are to be performed");
        return Ok(());
    }
    ensure_director_reachable(ports, &state).await?;

    let path = InfrastructurePath::select(&state, false);
    let mut run = Run::new(ports, state, path).with_lb(LbChange::Attach {
        lb_type,
        material: opts.material,
    });
    run.execute(&[
        Step::UploadCertificate,
        Step::ApplyInfrastructure,
        Step::DeleteRetiredCertificate,
    ])
    .await
}

/// Detach the load balancer and delete its certificate.
///
/// # Errors
///
/// Returns `LbNotFound` when no LB is attached (unless skipping), or the
/// error of a failing step.
pub async fn delete_lbs(ports: &impl Ports, skip_if_missing: bool) -> Result<()> {
    let state = load(ports).await?;
    if state.lb_type()?.is_none() {
        if skip_if_missing {
            ports.reporter().step("no lb type exists, skipping...");
            return Ok(());
        }
        return Err(BblError::LbNotFound.into());
    }
    ensure_director_reachable(ports, &state).await?;

    let director = has_reachable_director(&state);
    let path = InfrastructurePath::select(&state, false);
    let mut run = Run::new(ports, state, path).with_lb(LbChange::Detach);
    run.execute(&[Step::ApplyInfrastructure]).await?;
    if director {
        run.execute(&[Step::UploadCloudConfig]).await?;
    }
    run.execute(&[Step::DeleteCertificate]).await
}

/// Labelled endpoints of the attached load balancer.
///
/// # Errors
///
/// Returns `LbNotFound` when no LB is attached, or an error if the
/// infrastructure outputs cannot be read.
pub async fn lb_endpoints(ports: &impl Ports, state: &State) -> Result<Vec<(&'static str, String)>> {
    let lb_type = state.lb_type()?.ok_or(BblError::LbNotFound)?;
    let iaas = state.iaas.context("bbl-state.json does not record an iaas")?;
    let path = InfrastructurePath::select(state, false);
    let outputs = steps::current_outputs(ports, state, path).await?;

    let keys: &[(&'static str, &str)] = match (iaas, lb_type) {
        (Iaas::Gcp, LbType::Cf) => &[
            ("CF Router LB", outputs::ROUTER_LB_IP),
            ("CF SSH Proxy LB", outputs::SSH_PROXY_LB_IP),
            ("CF TCP Router LB", outputs::TCP_ROUTER_LB_IP),
            ("CF WebSocket LB", outputs::WS_LB_IP),
        ],
        (Iaas::Gcp, LbType::Concourse) => &[("Concourse LB", outputs::CONCOURSE_LB_IP)],
        (Iaas::Aws, LbType::Cf) => &[
            ("CF Router LB", outputs::CF_ROUTER_LB_URL),
            ("CF SSH Proxy LB", outputs::CF_SSH_PROXY_LB_URL),
        ],
        (Iaas::Aws, LbType::Concourse) => &[("Concourse LB", outputs::CONCOURSE_LB_URL)],
    };
    keys.iter()
        .map(|(label, key)| Ok((*label, outputs.get(key)?.to_string())))
        .collect()
}

fn require_certificate(lb_type: LbType, iaas: Iaas, material: &CertificateMaterial) -> Result<()> {
    if !lb_type.requires_certificate(iaas) {
        return Ok(());
    }
    if material.cert.is_empty() {
        return Err(BblError::MissingFlag { flag: "--cert" }.into());
    }
    if material.key.is_empty() {
        return Err(BblError::MissingFlag { flag: "--key" }.into());
    }
    Ok(())
}

async fn load(ports: &impl Ports) -> Result<State> {
    let state = ports.store().read().await?;
    state.validate()?;
    Ok(state)
}

fn has_reachable_director(state: &State) -> bool {
    state.has_director() && !state.no_director && !state.bosh.director_address.is_empty()
}

async fn ensure_director_reachable(ports: &impl Ports, state: &State) -> Result<()> {
    if !has_reachable_director(state) {
        return Ok(());
    }
    let target = DirectorTarget::from_bosh(&state.bosh);
    ports.director().info(&target).await.map_err(|e| {
        tracing::debug!(error = %format!("{e:#}"), "director info failed");
        BblError::DirectorUnreachable(state.bosh.director_address.clone())
    })?;
    Ok(())
}
