//! Inputs handed to the director deployer.
//!
//! `deployment_vars` is the non-secret half (network layout, IaaS settings,
//! CPI credentials). `variables_store` is the secret half: generated
//! passwords and director TLS material, merged over whatever the deployer
//! previously wrote back into `bosh.variables`.

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

use crate::domain::outputs::{self, Outputs};
use crate::domain::state::{Iaas, State};

/// Render the deployment vars YAML for `state`.
///
/// # Errors
///
/// Returns an error if the IaaS is unset or a required output is missing.
pub fn deployment_vars(state: &State, outputs: &Outputs) -> Result<String> {
    let iaas = state.iaas.context("deployment vars require an iaas")?;
    let mut vars = Mapping::new();
    put(&mut vars, "director_name", &state.bosh.director_name);
    put(&mut vars, "internal_cidr", outputs::INTERNAL_CIDR);
    put(&mut vars, "internal_gw", outputs::INTERNAL_GW);
    put(&mut vars, "internal_ip", outputs::DIRECTOR_INTERNAL_IP);
    put(&mut vars, "external_ip", outputs.get(outputs::EXTERNAL_IP)?);

    match iaas {
        Iaas::Aws => {
            put(&mut vars, "az", outputs.get(outputs::AVAILABILITY_ZONE)?);
            put(&mut vars, "subnet_id", outputs.get(outputs::SUBNET_ID)?);
            // The stack issues a dedicated IAM user for the CPI; older
            // template-driven environments reuse the operator credentials.
            put(
                &mut vars,
                "access_key_id",
                outputs
                    .find(outputs::BOSH_ACCESS_KEY_ID)
                    .unwrap_or(state.aws.access_key_id.as_str()),
            );
            put(
                &mut vars,
                "secret_access_key",
                outputs
                    .find(outputs::BOSH_SECRET_ACCESS_KEY)
                    .unwrap_or(state.aws.secret_access_key.as_str()),
            );
            put(&mut vars, "region", &state.aws.region);
            put(&mut vars, "default_key_name", &state.key_pair.name);
            vars.insert(
                "default_security_groups".into(),
                Value::Sequence(vec![outputs.get(outputs::DEFAULT_SECURITY_GROUP)?.into()]),
            );
            put(&mut vars, "private_key", &state.key_pair.private_key);
        }
        Iaas::Gcp => {
            put(&mut vars, "zone", &state.gcp.zone);
            put(&mut vars, "network", outputs.get(outputs::NETWORK_NAME)?);
            put(&mut vars, "subnetwork", outputs.get(outputs::SUBNETWORK_NAME)?);
            vars.insert(
                "tags".into(),
                Value::Sequence(vec![
                    outputs.get(outputs::BOSH_OPEN_TAG_NAME)?.into(),
                    outputs.get(outputs::INTERNAL_TAG_NAME)?.into(),
                ]),
            );
            put(&mut vars, "project_id", &state.gcp.project_id);
            put(&mut vars, "gcp_credentials_json", &state.gcp.service_account_key);
            put(&mut vars, "private_key", &state.key_pair.private_key);
        }
    }

    serde_yaml::to_string(&vars).context("serializing deployment vars")
}

/// Merge the generated credentials of `state` over its persisted variables store.
///
/// # Errors
///
/// Returns an error if `bosh.variables` is not a YAML mapping.
pub fn variables_store(state: &State) -> Result<String> {
    let mut store = parse_store(&state.bosh.variables)?;
    let bosh = &state.bosh;

    put(&mut store, "admin_password", &bosh.director_password);
    for (name, value) in &bosh.credentials {
        put(&mut store, name, value);
    }

    if !bosh.director_ssl_certificate.is_empty() {
        let mut ssl = Mapping::new();
        put(&mut ssl, "ca", &bosh.director_ssl_ca);
        put(&mut ssl, "certificate", &bosh.director_ssl_certificate);
        put(&mut ssl, "private_key", &bosh.director_ssl_private_key);
        store.insert("director_ssl".into(), Value::Mapping(ssl));
    }

    if store.is_empty() {
        return Ok(String::new());
    }
    serde_yaml::to_string(&store).context("serializing variables store")
}

fn parse_store(raw: &str) -> Result<Mapping> {
    if raw.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(raw).context("parsing bosh variables store")? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => anyhow::bail!("bosh variables store is not a YAML mapping"),
    }
}

fn put(map: &mut Mapping, key: &str, value: &str) {
    map.insert(key.into(), value.into());
}
