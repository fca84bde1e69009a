//! Cloud-config generation.
//!
//! Produces the YAML document uploaded to the director describing the
//! compute, disk and network resources of the environment. Load balancer
//! `vm_extensions` are emitted only while an LB is attached.

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::domain::load_balancer::LbType;
use crate::domain::outputs::{self, Outputs};
use crate::domain::state::{Iaas, State};

const AZ: &str = "z1";

/// Instance sizes offered by every environment: name, AWS type, GCP type, GCP disk GB.
const VM_TYPES: &[(&str, &str, &str, u32)] = &[
    ("minimal", "m3.medium", "n1-standard-1", 10),
    ("small", "m3.large", "n1-standard-2", 20),
    ("small-highmem", "r3.xlarge", "n1-highmem-4", 30),
    ("default", "m3.medium", "n1-standard-1", 10),
    ("large", "m4.xlarge", "n1-standard-4", 50),
];

const DISK_SIZES_GB: &[u32] = &[1, 5, 10, 50, 100, 500, 1000];

/// Build the cloud-config YAML for `state` given its infrastructure outputs.
///
/// # Errors
///
/// Returns an error if the IaaS is unset, a required output is missing, or
/// the persisted LB type is invalid.
pub fn generate(state: &State, outputs: &Outputs) -> Result<String> {
    let iaas = state.iaas.context("cloud config requires an iaas")?;
    let lb = state.lb_type()?;

    let (az, network_properties) = match iaas {
        Iaas::Aws => (
            json!({ "availability_zone": outputs.get(outputs::AVAILABILITY_ZONE)? }),
            json!({
                "subnet": outputs.get(outputs::SUBNET_ID)?,
                "security_groups": [outputs.get(outputs::INTERNAL_SECURITY_GROUP)?],
            }),
        ),
        Iaas::Gcp => (
            json!({ "zone": state.gcp.zone }),
            json!({
                "ephemeral_external_ip": true,
                "network_name": outputs.get(outputs::NETWORK_NAME)?,
                "subnetwork_name": outputs.get(outputs::SUBNETWORK_NAME)?,
                "tags": [outputs.get(outputs::INTERNAL_TAG_NAME)?],
            }),
        ),
    };

    let subnet = json!({
        "range": outputs::INTERNAL_CIDR,
        "gateway": outputs::INTERNAL_GW,
        "az": AZ,
        "reserved": ["10.0.0.2-10.0.0.10"],
        "static": ["10.0.0.190-10.0.0.254"],
        "cloud_properties": network_properties,
    });

    let mut vm_extensions = vec![
        json!({ "name": "5GB_ephemeral_disk", "cloud_properties": ephemeral_disk(iaas, 5) }),
        json!({ "name": "10GB_ephemeral_disk", "cloud_properties": ephemeral_disk(iaas, 10) }),
        json!({ "name": "50GB_ephemeral_disk", "cloud_properties": ephemeral_disk(iaas, 50) }),
    ];
    if let Some(lb) = lb {
        vm_extensions.extend(lb_extensions(iaas, lb, outputs)?);
    }

    let document = json!({
        "azs": [{ "name": AZ, "cloud_properties": az }],
        "compilation": {
            "workers": 5,
            "network": "private",
            "az": AZ,
            "reuse_compilation_vms": true,
            "vm_type": "default",
        },
        "disk_types": DISK_SIZES_GB
            .iter()
            .map(|gb| disk_type(iaas, *gb))
            .collect::<Vec<_>>(),
        "networks": [
            { "name": "private", "type": "manual", "subnets": [subnet.clone()] },
            { "name": "default", "type": "manual", "subnets": [subnet] },
        ],
        "vm_types": VM_TYPES
            .iter()
            .map(|(name, aws, gcp, disk)| vm_type(iaas, name, aws, gcp, *disk))
            .collect::<Vec<_>>(),
        "vm_extensions": vm_extensions,
    });

    serde_yaml::to_string(&document).context("serializing cloud config")
}

fn vm_type(iaas: Iaas, name: &str, aws: &str, gcp: &str, disk_gb: u32) -> Value {
    let cloud_properties = match iaas {
        Iaas::Aws => json!({
            "instance_type": aws,
            "ephemeral_disk": { "size": disk_gb * 1024, "type": "gp2" },
        }),
        Iaas::Gcp => json!({
            "machine_type": gcp,
            "root_disk_size_gb": disk_gb,
            "root_disk_type": "pd-ssd",
        }),
    };
    json!({ "name": name, "cloud_properties": cloud_properties })
}

fn disk_type(iaas: Iaas, gb: u32) -> Value {
    let cloud_properties = match iaas {
        Iaas::Aws => json!({ "type": "gp2" }),
        Iaas::Gcp => json!({ "type": "pd-ssd" }),
    };
    json!({ "name": format!("{gb}GB"), "disk_size": gb * 1024, "cloud_properties": cloud_properties })
}

fn ephemeral_disk(iaas: Iaas, gb: u32) -> Value {
    match iaas {
        Iaas::Aws => json!({ "ephemeral_disk": { "size": gb * 1024, "type": "gp2" } }),
        Iaas::Gcp => json!({ "root_disk_size_gb": gb, "root_disk_type": "pd-ssd" }),
    }
}

fn lb_extensions(iaas: Iaas, lb: LbType, outputs: &Outputs) -> Result<Vec<Value>> {
    let extensions = match (iaas, lb) {
        (Iaas::Aws, LbType::Cf) => vec![
            aws_elb(
                "router-lb",
                outputs.get(outputs::CF_ROUTER_LB)?,
                outputs.get(outputs::CF_ROUTER_INTERNAL_SECURITY_GROUP)?,
                outputs,
            )?,
            aws_elb(
                "ssh-proxy-lb",
                outputs.get(outputs::CF_SSH_PROXY_LB)?,
                outputs.get(outputs::CF_SSH_PROXY_INTERNAL_SECURITY_GROUP)?,
                outputs,
            )?,
        ],
        (Iaas::Aws, LbType::Concourse) => vec![aws_elb(
            "lb",
            outputs.get(outputs::CONCOURSE_LB)?,
            outputs.get(outputs::CONCOURSE_INTERNAL_SECURITY_GROUP)?,
            outputs,
        )?],
        (Iaas::Gcp, LbType::Cf) => vec![
            json!({
                "name": "router-lb",
                "cloud_properties": {
                    "backend_service": outputs.get(outputs::ROUTER_BACKEND_SERVICE)?,
                    "tags": [outputs.get(outputs::ROUTER_BACKEND_SERVICE)?],
                },
            }),
            gcp_target_pool("ssh-proxy-lb", outputs.get(outputs::SSH_PROXY_TARGET_POOL)?),
            gcp_target_pool("tcp-router-lb", outputs.get(outputs::TCP_ROUTER_TARGET_POOL)?),
            gcp_target_pool("ws-lb", outputs.get(outputs::WS_TARGET_POOL)?),
        ],
        (Iaas::Gcp, LbType::Concourse) => vec![gcp_target_pool(
            "lb",
            outputs.get(outputs::CONCOURSE_TARGET_POOL)?,
        )],
    };
    Ok(extensions)
}

fn aws_elb(name: &str, elb: &str, lb_group: &str, outputs: &Outputs) -> Result<Value> {
    Ok(json!({
        "name": name,
        "cloud_properties": {
            "elbs": [elb],
            "security_groups": [outputs.get(outputs::INTERNAL_SECURITY_GROUP)?, lb_group],
        },
    }))
}

fn gcp_target_pool(name: &str, pool: &str) -> Value {
    json!({
        "name": name,
        "cloud_properties": { "target_pool": pool, "tags": [pool] },
    })
}
