//! Canonical infrastructure outputs.
//!
//! Both infrastructure paths (CloudFormation stack outputs and template
//! outputs) are normalised into this flat map before anything downstream
//! reads them.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::domain::error::BblError;

pub const EXTERNAL_IP: &str = "external_ip";
pub const DIRECTOR_ADDRESS: &str = "director_address";
pub const NETWORK_NAME: &str = "network_name";
pub const SUBNETWORK_NAME: &str = "subnetwork_name";
pub const BOSH_OPEN_TAG_NAME: &str = "bosh_open_tag_name";
pub const INTERNAL_TAG_NAME: &str = "internal_tag_name";
pub const VPC_ID: &str = "vpc_id";
pub const SUBNET_ID: &str = "subnet_id";
pub const AVAILABILITY_ZONE: &str = "az";
pub const DEFAULT_SECURITY_GROUP: &str = "default_security_group";
pub const INTERNAL_SECURITY_GROUP: &str = "internal_security_group";
pub const BOSH_ACCESS_KEY_ID: &str = "bosh_iam_access_key_id";
pub const BOSH_SECRET_ACCESS_KEY: &str = "bosh_iam_secret_access_key";

pub const ROUTER_LB_IP: &str = "router_lb_ip";
pub const SSH_PROXY_LB_IP: &str = "ssh_proxy_lb_ip";
pub const TCP_ROUTER_LB_IP: &str = "tcp_router_lb_ip";
pub const WS_LB_IP: &str = "ws_lb_ip";
pub const CONCOURSE_LB_IP: &str = "concourse_lb_ip";
pub const ROUTER_BACKEND_SERVICE: &str = "router_backend_service";
pub const SSH_PROXY_TARGET_POOL: &str = "ssh_proxy_target_pool";
pub const TCP_ROUTER_TARGET_POOL: &str = "tcp_router_target_pool";
pub const WS_TARGET_POOL: &str = "ws_target_pool";
pub const CONCOURSE_TARGET_POOL: &str = "concourse_target_pool";

pub const CF_ROUTER_LB: &str = "cf_router_lb";
pub const CF_ROUTER_LB_URL: &str = "cf_router_lb_url";
pub const CF_SSH_PROXY_LB: &str = "cf_ssh_proxy_lb";
pub const CF_SSH_PROXY_LB_URL: &str = "cf_ssh_proxy_lb_url";
pub const CF_ROUTER_INTERNAL_SECURITY_GROUP: &str = "cf_router_internal_security_group";
pub const CF_SSH_PROXY_INTERNAL_SECURITY_GROUP: &str = "cf_ssh_proxy_internal_security_group";
pub const CONCOURSE_LB: &str = "concourse_lb";
pub const CONCOURSE_LB_URL: &str = "concourse_lb_url";
pub const CONCOURSE_INTERNAL_SECURITY_GROUP: &str = "concourse_internal_security_group";

/// Fixed internal network shared by every environment.
pub const INTERNAL_CIDR: &str = "10.0.0.0/24";
pub const INTERNAL_GW: &str = "10.0.0.1";
pub const DIRECTOR_INTERNAL_IP: &str = "10.0.0.6";

/// Flat string map of infrastructure outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs(BTreeMap<String, String>);

impl Outputs {
    #[must_use]
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    /// Fetch a required output.
    ///
    /// # Errors
    ///
    /// Returns `BblError::MissingOutput` when the key is absent or empty.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BblError::MissingOutput(key.to_string()).into())
    }

    /// Fetch an optional output.
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Outputs {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
