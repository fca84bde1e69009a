//! The bbl state document persisted to `<state-dir>/bbl-state.json`.
//!
//! Field names match the JSON written by every bbl v3 release. Fields this
//! version does not know about are kept in flattened maps so that a
//! read/modify/write cycle never drops data written by a newer actuator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::BblError;
use crate::domain::load_balancer::LbType;

/// Schema version written by this release.
pub const STATE_VERSION: u32 = 3;

/// Supported cloud providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Iaas {
    Aws,
    Gcp,
}

impl fmt::Display for Iaas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Aws => "aws",
            Self::Gcp => "gcp",
        })
    }
}

impl FromStr for Iaas {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aws" => Ok(Self::Aws),
            "gcp" => Ok(Self::Gcp),
            other => anyhow::bail!("{other:?} is not a valid iaas type, valid types are: aws and gcp"),
        }
    }
}

/// Full bbl environment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct State {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iaas: Option<Iaas>,
    #[serde(rename = "envID")]
    pub env_id: String,
    pub no_director: bool,
    pub key_pair: KeyPair,
    pub aws: AwsConfig,
    pub gcp: GcpConfig,
    pub stack: Stack,
    pub lb: LoadBalancer,
    #[serde(rename = "tfState")]
    pub tf_state: String,
    pub bosh: Bosh,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            iaas: None,
            env_id: String::new(),
            no_director: false,
            key_pair: KeyPair::default(),
            aws: AwsConfig::default(),
            gcp: GcpConfig::default(),
            stack: Stack::default(),
            lb: LoadBalancer::default(),
            tf_state: String::new(),
            bosh: Bosh::default(),
            extra: Map::new(),
        }
    }
}

/// SSH keypair used to reach the director host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyPair {
    pub name: String,
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.private_key.is_empty() && self.public_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GcpConfig {
    #[serde(rename = "projectID")]
    pub project_id: String,
    pub service_account_key: String,
    pub region: String,
    pub zone: String,
}

/// Legacy CloudFormation stack bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Stack {
    pub name: String,
    pub lb_type: String,
    pub certificate_name: String,
    /// Certificates replaced by a newer upload that the stack may still reference.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retired_certificate_names: Vec<String>,
}

/// Attached load balancer and the certificate material last applied to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancer {
    #[serde(rename = "type")]
    pub lb_type: String,
    pub cert: String,
    pub key: String,
    pub chain: String,
}

/// Director credentials, manifest, and the deployer's opaque state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bosh {
    pub director_name: String,
    pub director_username: String,
    pub director_password: String,
    pub director_address: String,
    #[serde(rename = "directorSSLCA")]
    pub director_ssl_ca: String,
    #[serde(rename = "directorSSLCertificate")]
    pub director_ssl_certificate: String,
    #[serde(rename = "directorSSLPrivateKey")]
    pub director_ssl_private_key: String,
    pub credentials: BTreeMap<String, String>,
    pub manifest: String,
    /// Opaque `create-env` state document.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub state: Value,
    /// Variables store (YAML) shared with the deployer.
    pub variables: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_ops_files: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bosh {
    /// True when `bosh.state` carries a non-empty deployer document.
    #[must_use]
    pub fn has_state(&self) -> bool {
        match &self.state {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

impl State {
    /// True when the director has been (at least partially) created.
    #[must_use]
    pub fn has_director(&self) -> bool {
        self.bosh.has_state()
    }

    /// True when any infrastructure has been recorded, legacy or template-driven.
    #[must_use]
    pub fn has_infrastructure(&self) -> bool {
        !self.stack.name.is_empty() || !self.tf_state.is_empty()
    }

    /// The attached load balancer type, from whichever bookkeeping carries it.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted type is not a known LB type.
    pub fn lb_type(&self) -> Result<Option<LbType>> {
        let raw = if self.lb.lb_type.is_empty() {
            &self.stack.lb_type
        } else {
            &self.lb.lb_type
        };
        if raw.is_empty() || raw == "none" {
            return Ok(None);
        }
        Ok(Some(raw.parse()?))
    }

    /// The region of whichever provider this environment runs on.
    #[must_use]
    pub fn region(&self) -> &str {
        match self.iaas {
            Some(Iaas::Aws) => &self.aws.region,
            Some(Iaas::Gcp) => &self.gcp.region,
            None => "",
        }
    }

    /// True once every external resource tracked by the document is released.
    #[must_use]
    pub fn resources_released(&self) -> bool {
        !self.has_director()
            && !self.has_infrastructure()
            && self.stack.certificate_name.is_empty()
            && self.stack.retired_certificate_names.is_empty()
            && self.key_pair.is_empty()
    }

    /// Check the document invariants that must hold after every command.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.version < STATE_VERSION {
            return Err(BblError::Incompatible.into());
        }
        if self.version > STATE_VERSION {
            return Err(BblError::NewerState(self.version).into());
        }
        if self.has_director() && self.key_pair.private_key.is_empty() {
            anyhow::bail!("bbl-state.json records a BOSH director but no SSH private key");
        }
        if self.iaas == Some(Iaas::Gcp) && !self.stack.name.is_empty() {
            anyhow::bail!("bbl-state.json records a CloudFormation stack for a gcp environment");
        }
        Ok(())
    }
}
