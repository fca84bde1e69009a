//! Load balancer types and certificate comparison.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::BblError;
use crate::domain::state::{Iaas, LoadBalancer};

/// Load balancer flavours bbl can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LbType {
    Cf,
    Concourse,
}

impl LbType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cf => "cf",
            Self::Concourse => "concourse",
        }
    }

    /// Whether attaching this LB type on `iaas` needs a certificate and key.
    #[must_use]
    pub fn requires_certificate(self, iaas: Iaas) -> bool {
        match (iaas, self) {
            (Iaas::Aws, _) | (Iaas::Gcp, Self::Cf) => true,
            (Iaas::Gcp, Self::Concourse) => false,
        }
    }
}

impl fmt::Display for LbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LbType {
    type Err = BblError;

    fn from_str(s: &str) -> Result<Self, BblError> {
        match s {
            "cf" => Ok(Self::Cf),
            "concourse" => Ok(Self::Concourse),
            other => Err(BblError::InvalidLbType(other.to_string())),
        }
    }
}

/// Certificate material supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateMaterial {
    pub cert: String,
    pub key: String,
    pub chain: String,
}

impl CertificateMaterial {
    /// True when `lb` already carries exactly this certificate and key.
    #[must_use]
    pub fn matches(&self, lb: &LoadBalancer) -> bool {
        normalize(&self.cert) == normalize(&lb.cert) && normalize(&self.key) == normalize(&lb.key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cert.is_empty() && self.key.is_empty()
    }
}

fn normalize(pem: &str) -> &str {
    pem.trim()
}
