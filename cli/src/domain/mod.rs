//! Domain layer — pure business logic, types, and document builders.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod cloud_config;
pub mod cloudformation;
pub mod config;
pub mod director_vars;
pub mod env_id;
pub mod error;
pub mod load_balancer;
pub mod outputs;
pub mod preflight;
pub mod state;

pub use error::BblError;
pub use load_balancer::{CertificateMaterial, LbType};
pub use outputs::Outputs;
pub use state::{Iaas, STATE_VERSION, State};
