//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod ports;
pub mod services;

pub use ports::{
    Actuated, ActuatorFailure, CommandRunner, CredentialGenerator, DirectorClient,
    DirectorDeployer, InfrastructureActuator, Ports, ProgressReporter, Prompter, StackManager,
    StateStore,
};
