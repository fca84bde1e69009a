//! Infrastructure layer — concrete implementations of application port traits.
//!
//! This module contains all I/O-performing code: process execution, the state
//! file, credential generation, the `terraform`, `bosh` and `aws` actuators,
//! the director HTTP client, and embedded assets.
//!
//! Imports from `crate::domain` and `crate::application::ports` are allowed.
//! Imports from `crate::commands` or `crate::output` are forbidden.

pub mod assets;
pub mod aws;
pub mod bosh;
pub mod command_runner;
pub mod credentials;
pub mod director;
pub mod prompt;
pub mod state;
pub mod terraform;
