//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. The dispatcher classifies failures with
//! `anyhow::Error::downcast_ref::<BblError>()`.

use thiserror::Error;

/// Every failure the driver distinguishes by kind rather than by message.
#[derive(Debug, Error)]
pub enum BblError {
    // ── State store ───────────────────────────────────────────────────────────
    #[error(
        "bbl-state.json not found in \"{dir}\", ensure you're running this command in the proper state directory or create a new environment with bbl up"
    )]
    NotFound { dir: String },

    #[error(
        "Existing bbl environment is incompatible with bbl v3. Create a new environment before continuing."
    )]
    Incompatible,

    #[error("bbl-state.json was written by a newer version of bbl (state version {0})")]
    NewerState(u32),

    // ── Pre-flight ────────────────────────────────────────────────────────────
    #[error(
        "The iaas type cannot be changed for an existing environment. The current iaas type is {current}."
    )]
    IaasMismatch { current: String },

    #[error("The region cannot be changed for an existing environment. The current region is {current}.")]
    RegionMismatch { current: String },

    #[error(
        "The environment name cannot be changed for an existing environment. The current name is {current}."
    )]
    EnvIdMismatch { current: String },

    #[error("Invalid environment name '{0}': must match ^[a-z][a-z0-9-]{{0,39}}$")]
    InvalidEnvId(String),

    #[error("{tool} version must be at least v{minimum}")]
    VersionTooOld {
        tool: &'static str,
        minimum: &'static str,
    },

    #[error("{flag} must be provided")]
    MissingFlag { flag: &'static str },

    #[error(
        "bbl-state.json records a BOSH director but no infrastructure; refusing to continue with an inconsistent environment"
    )]
    DirectorWithoutInfrastructure,

    #[error(
        "Director already exists, you must re-create your environment to use \"--no-director\""
    )]
    DirectorExists,

    #[error("director at {0} is not reachable, run bbl up to finish creating the environment")]
    DirectorUnreachable(String),

    // ── Load balancers ────────────────────────────────────────────────────────
    #[error("\"{0}\" is not a valid lb type, valid lb types are: concourse and cf")]
    InvalidLbType(String),

    #[error(
        "bbl already has a {0} load balancer attached, please remove the previous load balancer before attaching a new one"
    )]
    LbAlreadyAttached(String),

    #[error("no load balancer has been found for this bbl environment")]
    LbNotFound,

    // ── Actuators ─────────────────────────────────────────────────────────────
    /// An actuator failed but handed back partial state, which has been persisted.
    #[error("{message}")]
    Manager { message: String },

    #[error("infrastructure output \"{0}\" is missing")]
    MissingOutput(String),

    // ── Read-only commands ────────────────────────────────────────────────────
    #[error("Could not retrieve {0}, please make sure you are targeting the proper state dir.")]
    MissingField(&'static str),

    // ── Dispatcher ────────────────────────────────────────────────────────────
    #[error("step: exiting")]
    UserAborted,

    #[error("flag provided but not defined: {0}")]
    BadFlag(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}
