//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing the step
//! library with port trait calls. Services import only from `crate::domain`
//! and `crate::application::ports` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

pub mod destroy;
pub mod load_balancers;
pub mod queries;
pub mod rotate;
pub mod steps;
pub mod up;
