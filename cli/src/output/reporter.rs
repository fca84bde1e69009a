//! `TerminalReporter` — Presentation-layer implementation of `ProgressReporter`.
//!
//! Wraps an `OutputContext` and implements the `application::ports::ProgressReporter`
//! trait so application services can emit progress events without depending on
//! any presentation type directly.

use crate::application::ports::ProgressReporter;
use crate::output::OutputContext;

/// Terminal progress reporter.
///
/// - `step()` prints `"step: {message}"` to stdout
/// - `warn()` prints `"{message}"` to stderr
#[derive(Debug, Clone, Copy)]
pub struct TerminalReporter {
    ctx: OutputContext,
}

impl TerminalReporter {
    #[must_use]
    pub fn new(ctx: OutputContext) -> Self {
        Self { ctx }
    }
}

impl ProgressReporter for TerminalReporter {
    fn step(&self, message: &str) {
        self.ctx.step(message);
    }

    fn warn(&self, message: &str) {
        self.ctx.warn(message);
    }
}
