//! Output formatting module
//!
//! Progress goes to stdout as `step: <message>` lines; warnings and errors
//! go to stderr. Colors apply only when the target stream is a terminal.

pub mod reporter;
pub mod styles;

use console::Term;
use owo_colors::OwoColorize as _;
pub use reporter::TerminalReporter;
pub use styles::Styles;

/// Output context carrying styling and terminal state.
#[derive(Debug, Clone, Copy)]
pub struct OutputContext {
    /// Stylesheet for stdout.
    pub styles: Styles,
    /// Stylesheet for stderr.
    pub err_styles: Styles,
}

impl OutputContext {
    /// Create output context based on the terminal and `NO_COLOR`.
    #[must_use]
    pub fn new() -> Self {
        let colors_allowed = std::env::var_os("NO_COLOR").is_none();
        Self {
            styles: styles_for(colors_allowed && Term::stdout().is_term()),
            err_styles: styles_for(colors_allowed && Term::stderr().is_term()),
        }
    }

    /// Context that never emits escape codes.
    #[must_use]
    pub fn plain() -> Self {
        Self {
            styles: Styles::default(),
            err_styles: Styles::default(),
        }
    }

    /// Print a `step: ` progress line.
    pub fn step(&self, msg: &str) {
        println!("{}", step_line(&self.styles, msg));
    }

    /// Print a warning to stderr.
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.style(self.err_styles.warning));
    }

    /// Print an error to stderr. Never suppressed.
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.style(self.err_styles.error));
    }

    /// Print a value line to stdout, unstyled so it can be piped.
    pub fn value(&self, text: &str) {
        println!("{text}");
    }

    /// Print a `Label: value` line.
    pub fn kv(&self, key: &str, value: &str) {
        println!("{}: {value}", key.style(self.styles.bold));
    }
}

impl Default for OutputContext {
    fn default() -> Self {
        Self::new()
    }
}

fn styles_for(colorize: bool) -> Styles {
    let mut styles = Styles::default();
    if colorize {
        styles.colorize();
    }
    styles
}

/// Format a progress line.
#[must_use]
pub fn step_line(styles: &Styles, msg: &str) -> String {
    format!("{} {msg}", "step:".style(styles.dim))
}
