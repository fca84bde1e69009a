//! Version command

/// Version string printed by `bbl version` and `bbl -v`.
#[must_use]
pub fn text() -> String {
    format!("bbl {}", env!("CARGO_PKG_VERSION"))
}

/// Run the version command.
pub fn run() {
    println!("{}", text());
}
