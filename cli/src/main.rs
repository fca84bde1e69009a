//! bbl - bootstraps and lifecycle-manages a BOSH director on AWS or GCP

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    bbl::cli::main_with_args(std::env::args_os()).await
}
