use clap::Parser;
use tracing_subscriber::EnvFilter;

use scara_runtime::cli::Cli;

fn main() {
    // Setup logging (set RUST_LOG=debug for per-stage output)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(e) = scara_runtime::runtime::run(cli) {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
