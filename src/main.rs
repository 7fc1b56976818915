use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vit_cifar::cli::Cli;

/// RUST_LOG wins when set; otherwise our own crate logs at INFO.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("vit_cifar=info"))
}

fn main() -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let cli = Cli::parse();
    cli.run()
}
