use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tessera=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = tessera_cli::Cli::parse();
    tracing::debug!(
        manifest = %cli.manifest.display(),
        "Starting {} v{}",
        tessera_cli::crate_name(),
        env!("CARGO_PKG_VERSION")
    );

    let output = tessera_cli::run(cli)?;
    println!("{output}");
    Ok(())
}
