use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vault_courier::{
    cli::{Cli, Commands},
    observability::{init_logging, init_metrics},
    shutdown::cancel_on_signal,
    startup::{run_agent, run_controller, run_service},
    APP_NAME, VERSION,
};

fn install_rustls_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        // Losing the race to another installer leaves a provider in place.
        let _ = ring::default_provider().install_default();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    install_rustls_provider();

    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    init_logging(&cli.logging());

    let role = cli.command.role();
    info!(app_name = APP_NAME, version = VERSION, role, "Starting vault-courier");

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr, role)?;
    }

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    match cli.command {
        Commands::Controller(args) => run_controller(args.into_config()?, cancel).await?,
        Commands::Agent(args) => run_agent(args.into_config()?, cancel).await?,
        Commands::Service(args) => run_service(args.into_config()?, cancel).await?,
    }

    info!(role, "Shutdown completed");
    Ok(())
}
