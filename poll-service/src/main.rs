use anyhow::Result;
use clap::Parser;
use tracing::info;

use poll_service::{
    cli::{Cli, Command},
    client,
    server::{Server, ServerConfig},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let config = ServerConfig::from(&args);
            let server = Server::start(args.options, &config).await?;
            info!("poll server listening on {}", server.local_addr()?);
            info!(
                workers = config.pool_size,
                log_file = %config.log_file.display(),
                "poll ready with {} options",
                server.store().options().len()
            );
            server.run_until_signal().await?;
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
