mod logging;

use std::net::SocketAddr;

use anyhow::Result;
use clap::{ArgAction, Parser};
use shellgate_common::ShellgateConfig;
use shellgate_core::Services;
use shellgate_web_ssh::WebSshServer;
use tracing::*;

#[derive(Parser)]
#[clap(author, version)]
pub struct Cli {
    /// Enable verbose logging, repeat for more verbosity
    #[clap(long, short = 'd', action = ArgAction::Count)]
    debug: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli)?;

    let version = env!("CARGO_PKG_VERSION");
    info!(%version, "Shellgate");

    let config = ShellgateConfig::from_env()?;
    let services = Services::new(config)?;

    {
        let config = &services.config;
        info!(
            port = config.port,
            auth_enforced = config.enforce_auth,
            host_allow_list = !config.allowed_ssh_hosts.is_empty(),
            data_dir = %config.data_dir.display(),
            "Configuration loaded"
        );
    }

    let address = SocketAddr::from(([0, 0, 0, 0], services.config.port));
    WebSshServer::new(&services).run(address).await?;
    info!("Exiting");
    Ok(())
}
