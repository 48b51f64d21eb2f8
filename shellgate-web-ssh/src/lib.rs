mod api;
mod relay;
mod wire;

use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use poem::listener::TcpListener;
use poem::middleware::Cors;
use poem::{get, EndpointExt, Route, Server};
pub use relay::SessionRelay;
use shellgate_core::Services;
use tracing::*;
pub use wire::*;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct WebSshServer {
    services: Services,
}

impl WebSshServer {
    pub fn new(services: &Services) -> Self {
        WebSshServer {
            services: services.clone(),
        }
    }

    /// Serves the session endpoint until shutdown is requested, then
    /// closes the listener, signals live relays to close and drains them
    /// for a bounded grace period.
    pub async fn run(self, address: SocketAddr) -> Result<()> {
        let mut cors = Cors::new();
        for origin in &self.services.config.cors_origins {
            cors = cors.allow_origin(origin.as_str());
        }

        let app = Route::new()
            .at("/ws/ssh", get(api::api_ssh_session))
            .at("/api/servers", get(api::api_targets_list))
            .with(cors)
            .data(self.services.clone());

        let state = self.services.state.clone();

        info!(?address, "Listening");
        Server::new(TcpListener::bind(address))
            .run_with_graceful_shutdown(
                app,
                async move {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutdown requested");
                    state.lock().await.begin_shutdown();
                },
                Some(SHUTDOWN_GRACE),
            )
            .await?;
        Ok(())
    }
}

impl Debug for WebSshServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebSshServer")
    }
}
