use axum::Router;

use crate::app::Result;
use crate::envconfig::{Host, DEFAULT_HOST, DEFAULT_PORT};

pub struct Server {
    host: String,
    port: u16,
    router: Router,
}

impl Server {
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            router: Router::new(),
        }
    }

    pub fn bind(self, host: &Host) -> Self {
        self.host(host.host.clone()).port(host.port)
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn routes(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Serves until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind() {
        let server = Server::new().bind(&Host::parse("127.0.0.1:9000"));
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 9000);

        let server = Server::default();
        assert_eq!((server.host.as_str(), server.port), (DEFAULT_HOST, DEFAULT_PORT));
    }
}
