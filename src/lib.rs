//! dueld - tabletop shooting-duel server daemon
//!
//! Players connect over a WebSocket, pick a unit from the reference-data
//! catalog and are paired into two-player duels resolved with dice.

pub mod api;
pub mod catalog;
pub mod combat;
pub mod config;
pub mod duel;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use api::ConnectionManager;
use catalog::Catalog;
pub use config::Config;
use duel::{DuelContext, Matchmaker, Registry};

/// The dueld server instance
pub struct Server {
    ctx: Arc<DuelContext>,
    matchmaker: Matchmaker,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server instance; must run inside a tokio runtime
    pub fn new(config: Config) -> Result<Self> {
        let catalog = Catalog::from_config(&config)?;
        match &config.catalog_url {
            Some(url) => info!("catalog: {}", url),
            None => info!("catalog: none configured, using placeholder units"),
        }
        Ok(Self::with_catalog(config, catalog))
    }

    /// Create a server around an existing catalog
    pub fn with_catalog(config: Config, catalog: Catalog) -> Self {
        let ctx = Arc::new(DuelContext {
            config,
            catalog: Arc::new(catalog),
            registry: Arc::new(Registry::new()),
            connections: Arc::new(ConnectionManager::new()),
        });
        let matchmaker = Matchmaker::spawn(ctx.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            ctx,
            matchmaker,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Shared duel services
    pub fn context(&self) -> Arc<DuelContext> {
        self.ctx.clone()
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.ctx.clone(), self.matchmaker.clone())
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.ctx.config.bind_addr).await?)
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("dueld listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("dueld shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config.bind_addr
    }
}
