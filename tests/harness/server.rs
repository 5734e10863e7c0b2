//! TestServer - in-process end-to-end harness
//!
//! Starts the real router and matchmaker on a random port with test timings:
//! no pacing between phases, short bot delays and a one second disconnect
//! grace period.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dueld::catalog::{Catalog, MemoryFaction};
use dueld::{Config, Server};
use reqwest::Client;

use super::client::TestClient;

/// A running server, shut down on drop
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    server: Arc<Server>,
}

impl TestServer {
    /// Start a server backed by the placeholder catalog
    pub async fn start() -> Result<Self> {
        Self::start_with(Config::for_tests(), Catalog::placeholder()).await
    }

    /// Start a server over in-memory catalog data
    pub async fn start_with_factions(factions: Vec<MemoryFaction>) -> Result<Self> {
        Self::start_with(Config::for_tests(), Catalog::in_memory(factions)).await
    }

    pub async fn start_with(config: Config, catalog: Catalog) -> Result<Self> {
        let server = Arc::new(Server::with_catalog(config, catalog));
        let listener = server.bind().await?;
        let addr = listener.local_addr()?;

        let running = server.clone();
        tokio::spawn(async move {
            if let Err(e) = running.serve(listener).await {
                eprintln!("test server stopped: {e}");
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready
        let mut ready = false;
        for _ in 0..50 {
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if !ready {
            anyhow::bail!("Server failed to start within 1 second");
        }

        Ok(Self {
            addr,
            client,
            server,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// GET and decode a JSON body
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        Ok(self.get(path).await?.json().await?)
    }

    /// Get the WebSocket URL, with an optional `?query`
    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws{}", self.addr, query)
    }

    /// Connect a client; `query` is appended to the WebSocket URL
    pub async fn connect(&self, query: &str) -> Result<TestClient> {
        TestClient::connect(&self.ws_url(query)).await
    }

    /// Connect a named client
    pub async fn connect_named(&self, name: &str) -> Result<TestClient> {
        self.connect(&format!("?name={name}")).await
    }

    /// Connect two named clients and have them matched with each other
    pub async fn pair(&self, first: &str, second: &str) -> Result<(TestClient, TestClient)> {
        let mut a = self.connect_named(first).await?;
        let mut b = self.connect_named(second).await?;
        a.queue(false).await?;
        a.expect("status").await?;
        b.queue(false).await?;
        a.expect_match().await?;
        b.expect_match().await?;
        Ok((a, b))
    }

    /// Wait until no rooms are active
    pub async fn wait_for_no_rooms(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let rooms = self.get_json("/api/rooms").await?;
            if rooms.as_array().is_some_and(|r| r.is_empty()) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!("rooms still active after {:?}", timeout)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}
