//! Test helpers for integration tests
//!
//! Provides a disposable hub server, token minting, and helpers that wait
//! for specific events with a deadline.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use collab_client::{ClientConfig, ClientEvent, ProposalSocket};
use collab_common::{AppConfig, JwtService, PresenceSnapshot};
use collab_hub::{create_app, create_hub_state};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Secret shared by the test server and the tokens minted for it
pub const TEST_SECRET: &str = "integration-test-secret";

/// Upper bound for any single expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw WebSocket used when a test needs to send frames the client never would
pub type RawSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test server instance that manages lifecycle
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    jwt: JwtService,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server with default settings
    pub async fn start() -> Result<Self> {
        Self::start_with(&[]).await
    }

    /// Start a test server with extra environment settings
    pub async fn start_with(overrides: &[(&str, &str)]) -> Result<Self> {
        let config = test_config(overrides)?;
        let jwt = JwtService::new(&config.jwt.secret, config.jwt.access_token_expiry);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let app = create_app(create_hub_state(config));
        let handle = tokio::spawn(async move {
            collab_hub::serve(listener, app).await.ok();
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(Self {
            addr,
            client,
            jwt,
            _handle: handle,
        })
    }

    /// Get base URL for HTTP requests
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get base URL for WebSocket connections
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Mint a valid access token
    pub fn token(&self, name: &str) -> String {
        self.jwt
            .issue(&format!("user-{}", name.to_lowercase()), name)
            .expect("token encoding")
    }

    /// Client settings for `name` on `proposal`, starting on `tab`
    pub fn client_config(&self, proposal: &str, name: &str, tab: &str) -> ClientConfig {
        ClientConfig::new(self.ws_url(), proposal, self.token(name)).with_tab(tab)
    }

    /// Connect an editor with heartbeats enabled
    pub async fn connect(&self, proposal: &str, name: &str, tab: &str) -> Result<ProposalSocket> {
        Ok(ProposalSocket::connect(self.client_config(proposal, name, tab)).await?)
    }

    /// Open a raw WebSocket with the token in the query string
    pub async fn connect_raw(&self, proposal: &str, name: &str, tab: &str) -> Result<RawSocket> {
        let url = format!(
            "{}/ws/proposals/{proposal}?token={}&tab={tab}",
            self.ws_url(),
            self.token(name)
        );
        let (socket, _) = connect_async(url.as_str()).await?;
        Ok(socket)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    /// Make a GET request with auth token
    pub async fn get_auth(&self, path: &str, token: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).bearer_auth(token).send().await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).json(body).send().await?)
    }

    /// Make a POST request with auth token
    pub async fn post_auth<T: Serialize>(&self, path: &str, token: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).bearer_auth(token).json(body).send().await?)
    }

    /// Report a mutation the way the CRUD API does
    pub async fn notify_change(
        &self,
        proposal: &str,
        table: &str,
        origin_session: Option<&str>,
    ) -> Result<Response> {
        let body = serde_json::json!({ "table": table, "origin_session": origin_session });
        self.post_auth(
            &format!("/api/proposals/{proposal}/changes"),
            &self.token("crud-api"),
            &body,
        )
        .await
    }

    /// Fetch `/health`
    pub async fn health(&self) -> Result<serde_json::Value> {
        assert_json(self.get("/health").await?, StatusCode::OK).await
    }

    /// Poll `/health` until `rooms` and `connections` match
    pub async fn wait_for_load(&self, rooms: u64, connections: u64) -> Result<()> {
        let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
        loop {
            let health = self.health().await?;
            if health["rooms"] == rooms && health["connections"] == connections {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("expected {rooms} rooms / {connections} connections, last saw {health}");
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Create a test configuration without touching the process environment
pub fn test_config(overrides: &[(&str, &str)]) -> Result<AppConfig> {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("HUB_PORT".to_string(), "0".to_string()),
        ("JWT_SECRET".to_string(), TEST_SECRET.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert((*key).to_string(), (*value).to_string());
    }

    AppConfig::from_lookup(|key| vars.get(key).cloned())
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))
}

/// Build a snapshot from (section, name) pairs
pub fn snapshot(pairs: &[(&str, &str)]) -> PresenceSnapshot {
    pairs.iter().copied().collect()
}

/// Next event, failing after `EVENT_TIMEOUT`
pub async fn next_event(socket: &mut ProposalSocket) -> Result<ClientEvent> {
    match tokio::time::timeout(EVENT_TIMEOUT, socket.next_event()).await {
        Ok(event) => Ok(event?),
        Err(_) => bail!("timed out waiting for an event"),
    }
}

/// Skip presence snapshots until one equals `expected`
pub async fn presence_until(socket: &mut ProposalSocket, expected: &PresenceSnapshot) -> Result<u64> {
    loop {
        match next_event(socket).await? {
            ClientEvent::Presence { version, presence } if &presence == expected => {
                return Ok(version);
            }
            ClientEvent::Closed { code } => bail!("closed ({code:?}) before presence {expected:?}"),
            _ => {}
        }
    }
}

/// Skip presence snapshots until the next invalidation
pub async fn next_invalidation(socket: &mut ProposalSocket) -> Result<(String, Option<&'static str>)> {
    loop {
        match next_event(socket).await? {
            ClientEvent::Invalidate { table, section } => return Ok((table, section)),
            ClientEvent::Closed { code } => bail!("closed ({code:?}) before invalidation"),
            ClientEvent::Presence { .. } => {}
        }
    }
}

/// Fail if an invalidation arrives within `window`
pub async fn expect_no_invalidation(socket: &mut ProposalSocket, window: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, socket.next_event()).await {
            Err(_) => return Ok(()),
            Ok(Ok(ClientEvent::Invalidate { table, .. })) => bail!("unexpected invalidation of {table}"),
            Ok(Ok(ClientEvent::Presence { .. })) => {}
            Ok(Ok(ClientEvent::Closed { code })) => bail!("closed ({code:?}) unexpectedly"),
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(response: Response, expected_status: StatusCode) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(response.json().await?)
}

/// Assert response status only
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(())
}
