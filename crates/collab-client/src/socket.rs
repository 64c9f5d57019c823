//! Proposal socket
//!
//! One WebSocket session against one proposal. A writer task owns the sink
//! and a heartbeat task feeds it keepalives at the interval the hub
//! announced; the read half stays with the socket and is drained through
//! `next_event`.

use crate::error::{ClientError, ClientResult};
use crate::sections::section_for_table;
use collab_common::{ClientMessage, PresenceSnapshot, ServerMessage};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the queue feeding the writer task
const OUTGOING_BUFFER: usize = 32;

/// Time allowed for the writer to flush a close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` origin of the hub
    pub base_url: String,
    pub proposal_id: String,
    /// Access token, sent as a bearer header
    pub token: String,
    /// Section reported at connect time
    pub tab: String,
    /// Limit for the upgrade and for the `hello` frame each
    pub handshake_timeout: Duration,
    /// Send heartbeats at the interval the hub announces
    pub heartbeat: bool,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        proposal_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            proposal_id: proposal_id.into(),
            token: token.into(),
            tab: "wbs".to_string(),
            handshake_timeout: Duration::from_secs(10),
            heartbeat: true,
        }
    }

    #[must_use]
    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = tab.into();
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Never send heartbeats; the hub will close the session once idle
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = false;
        self
    }

    /// URL of the connect endpoint for this proposal and tab
    pub fn connect_url(&self) -> ClientResult<String> {
        let base = self.base_url.trim_end_matches('/');
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(ClientError::InvalidUrl(format!(
                "expected ws:// or wss:// base, got {base:?}"
            )));
        }
        if !is_valid_label(&self.proposal_id) {
            return Err(ClientError::InvalidUrl(format!(
                "bad proposal id {:?}",
                self.proposal_id
            )));
        }
        if !is_valid_label(&self.tab) {
            return Err(ClientError::InvalidTab(self.tab.clone()));
        }

        Ok(format!("{base}/ws/proposals/{}?tab={}", self.proposal_id, self.tab))
    }
}

/// Ids and tabs travel unescaped in the URL
fn is_valid_label(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// What the editor has to react to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Replace the displayed presence with this snapshot
    Presence {
        version: u64,
        presence: PresenceSnapshot,
    },
    /// Refetch `table`; `section` is the tab showing it, if any
    Invalidate {
        table: String,
        section: Option<&'static str>,
    },
    /// The hub ended the session
    Closed { code: Option<u16> },
}

/// A live session against one proposal
pub struct ProposalSocket {
    session_id: String,
    heartbeat_interval: Duration,
    outgoing: mpsc::Sender<Message>,
    incoming: SplitStream<WsStream>,
    current_tab: String,
    presence_version: u64,
    presence: PresenceSnapshot,
    closed: bool,
    writer: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
}

impl ProposalSocket {
    /// Connect and wait for the hub's `hello`
    ///
    /// # Errors
    /// `Rejected` when the hub refuses the token, `Timeout` when the hub
    /// does not answer within the handshake timeout.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let url = config.connect_url()?;
        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| ClientError::Protocol("token is not a valid header value".to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = tokio::time::timeout(config.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| ClientError::Timeout("upgrade"))??;
        let (mut sink, mut incoming) = stream.split();

        let (session_id, heartbeat_ms) =
            tokio::time::timeout(config.handshake_timeout, read_hello(&mut incoming))
                .await
                .map_err(|_| ClientError::Timeout("hello"))??;
        let heartbeat_interval = Duration::from_millis(heartbeat_ms);

        tracing::debug!(
            session_id = %session_id,
            proposal_id = %config.proposal_id,
            heartbeat_ms,
            "Connected to hub"
        );

        let (outgoing, mut rx) = mpsc::channel::<Message>(OUTGOING_BUFFER);
        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let heartbeat = (config.heartbeat && heartbeat_ms > 0)
            .then(|| tokio::spawn(heartbeat_loop(outgoing.clone(), heartbeat_interval)));

        Ok(Self {
            session_id,
            heartbeat_interval,
            outgoing,
            incoming,
            current_tab: config.tab,
            presence_version: 0,
            presence: PresenceSnapshot::new(),
            closed: false,
            writer: Some(writer),
            heartbeat,
        })
    }

    /// Session id the hub assigned
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Tab last reported to the hub
    pub fn current_tab(&self) -> &str {
        &self.current_tab
    }

    /// Latest presence snapshot applied
    pub fn presence(&self) -> &PresenceSnapshot {
        &self.presence
    }

    pub fn presence_version(&self) -> u64 {
        self.presence_version
    }

    /// Report a tab switch
    ///
    /// Returns false without sending anything when `tab` is already the
    /// current tab.
    pub async fn change_tab(&mut self, tab: &str) -> ClientResult<bool> {
        if !is_valid_label(tab) {
            return Err(ClientError::InvalidTab(tab.to_string()));
        }
        if tab == self.current_tab {
            return Ok(false);
        }

        self.send(&ClientMessage::tab_change(tab)).await?;
        self.current_tab = tab.to_string();
        Ok(true)
    }

    /// Send a heartbeat now, outside the regular schedule
    pub async fn send_heartbeat(&self) -> ClientResult<()> {
        self.send(&ClientMessage::Heartbeat).await
    }

    async fn send(&self, message: &ClientMessage) -> ClientResult<()> {
        let json = message.to_json()?;
        self.outgoing
            .send(Message::Text(json))
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Wait for the next presence change or invalidation
    ///
    /// Stale presence snapshots and frames that do not parse are skipped.
    /// After `ClientEvent::Closed` every further call returns
    /// `ClientError::Closed`.
    pub async fn next_event(&mut self) -> ClientResult<ClientEvent> {
        if self.closed {
            return Err(ClientError::Closed);
        }

        while let Some(frame) = self.incoming.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(frame)) => {
                    self.closed = true;
                    return Ok(ClientEvent::Closed {
                        code: frame.map(|f| u16::from(f.code)),
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            };

            match ServerMessage::from_json(&text) {
                Ok(message) => {
                    if let Some(event) = self.apply(message) {
                        return Ok(event);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable frame");
                }
            }
        }

        self.closed = true;
        Ok(ClientEvent::Closed { code: None })
    }

    /// Fold a hub frame into local state
    fn apply(&mut self, message: ServerMessage) -> Option<ClientEvent> {
        match message {
            ServerMessage::Presence { version, presence } => {
                if version <= self.presence_version {
                    tracing::trace!(
                        version,
                        current = self.presence_version,
                        "Discarding stale presence"
                    );
                    return None;
                }
                self.presence_version = version;
                self.presence = presence.clone();
                Some(ClientEvent::Presence { version, presence })
            }
            ServerMessage::Change { table } => Some(ClientEvent::Invalidate {
                section: section_for_table(&table),
                table,
            }),
            ServerMessage::Hello { .. } | ServerMessage::HeartbeatAck => None,
        }
    }

    /// Close the session
    pub async fn close(mut self) -> ClientResult<()> {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.closed = true;
        let _ = self.outgoing.send(Message::Close(None)).await;

        if let Some(writer) = self.writer.take() {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer).await;
        }
        Ok(())
    }
}

impl Drop for ProposalSocket {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
    }
}

impl std::fmt::Debug for ProposalSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalSocket")
            .field("session_id", &self.session_id)
            .field("current_tab", &self.current_tab)
            .field("presence_version", &self.presence_version)
            .field("closed", &self.closed)
            .finish()
    }
}

async fn read_hello(incoming: &mut SplitStream<WsStream>) -> ClientResult<(String, u64)> {
    while let Some(frame) = incoming.next().await {
        match frame? {
            Message::Text(text) => {
                return match ServerMessage::from_json(&text)? {
                    ServerMessage::Hello {
                        session_id,
                        heartbeat_interval,
                    } => Ok((session_id, heartbeat_interval)),
                    other => Err(ClientError::Protocol(format!(
                        "expected hello, got {}",
                        other.kind()
                    ))),
                };
            }
            Message::Close(_) => return Err(ClientError::Closed),
            _ => {}
        }
    }
    Err(ClientError::Closed)
}

async fn heartbeat_loop(outgoing: mpsc::Sender<Message>, period: Duration) {
    let Ok(frame) = ClientMessage::Heartbeat.to_json() else {
        return;
    };
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        if outgoing.send(Message::Text(frame.clone())).await.is_err() {
            break;
        }
    }
}
