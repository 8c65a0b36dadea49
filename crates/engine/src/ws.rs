//! WebSocket [`Transport`]: connect, hello, wait for the server's answer,
//! then run writer, reader and heartbeat tasks for the session.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use lc_domain::config::ConnectionConfig;
use lc_protocol::WireMessage;

use crate::reconnect::ReconnectBackoff;
use crate::transport::{ConnectOutcome, Transport, TransportLink};
use crate::types::TransportError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Chat server transport over a single WebSocket per session.
#[derive(Debug, Clone)]
pub struct WsTransport {
    server_url: String,
    connect_timeout: Duration,
    heartbeat_interval: Duration,
    max_frame_bytes: usize,
    backoff: ReconnectBackoff,
}

impl WsTransport {
    pub fn from_config(cfg: &ConnectionConfig) -> Self {
        Self {
            server_url: cfg.server_url.clone(),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
            heartbeat_interval: Duration::from_secs(cfg.heartbeat_interval_secs.max(1)),
            max_frame_bytes: cfg.max_frame_bytes,
            backoff: ReconnectBackoff::from_config(&cfg.reconnect),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// One attempt: socket, hello, answer.  Bounded by `connect_timeout`.
    async fn connect_once(&self, hello: &WireMessage) -> Result<ConnectOutcome, TransportError> {
        let attempt = async {
            let (mut ws, _response) = tokio_tungstenite::connect_async(self.server_url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let json = serde_json::to_string(hello)
                .map_err(|e| TransportError::Handshake(e.to_string()))?;
            ws.send(Message::Text(json))
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            let answer = await_answer(&mut ws, self.max_frame_bytes).await?;
            Ok::<_, TransportError>((ws, answer))
        };

        let (ws, answer) = tokio::time::timeout(self.connect_timeout, attempt)
            .await
            .map_err(|_| TransportError::Timeout)??;

        match answer {
            WireMessage::SessionWelcome {
                session_token,
                resumed,
                verified,
            } => {
                tracing::info!(
                    session_token = %session_token,
                    resumed,
                    "chat server welcomed us"
                );
                let link = self.spawn_session(ws);
                Ok(ConnectOutcome::Established {
                    session_token,
                    resumed,
                    verified,
                    link,
                })
            }
            WireMessage::AgentsUnavailable { destination } => {
                let mut ws = ws;
                let _ = ws.close(None).await;
                Ok(ConnectOutcome::AgentsUnavailable { destination })
            }
            other => Err(TransportError::Handshake(format!(
                "unexpected {} before welcome",
                other.kind()
            ))),
        }
    }

    fn spawn_session(&self, ws: Socket) -> TransportLink {
        let (mut sink, mut stream) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<WireMessage>(64);
        let (inbound_tx, inbound_rx) = mpsc::channel::<WireMessage>(64);
        let close = CancellationToken::new();

        // Writer: outbound channel → socket.  Queued messages drain before a
        // close is honoured, then a close frame goes out.
        let writer_close = close.clone();
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    m = outbound_rx.recv() => m,
                    _ = writer_close.cancelled() => None,
                };
                let Some(msg) = msg else { break };
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            writer_close.cancel();
        });

        // Heartbeat.
        let ping_tx = outbound_tx.clone();
        let ping_close = close.clone();
        let ping_interval = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if ping_tx.send(WireMessage::ping_now()).await.is_err() {
                            break;
                        }
                    }
                    _ = ping_close.cancelled() => break,
                }
            }
        });

        // Reader: socket → inbound channel.  Dropping `inbound_tx` on exit is
        // what tells the session the link is gone.
        let reader_close = close.clone();
        let pong_tx = outbound_tx.clone();
        let max_frame = self.max_frame_bytes;
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    n = stream.next() => n,
                    _ = reader_close.cancelled() => break,
                };
                let msg = match next {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "chat socket error");
                        break;
                    }
                    None => break,
                };
                match msg {
                    Message::Text(text) => {
                        if text.len() > max_frame {
                            tracing::warn!(
                                bytes = text.len(),
                                max = max_frame,
                                "inbound frame exceeds max_frame_bytes, dropping"
                            );
                            continue;
                        }
                        match serde_json::from_str::<WireMessage>(&text) {
                            Ok(WireMessage::Ping { timestamp }) => {
                                let _ = pong_tx.send(WireMessage::Pong { timestamp }).await;
                            }
                            Ok(WireMessage::Pong { .. }) => {
                                tracing::trace!("received pong");
                            }
                            Ok(other) => {
                                if inbound_tx.send(other).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "failed to parse chat frame");
                            }
                        }
                    }
                    Message::Close(_) => {
                        tracing::info!("chat server closed connection");
                        break;
                    }
                    _ => {}
                }
            }
            reader_close.cancel();
        });

        TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
            close,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, hello: WireMessage) -> Result<ConnectOutcome, TransportError> {
        let backoff = match &hello {
            WireMessage::VisitorHello { visitor_id, .. } => {
                self.backoff.clone().seeded_for(visitor_id)
            }
            _ => self.backoff.clone(),
        };
        let mut failures: u32 = 0;
        loop {
            tracing::info!(url = %self.server_url, attempt = failures + 1, "connecting to chat server");

            let err = match self.connect_once(&hello).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };
            failures += 1;

            if !err.is_retryable() || backoff.should_give_up(failures) {
                tracing::warn!(attempts = failures, error = %err, "chat server unreachable");
                return Err(err);
            }

            let delay = backoff.delay_for_attempt(failures - 1);
            tracing::info!(
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "retrying chat connection"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Read frames until the server welcomes us or declines.
async fn await_answer(ws: &mut Socket, max_frame: usize) -> Result<WireMessage, TransportError> {
    while let Some(frame) = ws.next().await {
        let frame = frame.map_err(|e| TransportError::Connect(e.to_string()))?;
        match frame {
            Message::Text(text) if text.len() <= max_frame => {
                match serde_json::from_str::<WireMessage>(&text) {
                    Ok(msg @ WireMessage::SessionWelcome { .. })
                    | Ok(msg @ WireMessage::AgentsUnavailable { .. }) => return Ok(msg),
                    Ok(other) => {
                        tracing::debug!(kind = other.kind(), "ignoring frame before welcome");
                    }
                    Err(e) => return Err(TransportError::Handshake(e.to_string())),
                }
            }
            Message::Close(_) => return Err(TransportError::Closed),
            _ => {}
        }
    }
    Err(TransportError::Closed)
}
