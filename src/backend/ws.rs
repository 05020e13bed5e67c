use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite;

use super::socketio::{
    connect_frame, event_frame, EnginePacket, Handshake, SocketIoEndpoint, SocketPacket,
};
use super::types::HistoryCandle;
use crate::config::{Config, StreamConfig};
use crate::error::AppError;
use crate::event::{AppEvent, HistorySource, WsConnectionStatus};
use crate::model::tick::{Tick, TickDefaults};

/// Exponential backoff for reconnection.
struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    fn new(initial: Duration, max: Duration, factor: f64) -> Self {
        Self {
            current: initial,
            initial,
            max,
            factor,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.factor).min(self.max.as_secs_f64()),
        );
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Per-connection protocol state.
#[derive(Debug, Default)]
pub struct Session {
    pub handshake: Option<Handshake>,
    pub joined: bool,
}

impl Session {
    /// How long the server may stay silent before the link counts as dead.
    fn liveness_window(&self, connect_timeout: Duration) -> Duration {
        match &self.handshake {
            Some(h) => Duration::from_millis(h.ping_interval + h.ping_timeout),
            None => connect_timeout,
        }
    }
}

/// What the read loop should do after one text frame.
#[derive(Debug, Default, PartialEq)]
pub struct FrameOutcome {
    pub replies: Vec<String>,
    pub live_data: bool,
}

pub struct StreamClient {
    endpoint: SocketIoEndpoint,
    stream: StreamConfig,
    defaults: TickDefaults,
    connect_timeout: Duration,
}

impl StreamClient {
    pub fn new(config: &Config) -> Result<Self> {
        let endpoint = SocketIoEndpoint::from_stream_url(&config.backend.stream_url)?;
        Ok(Self {
            endpoint,
            stream: config.stream.clone(),
            defaults: config.chart.tick_defaults(),
            connect_timeout: Duration::from_millis(config.backend.connect_timeout_ms),
        })
    }

    pub fn endpoint(&self) -> &SocketIoEndpoint {
        &self.endpoint
    }

    /// Connect and run the Socket.IO loop with automatic reconnection.
    /// Everything (status, ticks, history) goes out through `app_tx`; the
    /// loop ends on `shutdown` or once the receiver is dropped.
    pub async fn connect_and_run(
        &self,
        app_tx: mpsc::Sender<AppEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            2.0,
        );
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let _ = app_tx
                .send(AppEvent::WsStatus(WsConnectionStatus::Connecting))
                .await;
            let mut session = Session::default();
            match self
                .connect_once(&mut session, &app_tx, &mut shutdown)
                .await
            {
                Ok(()) => {
                    // Clean shutdown requested
                    let _ = app_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Disconnected))
                        .await;
                    break;
                }
                Err(e) => {
                    if app_tx.is_closed() {
                        tracing::info!("Event receiver gone, stream task exiting");
                        break;
                    }
                    if session.joined {
                        backoff.reset();
                        attempt = 1;
                    }
                    tracing::warn!(error = %e, attempt, "Stream connection failed");
                    let _ = app_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Failed(format!(
                            "{:#}",
                            e
                        ))))
                        .await;

                    let delay = backoff.next_delay();
                    let _ = app_tx
                        .send(AppEvent::WsStatus(WsConnectionStatus::Reconnecting {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        }))
                        .await;

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = shutdown.changed() => {
                            let _ = app_tx
                                .send(AppEvent::LogMessage("Shutdown during reconnect".to_string()))
                                .await;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn connect_once(
        &self,
        session: &mut Session,
        app_tx: &mpsc::Sender<AppEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        tracing::info!(url = %self.endpoint.ws_url, namespace = %self.endpoint.namespace, "Connecting");
        let _ = app_tx
            .send(AppEvent::LogMessage(format!(
                "Connecting to {}",
                self.endpoint.ws_url
            )))
            .await;

        let (ws_stream, _resp) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.endpoint.ws_url.as_str()),
        )
        .await
        .context("WebSocket connect timed out")?
        .context("WebSocket connect failed")?;

        let (mut write, mut read) = ws_stream.split();

        let liveness = tokio::time::sleep(session.liveness_window(self.connect_timeout));
        tokio::pin!(liveness);

        let data_timeout = Duration::from_millis(self.stream.data_timeout_ms);
        let watchdog_enabled = !data_timeout.is_zero();
        let watchdog = tokio::time::sleep(data_timeout);
        tokio::pin!(watchdog);
        let mut last_data = Instant::now();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            let was_joined = session.joined;
                            let outcome = self.handle_frame(&text, session, app_tx).await?;
                            liveness
                                .as_mut()
                                .reset(Instant::now() + session.liveness_window(self.connect_timeout));
                            // the data window starts at the namespace join
                            if outcome.live_data || (session.joined && !was_joined) {
                                last_data = Instant::now();
                                watchdog.as_mut().reset(last_data + data_timeout);
                            }
                            for reply in outcome.replies {
                                write
                                    .send(tungstenite::Message::Text(reply))
                                    .await
                                    .context("WebSocket write failed")?;
                            }
                        }
                        Some(Ok(tungstenite::Message::Close(frame))) => {
                            return Err(AppError::WebSocket(format!("closed by server: {:?}", frame)).into());
                        }
                        Some(Ok(_)) => {
                            // tokio-tungstenite answers transport pings itself
                        }
                        Some(Err(e)) => {
                            return Err(anyhow::anyhow!("WebSocket read error: {}", e));
                        }
                        None => {
                            return Err(anyhow::anyhow!("WebSocket stream ended"));
                        }
                    }
                }
                _ = &mut liveness => {
                    return Err(anyhow::anyhow!(
                        "no frame from server within {:?}",
                        session.liveness_window(self.connect_timeout)
                    ));
                }
                _ = &mut watchdog, if watchdog_enabled && session.joined => {
                    let idle_ms = last_data.elapsed().as_millis() as u64;
                    tracing::warn!(idle_ms, "No live data within watchdog window");
                    let _ = app_tx.send(AppEvent::StreamStalled { idle_ms }).await;
                    watchdog.as_mut().reset(Instant::now() + data_timeout);
                }
                _ = shutdown.changed() => {
                    let bye = SocketPacket::Disconnect {
                        namespace: self.endpoint.namespace.clone(),
                    }
                    .to_frame();
                    let _ = write.send(tungstenite::Message::Text(bye)).await;
                    let _ = write.close().await;
                    return Ok(());
                }
            }
        }
    }

    /// Handle one Engine.IO text frame. Malformed frames are logged and
    /// skipped; only protocol-level rejections end the connection.
    pub async fn handle_frame(
        &self,
        text: &str,
        session: &mut Session,
        app_tx: &mpsc::Sender<AppEvent>,
    ) -> Result<FrameOutcome> {
        let mut outcome = FrameOutcome::default();
        let packet = match EnginePacket::decode(text) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse engine.io frame");
                return Ok(outcome);
            }
        };

        match packet {
            EnginePacket::Open(handshake) => {
                tracing::info!(
                    sid = %handshake.sid,
                    ping_interval = handshake.ping_interval,
                    ping_timeout = handshake.ping_timeout,
                    "engine.io session open"
                );
                session.handshake = Some(handshake);
                outcome.replies.push(connect_frame(&self.endpoint.namespace));
            }
            EnginePacket::Ping(body) => {
                outcome.replies.push(EnginePacket::Pong(body).encode());
            }
            EnginePacket::Close => {
                return Err(AppError::WebSocket("server closed engine.io session".to_string()).into());
            }
            EnginePacket::Message(body) => {
                let packet = match SocketPacket::decode(&body) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to parse socket.io packet");
                        return Ok(outcome);
                    }
                };
                if packet.namespace() != self.endpoint.namespace {
                    tracing::debug!(namespace = packet.namespace(), "Packet for another namespace");
                    return Ok(outcome);
                }
                self.handle_packet(packet, session, app_tx, &mut outcome)
                    .await?;
            }
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
        Ok(outcome)
    }

    async fn handle_packet(
        &self,
        packet: SocketPacket,
        session: &mut Session,
        app_tx: &mpsc::Sender<AppEvent>,
        outcome: &mut FrameOutcome,
    ) -> Result<()> {
        match packet {
            SocketPacket::Connect { .. } => {
                session.joined = true;
                tracing::info!(namespace = %self.endpoint.namespace, "Joined namespace, subscribing");
                send(app_tx, AppEvent::WsStatus(WsConnectionStatus::Connected)).await?;
                send(
                    app_tx,
                    AppEvent::LogMessage(format!(
                        "Subscribed {} {}",
                        self.defaults.symbol, self.defaults.interval
                    )),
                )
                .await?;
                outcome.replies.extend(self.subscription_frames());
            }
            SocketPacket::ConnectError { message, .. } => {
                return Err(AppError::WebSocket(message).into());
            }
            SocketPacket::Disconnect { .. } => {
                return Err(AppError::WebSocket("server disconnected namespace".to_string()).into());
            }
            SocketPacket::Event {
                namespace,
                id,
                name,
                args,
            } => {
                if self.stream.live_events.iter().any(|e| e == &name) {
                    let payload = args.first().unwrap_or(&Value::Null);
                    if let Some(tick) = self.normalize_live(payload) {
                        send(app_tx, AppEvent::MarketTick(tick)).await?;
                        outcome.live_data = true;
                    }
                } else if self.stream.history_events.iter().any(|e| e == &name) {
                    let payload = args.into_iter().next().unwrap_or(Value::Null);
                    match serde_json::from_value::<Vec<HistoryCandle>>(payload) {
                        Ok(rows) => {
                            let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
                            let candles = rows.into_iter().map(|r| r.into_candle(now_ms)).collect();
                            send(
                                app_tx,
                                AppEvent::HistoricalCandles {
                                    candles,
                                    source: HistorySource::Socket { event: name },
                                },
                            )
                            .await?;
                        }
                        Err(e) => {
                            tracing::warn!(event = %name, error = %e, "Ignoring malformed history event");
                        }
                    }
                } else {
                    tracing::debug!(event = %name, "Other event received");
                }

                if let Some(id) = id {
                    outcome.replies.push(
                        SocketPacket::Ack {
                            namespace,
                            id,
                            args: Vec::new(),
                        }
                        .to_frame(),
                    );
                }
            }
            SocketPacket::Ack { .. } | SocketPacket::Binary { .. } => {}
        }
        Ok(())
    }

    /// Normalize a live payload; `None` for another symbol's updates.
    fn normalize_live(&self, payload: &Value) -> Option<Tick> {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let tick = Tick::normalize(payload, &self.defaults, now_ms);
        if !tick.symbol.eq_ignore_ascii_case(&self.defaults.symbol) {
            tracing::debug!(symbol = %tick.symbol, "Dropping update for other symbol");
            return None;
        }
        tracing::trace!(timestamp = tick.timestamp, close = tick.close, "live tick");
        Some(tick)
    }

    /// Frames sent once the namespace is joined: subscription intents under
    /// every configured alias, the room join, and initial-data requests.
    pub fn subscription_frames(&self) -> Vec<String> {
        let ns = &self.endpoint.namespace;
        let symbol = &self.defaults.symbol;
        let interval = &self.defaults.interval;
        let intent = json!({ "symbol": symbol, "interval": interval });

        let mut frames: Vec<String> = self
            .stream
            .subscribe_events
            .iter()
            .map(|name| event_frame(ns, name, intent.clone()))
            .collect();
        if let Some(room_event) = &self.stream.join_room_event {
            frames.push(event_frame(
                ns,
                room_event,
                Value::String(format!("{}-{}", symbol, interval)),
            ));
        }
        let request = json!({
            "symbol": symbol,
            "interval": interval,
            "limit": self.stream.initial_data_limit,
        });
        frames.extend(
            self.stream
                .initial_data_events
                .iter()
                .map(|name| event_frame(ns, name, request.clone())),
        );
        frames
    }
}

async fn send(app_tx: &mpsc::Sender<AppEvent>, event: AppEvent) -> Result<()> {
    app_tx
        .send(event)
        .await
        .map_err(|_| anyhow::anyhow!("event channel closed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let mut b = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(4), 2.0);
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn liveness_window_follows_handshake() {
        let mut s = Session::default();
        assert_eq!(s.liveness_window(Duration::from_secs(20)), Duration::from_secs(20));
        s.handshake = Some(Handshake {
            sid: "x".to_string(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: None,
        });
        assert_eq!(s.liveness_window(Duration::from_secs(20)), Duration::from_secs(45));
    }
}
