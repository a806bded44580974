//! Websocket gateway client.
//!
//! Protocol:
//! 1. Connect to the gateway URL (`?version=1&format=json`).
//! 2. Send `Authenticate` with the bot or session token.
//! 3. Ping every heartbeat interval; the server answers with `Pong`.
//! 4. Hand every decoded event to the caller until the socket closes, an
//!    `Error` frame arrives, or shutdown is requested.
//!
//! There is no reconnect: a closed socket ends the run.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rvb_core::{
    errors::Error,
    events::{EventKind, GatewayEvent},
    Result,
};

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub heartbeat_interval: Duration,
}

fn authenticate_frame(token: &str) -> String {
    json!({ "type": "Authenticate", "token": token }).to_string()
}

fn ping_frame(n: u64) -> String {
    json!({ "type": "Ping", "data": n }).to_string()
}

/// How one decoded frame affects the connection.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Fatal(String),
}

fn dispatch(text: &str, on_event: &mut impl FnMut(GatewayEvent)) -> Flow {
    let events = match GatewayEvent::parse(text) {
        Ok(events) => events,
        Err(e) => {
            warn!("Revolt: ignoring undecodable frame: {e}");
            return Flow::Continue;
        }
    };
    for ev in events {
        match &ev.kind {
            EventKind::Error(reason) => return Flow::Fatal(reason.clone()),
            EventKind::Authenticated => info!("Revolt gateway authenticated"),
            EventKind::Pong => {
                debug!("Revolt gateway pong");
                continue;
            }
            _ => {}
        }
        on_event(ev);
    }
    Flow::Continue
}

/// Connect, authenticate and pump events into `on_event` until the
/// connection ends. Returns `Ok` on a clean close or when `cancel` fires.
pub async fn run(
    cfg: &GatewayConfig,
    token: &str,
    cancel: CancellationToken,
    mut on_event: impl FnMut(GatewayEvent),
) -> Result<()> {
    let (ws_stream, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        res = connect_async(cfg.url.as_str()) => {
            res.map_err(|e| Error::Gateway(format!("connect failed: {e}")))?
        }
    };
    info!("Revolt gateway connected");
    let (mut ws_writer, mut ws_reader) = ws_stream.split();

    ws_writer
        .send(WsMessage::Text(authenticate_frame(token).into()))
        .await
        .map_err(|e| Error::Gateway(format!("authenticate failed: {e}")))?;

    let mut heartbeat = interval_at(
        Instant::now() + cfg.heartbeat_interval,
        cfg.heartbeat_interval,
    );
    let mut pings: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Revolt gateway shutdown requested");
                let _ = ws_writer.send(WsMessage::Close(None)).await;
                return Ok(());
            }

            _ = heartbeat.tick() => {
                pings += 1;
                if let Err(e) = ws_writer.send(WsMessage::Text(ping_frame(pings).into())).await {
                    return Err(Error::Gateway(format!("heartbeat failed: {e}")));
                }
            }

            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(raw))) => {
                        if let Flow::Fatal(reason) = dispatch(raw.as_str(), &mut on_event) {
                            return Err(Error::Gateway(format!("server error: {reason}")));
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!("Revolt gateway closed: {frame:?}");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Error::Gateway(format!("read failed: {e}"))),
                    None => {
                        info!("Revolt gateway stream ended");
                        return Ok(());
                    }
                }
            }
        }
    }
}
