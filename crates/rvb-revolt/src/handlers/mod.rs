//! Gateway event handlers.
//!
//! Every event is logged (except the chatty typing/user-update kinds), then
//! routed by kind. Messages go through the owner-only command handler.

use std::rc::Rc;

use tracing::{debug, info};

use rvb_core::events::{EventKind, GatewayEvent};

use crate::router::AppState;

mod commands;

pub use commands::handle_message;

pub async fn handle_event(state: Rc<AppState>, ev: GatewayEvent) -> anyhow::Result<()> {
    if !ev.is_noisy() {
        debug!("{}", serde_json::to_string_pretty(&ev.raw)?);
    }

    match &ev.kind {
        EventKind::Ready => info!("--- I am ready! ---"),
        EventKind::Message(msg) => handle_message(&state, msg, &ev).await?,
        _ => {}
    }
    Ok(())
}
