use std::{rc::Rc, sync::Arc};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use rvb_console::{ClientInfo, Console};
use rvb_core::{
    config::Config,
    domain::Session,
    formatting::DECORATION,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
};

use crate::gateway::{self, GatewayConfig};
use crate::handlers;
use crate::RevoltClient;

/// Everything a handler needs. Lives on the local task set, so it is shared
/// through `Rc`.
pub struct AppState {
    pub cfg: Arc<Config>,
    pub session: Session,
    pub messenger: Arc<dyn MessagingPort>,
    pub console: Console,
    pub shutdown: CancellationToken,
}

/// Longest text that still fits in one message once [`RevoltClient`] has
/// framed it with the decoration lines.
pub fn console_page_length(message_limit: usize) -> usize {
    let framing = 2 * DECORATION.chars().count() + 2;
    message_limit.saturating_sub(framing)
}

/// Log in, connect to the gateway and handle events until the connection
/// ends, the owner sends `shutdown`, or Ctrl+C is pressed.
///
/// Must be called from inside a `tokio::task::LocalSet`.
pub async fn run(cfg: Arc<Config>) -> anyhow::Result<()> {
    let client = RevoltClient::new(cfg.api_url.clone(), cfg.credentials.clone());
    let session = client.fetch_session(cfg.owner_override.clone()).await?;
    info!(
        "Logged in as {} (owner {}, user account: {})",
        session.user_id,
        session.owner_id,
        cfg.credentials.is_user()
    );

    // Paginated console output arrives in bursts; pace it per channel.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(client.clone());
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let console = Console::new(
        ClientInfo {
            session: session.clone(),
            api_url: client.api_url().to_string(),
            credentials: cfg.credentials.clone(),
        },
        messenger.clone(),
        Arc::new(client),
        console_page_length(cfg.message_limit),
    )?;

    let shutdown = CancellationToken::new();
    let state = Rc::new(AppState {
        cfg: cfg.clone(),
        session,
        messenger,
        console,
        shutdown: shutdown.clone(),
    });

    let ctrl_c = shutdown.clone();
    tokio::task::spawn_local(async move {
        tokio::select! {
            _ = ctrl_c.cancelled() => {}
            res = tokio::signal::ctrl_c() => {
                if res.is_ok() {
                    info!("Ctrl+C received, exiting...");
                }
                ctrl_c.cancel();
            }
        }
    });

    let gateway_cfg = GatewayConfig {
        url: cfg.ws_url.clone(),
        heartbeat_interval: cfg.heartbeat_interval,
    };
    let mut tasks: JoinSet<()> = JoinSet::new();

    let outcome = gateway::run(
        &gateway_cfg,
        cfg.credentials.secret(),
        shutdown.clone(),
        |ev| {
            while let Some(done) = tasks.try_join_next() {
                log_task_failure(done, "event handler");
            }
            let state = state.clone();
            tasks.spawn_local(async move {
                let kind = ev.type_name().to_string();
                if let Err(e) = handlers::handle_event(state, ev).await {
                    error!("handler for {kind} event failed: {e:#}");
                }
            });
        },
    )
    .await;

    shutdown.cancel();
    tasks.abort_all();
    while let Some(done) = tasks.join_next().await {
        log_task_failure(done, "unhandled exception during shutdown");
    }

    match &outcome {
        Ok(()) => info!("Revolt gateway disconnected"),
        Err(e) => error!("Revolt gateway failed: {e}"),
    }
    outcome.map_err(anyhow::Error::from)
}

fn log_task_failure(done: Result<(), tokio::task::JoinError>, context: &str) {
    match done {
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("{context}: {e}"),
        Ok(()) => {}
    }
}
