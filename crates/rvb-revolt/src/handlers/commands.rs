use tracing::info;

use rvb_core::{
    commands::{parse_command, Command},
    events::{GatewayEvent, IncomingMessage},
    security::is_owner,
};

use crate::router::AppState;

/// Owner-only prefix commands. Everything else is dropped without a reply.
pub async fn handle_message(
    state: &AppState,
    msg: &IncomingMessage,
    ev: &GatewayEvent,
) -> anyhow::Result<()> {
    if !is_owner(&msg.author, &state.session) {
        return Ok(());
    }
    let Some(content) = msg.content.as_deref() else {
        return Ok(());
    };
    let Some((command, body)) = parse_command(&state.cfg.prefix, content) else {
        return Ok(());
    };
    if command.needs_body() && body.is_empty() {
        return Ok(());
    }

    let channel = &msg.channel;
    match command {
        Command::Ping => {
            state.messenger.send(channel, "Pong!").await?;
        }
        Command::Shutdown => {
            state.messenger.send(channel, "Shutting down...").await?;
            info!(channel = %channel, "shutdown requested by owner");
            state.shutdown.cancel();
        }
        Command::Eval => state.console.eval(channel, body, ev).await?,
        Command::Debug => state.console.debug(channel, body, ev).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;

    use rvb_console::{ClientInfo, Console};
    use rvb_core::{
        config::Config,
        domain::{ChannelId, MessageId, MessageRef, Session, UserId},
        events::EventKind,
        messaging::port::{ApiPort, MessagingPort},
    };

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MessagingPort for Recorder {
        async fn send(
            &self,
            channel_id: &ChannelId,
            content: &str,
        ) -> rvb_core::Result<MessageRef> {
            self.sent.lock().unwrap().push(content.to_string());
            Ok(MessageRef {
                channel_id: channel_id.clone(),
                message_id: MessageId("M".to_string()),
            })
        }
    }

    struct NoApi;

    #[async_trait]
    impl ApiPort for NoApi {
        async fn request(&self, _: &str, _: &str, _: Option<Value>) -> rvb_core::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn state() -> (AppState, Arc<Recorder>) {
        let cfg = Config::from_lookup(|k| match k {
            "REVOLTBOT_PREFIX" => Some("!".to_string()),
            "REVOLTBOT_TOKEN" => Some("tok".to_string()),
            _ => None,
        })
        .unwrap();
        let session = Session {
            user_id: UserId("BOT".to_string()),
            owner_id: UserId("OWNER".to_string()),
        };
        let rec = Arc::new(Recorder::default());
        let console = Console::new(
            ClientInfo {
                session: session.clone(),
                api_url: cfg.api_url.clone(),
                credentials: cfg.credentials.clone(),
            },
            rec.clone(),
            Arc::new(NoApi),
            2000,
        )
        .unwrap();

        let state = AppState {
            cfg: Arc::new(cfg),
            session,
            messenger: rec.clone(),
            console,
            shutdown: CancellationToken::new(),
        };
        (state, rec)
    }

    fn message(author: &str, content: &str) -> (IncomingMessage, GatewayEvent) {
        let ev = GatewayEvent::from_value(json!({
            "type": "Message", "_id": "M1", "channel": "C", "author": author, "content": content
        }));
        let EventKind::Message(msg) = ev.kind.clone() else {
            panic!("not a message event");
        };
        (msg, ev)
    }

    async fn run(state: &AppState, author: &str, content: &str) {
        let (msg, ev) = message(author, content);
        handle_message(state, &msg, &ev).await.unwrap();
    }

    #[tokio::test]
    async fn owner_ping_gets_one_pong() {
        let (state, rec) = state();
        run(&state, "OWNER", "!ping").await;
        assert_eq!(*rec.sent.lock().unwrap(), vec!["Pong!"]);
    }

    #[tokio::test]
    async fn non_owner_cannot_shut_down() {
        let (state, rec) = state();
        run(&state, "STRANGER", "!shutdown").await;
        assert!(rec.sent.lock().unwrap().is_empty());
        assert!(!state.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn owner_shutdown_replies_then_cancels() {
        let (state, rec) = state();
        run(&state, "OWNER", "!shutdown").await;
        assert_eq!(*rec.sent.lock().unwrap(), vec!["Shutting down..."]);
        assert!(state.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn ignores_unknown_and_empty_commands() {
        let (state, rec) = state();
        run(&state, "OWNER", "!nope").await;
        run(&state, "OWNER", "ping").await;
        run(&state, "OWNER", "!eval   ").await;
        run(&state, "OWNER", "!debug").await;
        run(&state, "OWNER", "").await;
        assert!(rec.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn eval_and_debug_reach_the_console() {
        let (state, rec) = state();
        run(&state, "OWNER", "!eval return 6 * 7").await;
        run(&state, "OWNER", "!debug _ + 1").await;
        assert_eq!(
            *rec.sent.lock().unwrap(),
            vec!["```lua\n42\n```", "```lua\n43\n```"]
        );
    }
}
