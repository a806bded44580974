//! Owner-only Lua console.
//!
//! `eval` runs a block of statements, `debug` evaluates a single expression.
//! Output is redacted, paginated and sent back to the channel as fenced
//! blocks.

pub mod awaitable;
pub mod env;
pub mod render;
pub mod syntax;

use std::{cell::RefCell, sync::Arc};

use anyhow::anyhow;
use mlua::prelude::*;

use rvb_core::{
    config::Credentials,
    domain::{ChannelId, Session},
    events::GatewayEvent,
    formatting::{code_block, pagify, strip_code_fences, PagifyOptions},
    messaging::port::{ApiPort, MessagingPort},
    security::Redactor,
};

use crate::env::Output;

/// What console code gets to know about the logged-in account.
#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub session: Session,
    pub api_url: String,
    pub credentials: Credentials,
}

pub struct Console {
    lua: Lua,
    client: LuaTable,
    messenger: Arc<dyn MessagingPort>,
    redactor: Redactor,
    page_length: usize,
    last_result: RefCell<LuaValue>,
}

impl Console {
    /// `page_length` is the largest message the messenger can deliver.
    pub fn new(
        info: ClientInfo,
        messenger: Arc<dyn MessagingPort>,
        api: Arc<dyn ApiPort>,
        page_length: usize,
    ) -> anyhow::Result<Self> {
        let redactor = Redactor::new(info.credentials.secret())?;
        let lua = Lua::new();
        env::register_globals(&lua)
            .map_err(|e| anyhow!("failed to register console globals: {e}"))?;
        let client = env::client_table(&lua, &info, messenger.clone(), api, redactor.clone())
            .map_err(|e| anyhow!("failed to create client table: {e}"))?;

        Ok(Self {
            lua,
            client,
            messenger,
            redactor,
            page_length,
            last_result: RefCell::new(LuaValue::Nil),
        })
    }

    /// Run `body` as the body of a function.
    ///
    /// `print` output is captured and sent along with the return value. A
    /// non-nil return value becomes `_` for the next invocation.
    pub async fn eval(
        &self,
        channel: &ChannelId,
        body: &str,
        event: &GatewayEvent,
    ) -> anyhow::Result<()> {
        let code = strip_code_fences(body);
        let out = Output::capturing();
        let env = self
            .environment(event, &out)
            .map_err(|e| anyhow!("failed to build eval environment: {e}"))?;

        let wrapped = format!("return function()\n{code}\nend");
        let compiled = self
            .lua
            .load(wrapped.as_str())
            .set_name("=eval")
            .set_environment(env)
            .eval::<LuaFunction>();

        let func = match compiled {
            Ok(func) => func,
            Err(LuaError::SyntaxError { message, .. }) => {
                return self
                    .send_result(channel, &syntax::describe(&message, code, 1))
                    .await;
            }
            Err(e) => return self.send_result(channel, &e.to_string()).await,
        };

        let text = match func.call_async::<LuaValue>(()).await {
            Ok(LuaValue::Nil) => out.take(),
            // Rendering can run a user `__tostring`, so it may fail too.
            Ok(value) => match render::repr(&self.lua, &value) {
                Ok(shown) => {
                    *self.last_result.borrow_mut() = value;
                    format!("{}{shown}", out.take())
                }
                Err(e) => {
                    tracing::debug!(channel = %channel, "eval result not printable: {e}");
                    format!("{}{e}", out.take())
                }
            },
            Err(e) => {
                tracing::debug!(channel = %channel, "eval failed: {e}");
                format!("{}{e}", out.take())
            }
        };

        self.send_result(channel, &text).await
    }

    /// Evaluate `body` as one expression, awaiting up to two awaitable layers.
    pub async fn debug(
        &self,
        channel: &ChannelId,
        body: &str,
        event: &GatewayEvent,
    ) -> anyhow::Result<()> {
        let code = strip_code_fences(body);
        let env = self
            .environment(event, &Output::logging())
            .map_err(|e| anyhow!("failed to build debug environment: {e}"))?;

        let compiled = self
            .lua
            .load(format!("return {code}"))
            .set_name("=debug")
            .set_environment(env)
            .into_function();

        let func = match compiled {
            Ok(func) => func,
            Err(LuaError::SyntaxError { message, .. }) => {
                return self
                    .send_result(channel, &syntax::describe(&message, code, 0))
                    .await;
            }
            Err(e) => return self.send_result(channel, &e.to_string()).await,
        };

        let result = match func.call_async::<LuaValue>(()).await {
            Ok(value) => awaitable::maybe_await(value).await,
            Err(e) => Err(e),
        };
        let rendered = result.and_then(|value| {
            let shown = render::repr(&self.lua, &value)?;
            Ok((value, shown))
        });

        match rendered {
            Ok((value, shown)) => {
                *self.last_result.borrow_mut() = value;
                self.send_result(channel, &shown).await
            }
            Err(e) => {
                tracing::debug!(channel = %channel, "debug failed: {e}");
                self.send_result(channel, &e.to_string()).await
            }
        }
    }

    fn environment(&self, event: &GatewayEvent, out: &Output) -> LuaResult<LuaTable> {
        let last = self.last_result.borrow().clone();
        env::invocation_env(&self.lua, &self.client, event, last, out)
    }

    /// Redact, paginate and send `text`, one fenced block per page.
    async fn send_result(&self, channel: &ChannelId, text: &str) -> anyhow::Result<()> {
        let clean = self.redactor.redact(text);
        for page in pagify(&clean, PagifyOptions::with_page_length(self.page_length)) {
            self.messenger.send(channel, &code_block(page)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use rvb_core::domain::{MessageId, MessageRef, UserId};

    use super::*;

    const TOKEN: &str = "Sekrit.Token-123";

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(ChannelId, String)>>,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessagingPort for Recorder {
        async fn send(
            &self,
            channel_id: &ChannelId,
            content: &str,
        ) -> rvb_core::Result<MessageRef> {
            let mut sent = self.sent.lock().unwrap();
            sent.push((channel_id.clone(), content.to_string()));
            Ok(MessageRef {
                channel_id: channel_id.clone(),
                message_id: MessageId(format!("m{}", sent.len())),
            })
        }
    }

    struct FakeApi;

    #[async_trait]
    impl ApiPort for FakeApi {
        async fn request(
            &self,
            method: &str,
            path: &str,
            body: Option<Value>,
        ) -> rvb_core::Result<Value> {
            Ok(json!({ "method": method, "path": path, "body": body }))
        }
    }

    fn console(page_length: usize) -> (Console, Arc<Recorder>) {
        let rec = Arc::new(Recorder::default());
        let info = ClientInfo {
            session: Session {
                user_id: UserId("BOT".to_string()),
                owner_id: UserId("OWNER".to_string()),
            },
            api_url: "https://api.example".to_string(),
            credentials: Credentials::Bot(TOKEN.to_string()),
        };
        let console = Console::new(info, rec.clone(), Arc::new(FakeApi), page_length).unwrap();
        (console, rec)
    }

    fn channel() -> ChannelId {
        ChannelId("C".to_string())
    }

    fn event(content: &str) -> GatewayEvent {
        GatewayEvent::from_value(json!({
            "type": "Message", "_id": "M1", "channel": "C", "author": "OWNER", "content": content
        }))
    }

    #[tokio::test]
    async fn eval_sends_output_and_value() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "print('hi')\nreturn 1 + 1", &event("")).await.unwrap();
        assert_eq!(rec.texts(), vec!["```lua\nhi\n2\n```"]);
    }

    #[tokio::test]
    async fn eval_strips_fences_and_sees_message() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "```lua\nreturn message.content\n```", &event("ping me"))
            .await
            .unwrap();
        assert_eq!(rec.texts(), vec!["```lua\nping me\n```"]);
    }

    #[tokio::test]
    async fn eval_with_nothing_to_show_sends_nothing() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "local x = 1", &event("")).await.unwrap();
        assert!(rec.texts().is_empty());
    }

    #[tokio::test]
    async fn last_result_survives_failures() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "return 21", &event("")).await.unwrap();

        c.eval(&channel(), "x = = 1", &event("")).await.unwrap();
        let texts = rec.texts();
        assert!(texts[1].contains("x = = 1\n    ^\nSyntaxError:"), "{}", texts[1]);

        c.eval(&channel(), "error('boom')", &event("")).await.unwrap();
        assert!(rec.texts()[2].contains("boom"));

        c.eval(&channel(), "return _ * 2", &event("")).await.unwrap();
        assert_eq!(rec.texts()[3], "```lua\n42\n```");
    }

    #[tokio::test]
    async fn eval_reports_failing_tostring_and_keeps_last_result() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "return 21", &event("")).await.unwrap();
        c.eval(
            &channel(),
            "print('shown')\n\
             return setmetatable({}, { __tostring = function() error('bad tostring') end })",
            &event(""),
        )
        .await
        .unwrap();
        c.debug(&channel(), "_", &event("")).await.unwrap();

        let texts = rec.texts();
        assert_eq!(texts.len(), 3);
        assert!(texts[1].starts_with("```lua\nshown\n"), "{}", texts[1]);
        assert!(texts[1].contains("bad tostring"), "{}", texts[1]);
        assert_eq!(texts[2], "```lua\n21\n```");
    }

    #[tokio::test]
    async fn debug_reports_failing_tostring_and_keeps_last_result() {
        let (c, rec) = console(2000);
        c.debug(&channel(), "'keep'", &event("")).await.unwrap();
        c.debug(
            &channel(),
            "setmetatable({}, { __tostring = function() error('bad tostring') end })",
            &event(""),
        )
        .await
        .unwrap();
        c.debug(&channel(), "_", &event("")).await.unwrap();

        let texts = rec.texts();
        assert_eq!(texts.len(), 3);
        assert!(texts[1].contains("bad tostring"), "{}", texts[1]);
        assert_eq!(texts[2], "```lua\nkeep\n```");
    }

    #[tokio::test]
    async fn protected_metatable_result_is_shown() {
        let (c, rec) = console(2000);
        c.debug(
            &channel(),
            "setmetatable({ a = 1 }, { __metatable = 'locked' })",
            &event(""),
        )
        .await
        .unwrap();
        assert_eq!(rec.texts(), vec!["```lua\n{\n  a = 1,\n}\n```"]);
    }

    #[tokio::test]
    async fn runtime_error_keeps_printed_output() {
        let (c, rec) = console(2000);
        c.eval(&channel(), "print('before')\nerror('bad thing')", &event(""))
            .await
            .unwrap();
        let text = &rec.texts()[0];
        assert!(text.starts_with("```lua\nbefore\n"), "{text}");
        assert!(text.contains("bad thing"));
    }

    #[tokio::test]
    async fn redacts_token_in_any_case() {
        let (c, rec) = console(2000);
        c.eval(
            &channel(),
            "print(client.headers['x-bot-token'])\n\
             return string.upper(client.headers['x-bot-token'])",
            &event(""),
        )
        .await
        .unwrap();
        let text = &rec.texts()[0];
        assert!(!text.to_lowercase().contains(&TOKEN.to_lowercase()));
        assert_eq!(text.matches("[EXPUNGED]").count(), 2);
    }

    #[tokio::test]
    async fn long_output_is_split_into_pages() {
        let (c, rec) = console(200);
        c.eval(&channel(), "for i = 1, 100 do print('line ' .. i) end", &event(""))
            .await
            .unwrap();
        let texts = rec.texts();
        assert!(texts.len() > 1);
        for t in &texts {
            assert!(t.starts_with("```lua\n") && t.ends_with("\n```"));
            assert!(t.chars().count() <= 200);
        }
        assert!(texts.last().unwrap().contains("line 100"));
    }

    #[tokio::test]
    async fn client_send_and_request_go_through_ports() {
        let (c, rec) = console(2000);
        c.eval(
            &channel(),
            "local id = client:send('D', 'token ' .. client.headers['x-bot-token'])\n\
             local r = client:request('get', '/users/@me')\n\
             return id .. ' ' .. r.method .. ' ' .. r.path",
            &event(""),
        )
        .await
        .unwrap();

        let sent = rec.sent.lock().unwrap().clone();
        assert_eq!(sent[0], (ChannelId("D".to_string()), "token [EXPUNGED]".to_string()));
        assert_eq!(sent[1].1, "```lua\nm1 GET /users/@me\n```");
    }

    #[tokio::test]
    async fn debug_evaluates_expressions() {
        let (c, rec) = console(2000);
        c.debug(&channel(), "`1 + 2`", &event("")).await.unwrap();
        c.debug(&channel(), "nil", &event("")).await.unwrap();
        assert_eq!(rec.texts(), vec!["```lua\n3\n```", "```lua\nnil\n```"]);
    }

    #[tokio::test]
    async fn debug_awaits_two_layers_only() {
        let (c, rec) = console(2000);
        c.debug(
            &channel(),
            "async(function() return async(function(x) return x * 2 end, 4) end)",
            &event(""),
        )
        .await
        .unwrap();
        c.debug(
            &channel(),
            "async(function() return async(function() \
             return async(function() return 1 end) end) end)",
            &event(""),
        )
        .await
        .unwrap();
        assert_eq!(rec.texts(), vec!["```lua\n8\n```", "```lua\n<awaitable>\n```"]);

        // The unresolved third layer is available as `_`.
        c.debug(&channel(), "await(_)", &event("")).await.unwrap();
        assert_eq!(rec.texts()[2], "```lua\n1\n```");
    }

    #[tokio::test]
    async fn debug_errors_do_not_touch_last_result() {
        let (c, rec) = console(2000);
        c.debug(&channel(), "'keep'", &event("")).await.unwrap();
        c.debug(&channel(), "1 +", &event("")).await.unwrap();
        c.debug(&channel(), "nosuch.field", &event("")).await.unwrap();
        c.debug(&channel(), "_", &event("")).await.unwrap();

        let texts = rec.texts();
        assert!(texts[1].contains("SyntaxError:"), "{}", texts[1]);
        assert!(texts[2].contains("nosuch"), "{}", texts[2]);
        assert_eq!(texts[3], "```lua\nkeep\n```");
    }
}
