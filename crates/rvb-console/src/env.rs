//! Globals and per-invocation environments for console code.

use std::{cell::RefCell, rc::Rc, sync::Arc, time::Duration};

use mlua::{prelude::*, LuaSerdeExt};
use serde_json::Value;

use rvb_core::{
    domain::ChannelId,
    events::{EventKind, GatewayEvent},
    messaging::port::{ApiPort, MessagingPort},
    security::Redactor,
};

use crate::{awaitable, render, ClientInfo};

/// Where `print` output goes for one invocation.
#[derive(Clone, Default)]
pub struct Output {
    buf: Option<Rc<RefCell<String>>>,
}

impl Output {
    pub fn capturing() -> Self {
        Self {
            buf: Some(Rc::new(RefCell::new(String::new()))),
        }
    }

    /// Output that goes to the process log instead of the channel.
    pub fn logging() -> Self {
        Self { buf: None }
    }

    pub fn write_line(&self, line: &str) {
        match &self.buf {
            Some(buf) => {
                let mut buf = buf.borrow_mut();
                buf.push_str(line);
                buf.push('\n');
            }
            None => tracing::debug!(target: "lua", "{line}"),
        }
    }

    pub fn take(&self) -> String {
        self.buf
            .as_ref()
            .map(|b| std::mem::take(&mut *b.borrow_mut()))
            .unwrap_or_default()
    }
}

/// Convert JSON into Lua, mapping `null` to `nil`.
pub fn json_to_lua(lua: &Lua, v: &Value) -> LuaResult<LuaValue> {
    match v {
        Value::Null => Ok(LuaValue::Nil),
        Value::Bool(b) => Ok(LuaValue::Boolean(*b)),
        Value::Number(n) => Ok(match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => LuaValue::Integer(i),
            (None, Some(f)) => LuaValue::Number(f),
            _ => LuaValue::Nil,
        }),
        Value::String(s) => lua.create_string(s).map(LuaValue::String),
        Value::Array(items) => {
            let table = lua.create_table()?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            Ok(LuaValue::Table(table))
        }
        Value::Object(map) => {
            let table = lua.create_table()?;
            for (key, val) in map.iter().filter(|(_, v)| !v.is_null()) {
                table.raw_set(key.as_str(), json_to_lua(lua, val)?)?;
            }
            Ok(LuaValue::Table(table))
        }
    }
}

/// Install the globals shared by every invocation.
pub fn register_globals(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();

    awaitable::register(lua)?;

    // json.encode(v) / json.decode(s) -> value, nil | nil, err
    let json = lua.create_table()?;
    json.set(
        "encode",
        lua.create_function(|lua, value: LuaValue| {
            let value: Value = lua.from_value(value)?;
            Ok(match serde_json::to_string(&value) {
                Ok(s) => (Some(s), None),
                Err(e) => (None, Some(format!("cannot encode JSON: {e}"))),
            })
        })?,
    )?;
    json.set(
        "decode",
        lua.create_function(|lua, text: String| {
            Ok(match serde_json::from_str::<Value>(&text) {
                Ok(v) => (json_to_lua(lua, &v)?, None),
                Err(e) => (LuaValue::Nil, Some(format!("cannot decode JSON: {e}"))),
            })
        })?,
    )?;
    globals.set("json", json)?;

    let log = lua.create_table()?;
    log.set(
        "debug",
        lua.create_function(|_, msg: String| {
            tracing::debug!(target: "lua", "{msg}");
            Ok(())
        })?,
    )?;
    log.set(
        "info",
        lua.create_function(|_, msg: String| {
            tracing::info!(target: "lua", "{msg}");
            Ok(())
        })?,
    )?;
    log.set(
        "warn",
        lua.create_function(|_, msg: String| {
            tracing::warn!(target: "lua", "{msg}");
            Ok(())
        })?,
    )?;
    log.set(
        "error",
        lua.create_function(|_, msg: String| {
            tracing::error!(target: "lua", "{msg}");
            Ok(())
        })?,
    )?;
    globals.set("log", log)?;

    globals.set(
        "vars",
        lua.create_function(|lua, value: LuaValue| render::vars(lua, &value))?,
    )?;

    globals.set(
        "sleep",
        lua.create_async_function(|_, secs: f64| async move {
            let delay = Duration::try_from_secs_f64(secs)
                .map_err(|e| LuaError::runtime(format!("invalid sleep duration: {e}")))?;
            tokio::time::sleep(delay).await;
            Ok(())
        })?,
    )?;

    Ok(())
}

/// Build the `client` table exposed to console code.
pub fn client_table(
    lua: &Lua,
    info: &ClientInfo,
    messenger: Arc<dyn MessagingPort>,
    api: Arc<dyn ApiPort>,
    redactor: Redactor,
) -> LuaResult<LuaTable> {
    let client = lua.create_table()?;
    client.set("user_id", info.session.user_id.0.as_str())?;
    client.set("owner_id", info.session.owner_id.0.as_str())?;
    client.set("api_url", info.api_url.as_str())?;
    client.set("is_user", info.credentials.is_user())?;

    let headers = lua.create_table()?;
    headers.set(info.credentials.header_name(), info.credentials.secret())?;
    client.set("headers", headers)?;

    // client:send(channel, text) -> message id
    client.set(
        "send",
        lua.create_async_function(
            move |_, (_this, channel, text): (LuaValue, String, String)| {
                let messenger = messenger.clone();
                let text = redactor.redact(&text).into_owned();
                async move {
                    let sent = messenger
                        .send(&ChannelId(channel), &text)
                        .await
                        .map_err(LuaError::external)?;
                    Ok(sent.message_id.0)
                }
            },
        )?,
    )?;

    // client:request(method, path[, body]) -> decoded JSON
    client.set(
        "request",
        lua.create_async_function(
            move |lua, (_this, method, path, body): (LuaValue, String, String, LuaValue)| {
                let api = api.clone();
                async move {
                    let body = match body {
                        LuaValue::Nil => None,
                        other => Some(lua.from_value::<Value>(other)?),
                    };
                    let reply = api
                        .request(&method.to_uppercase(), &path, body)
                        .await
                        .map_err(LuaError::external)?;
                    json_to_lua(&lua, &reply)
                }
            },
        )?,
    )?;

    Ok(client)
}

/// Environment table for one `eval`/`debug` run. Unknown names fall back to
/// the globals.
pub fn invocation_env(
    lua: &Lua,
    client: &LuaTable,
    event: &GatewayEvent,
    last_result: LuaValue,
    out: &Output,
) -> LuaResult<LuaTable> {
    let env = lua.create_table()?;
    let mt = lua.create_table()?;
    mt.set("__index", lua.globals())?;
    lua.globals()
        .get::<LuaFunction>("setmetatable")?
        .call::<()>((env.clone(), mt))?;

    env.set("client", client.clone())?;
    env.set("event", json_to_lua(lua, &event.raw)?)?;
    if let EventKind::Message(m) = &event.kind {
        let message = lua.create_table()?;
        message.set("id", m.id.0.as_str())?;
        message.set("channel", m.channel.0.as_str())?;
        message.set("author", m.author.0.as_str())?;
        message.set("content", m.content.as_deref())?;
        env.set("message", message)?;
    }
    env.set("_", last_result)?;

    let sink = out.clone();
    env.set(
        "print",
        lua.create_function(move |lua, args: LuaVariadic<LuaValue>| {
            let tostring = lua.globals().get::<LuaFunction>("tostring")?;
            let parts = args
                .iter()
                .map(|v| tostring.call::<String>(v.clone()))
                .collect::<LuaResult<Vec<_>>>()?;
            sink.write_line(&parts.join("\t"));
            Ok(())
        })?,
    )?;

    let sink = out.clone();
    env.set(
        "pprint",
        lua.create_function(move |lua, value: LuaValue| {
            sink.write_line(&render::pretty(lua, &value)?);
            Ok(())
        })?,
    )?;

    let sink = out.clone();
    env.set(
        "bp",
        lua.create_function(move |lua, value: LuaValue| {
            let fields = render::vars(lua, &value)?;
            sink.write_line(&render::pretty(lua, &LuaValue::Table(fields))?);
            Ok(())
        })?,
    )?;

    Ok(env)
}
