//! Revolt adapter (REST + websocket gateway).
//!
//! This crate implements the `rvb-core` ports over the Revolt HTTP API and
//! drives the event loop from the gateway.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

pub mod gateway;
pub mod handlers;
pub mod router;

use rvb_core::{
    config::Credentials,
    domain::{ChannelId, MessageId, MessageRef, Session, UserId},
    errors::Error,
    formatting::decorate,
    messaging::port::{ApiPort, MessagingPort},
    Result,
};

#[derive(Clone)]
pub struct RevoltClient {
    http: reqwest::Client,
    api_url: String,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct SelfUser {
    #[serde(rename = "_id")]
    id: UserId,
    #[serde(default)]
    bot: Option<BotInfo>,
}

#[derive(Debug, Deserialize)]
struct BotInfo {
    owner: UserId,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    #[serde(rename = "_id")]
    id: MessageId,
}

impl RevoltClient {
    pub fn new(api_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header(self.credentials.header_name(), self.credentials.secret())
    }

    /// Who we are logged in as, and who may drive the console.
    ///
    /// Bots are owned by the account that created them; a user account owns
    /// itself. `owner_override` wins over both.
    pub async fn fetch_session(&self, owner_override: Option<UserId>) -> Result<Session> {
        let me: SelfUser = self
            .builder(Method::GET, "/users/@me")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let owner_id = match (owner_override, me.bot, self.credentials.is_user()) {
            (Some(owner), _, _) => owner,
            (None, _, true) => me.id.clone(),
            (None, Some(bot), false) => bot.owner,
            (None, None, false) => {
                return Err(Error::External(
                    "account has no bot owner; set REVOLTBOT_OWNER_ID".to_string(),
                ))
            }
        };

        Ok(Session {
            user_id: me.id,
            owner_id,
        })
    }
}

/// Nonces are time-ordered so the server can de-duplicate retries.
fn nonce() -> String {
    uuid::Uuid::now_v7().to_string()
}

fn message_payload(content: &str) -> Value {
    json!({ "content": decorate(content), "nonce": nonce() })
}

#[async_trait]
impl MessagingPort for RevoltClient {
    async fn send(&self, channel_id: &ChannelId, content: &str) -> Result<MessageRef> {
        let sent: SentMessage = self
            .builder(Method::POST, &format!("/channels/{channel_id}/messages"))
            .json(&message_payload(content))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(MessageRef {
            channel_id: channel_id.clone(),
            message_id: sent.id,
        })
    }
}

#[async_trait]
impl ApiPort for RevoltClient {
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| Error::External(format!("invalid HTTP method {method:?}: {e}")))?;
        let mut req = self.builder(method, path);
        if let Some(body) = body {
            req = req.json(&body);
        }

        let text = req.send().await?.error_for_status()?.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_decorated_with_fresh_nonce() {
        let a = message_payload("Pong!");
        let b = message_payload("Pong!");
        assert_eq!(a["content"], "\u{1F603}\nPong!\n\u{1F603}");
        assert_ne!(a["nonce"], b["nonce"]);
        // v7 ids sort by creation time.
        assert!(a["nonce"].as_str().unwrap() < b["nonce"].as_str().unwrap());
    }

    #[test]
    fn parses_self_user() {
        let me: SelfUser =
            serde_json::from_str(r#"{"_id":"01BOT","username":"rb","bot":{"owner":"01OWN"}}"#)
                .unwrap();
        assert_eq!(me.id, UserId("01BOT".to_string()));
        assert_eq!(me.bot.unwrap().owner, UserId("01OWN".to_string()));

        let user: SelfUser = serde_json::from_str(r#"{"_id":"01USR"}"#).unwrap();
        assert!(user.bot.is_none());
    }

    #[test]
    fn strips_trailing_slash_from_api_url() {
        let c = RevoltClient::new("https://api.example/", Credentials::Bot("t".to_string()));
        assert_eq!(c.api_url(), "https://api.example");
    }
}
