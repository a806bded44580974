use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::{ChannelId, MessageRef},
    Result,
};

/// Outbound messaging port.
///
/// The console and the command router only ever need to deliver text to a
/// channel; the Revolt REST client is the production implementation.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send(&self, channel_id: &ChannelId, content: &str) -> Result<MessageRef>;
}

/// Raw REST access, exposed to console code as `client:request(...)`.
#[async_trait]
pub trait ApiPort: Send + Sync {
    /// `path` is relative to the API root, e.g. `/users/@me`.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> Result<Value>;
}
