use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageRef},
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two sends.
    pub global_min_interval: Duration,
    /// Minimum spacing between sends to the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_channel_min_interval: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration, next: Instant) -> Self {
        Self { interval, next }
    }

    /// Claim the earliest free slot at or after `now`; returns how long to
    /// wait for it.
    fn reserve_at(&mut self, now: Instant) -> Duration {
        let slot = now.max(self.next);
        self.next = slot + self.interval;
        slot - now
    }
}

/// MessagingPort decorator that spaces out outbound sends.
///
/// Long console output turns into many consecutive messages; pacing them keeps
/// the bot under the service rate limit. Failed sends are not retried.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<ChannelId, IntervalLimiter>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval, Instant::now())),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle(&self, channel_id: &ChannelId) {
        let now = Instant::now();
        let global_wait = { self.global.lock().await.reserve_at(now) };
        let channel_wait = {
            let mut map = self.per_channel.lock().await;
            // A channel whose slot has passed needs no spacing; forget it.
            map.retain(|_, lim| lim.next > now);
            map.entry(channel_id.clone())
                .or_insert_with(|| IntervalLimiter::new(self.cfg.per_channel_min_interval, now))
                .reserve_at(now)
        };

        let wait = global_wait.max(channel_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    async fn send(&self, channel_id: &ChannelId, content: &str) -> Result<MessageRef> {
        self.throttle(channel_id).await;
        self.inner.send(channel_id, content).await
    }
}
