use crate::client::ReolinkClient;
use crate::error::Result;
use crate::normalize::{as_flag, get_ci};
use crate::protocol::CommandEnvelope;
use async_trait::async_trait;
use serde_json::json;

#[async_trait]
pub trait Alarm: Send + Sync {
    /// Whether motion is currently detected on a channel
    async fn get_motion_state(&self, channel: u8) -> Result<bool>;

    /// Motion state for several channels in one exchange, correlated by order
    async fn get_motion_states(&self, channels: &[u8]) -> Result<Vec<bool>>;
}

fn state_of(value: &serde_json::Value) -> bool {
    get_ci(value, "state").and_then(as_flag).unwrap_or(false)
}

#[async_trait]
impl Alarm for ReolinkClient {
    async fn get_motion_state(&self, channel: u8) -> Result<bool> {
        let value = self
            .get_command("GetMdState", json!({"channel": channel}))
            .await?;
        Ok(state_of(&value))
    }

    async fn get_motion_states(&self, channels: &[u8]) -> Result<Vec<bool>> {
        let commands: Vec<_> = channels
            .iter()
            .map(|ch| CommandEnvelope::new("GetMdState", json!({"channel": ch})))
            .collect();

        self.submit(&commands)
            .await?
            .into_iter()
            .map(|entry| Ok(state_of(&entry.into_value()?)))
            .collect()
    }
}
