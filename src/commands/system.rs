use crate::client::ReolinkClient;
use crate::commands::device_time_to_naive;
use crate::error::{ReolinkError, Result};
use crate::normalize::{DeviceInfo, get_ci};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::json;

#[async_trait]
pub trait System: Send + Sync {
    /// Get device identity and model information
    async fn get_device_info(&self) -> Result<DeviceInfo>;

    /// Get the device's current clock
    async fn get_time(&self) -> Result<NaiveDateTime>;

    /// Whether the device advertises a feature in its ability table
    async fn supports(&self, feature: &str) -> Result<bool>;

    /// Whether a channel advertises a feature in its ability table
    async fn channel_supports(&self, channel: usize, feature: &str) -> Result<bool>;
}

#[async_trait]
impl System for ReolinkClient {
    async fn get_device_info(&self) -> Result<DeviceInfo> {
        let value = self.get_command("GetDevInfo", json!({})).await?;
        DeviceInfo::from_response(&value)
    }

    async fn get_time(&self) -> Result<NaiveDateTime> {
        let value = self.get_command("GetTime", json!({})).await?;
        get_ci(&value, "Time")
            .and_then(device_time_to_naive)
            .ok_or_else(|| {
                ReolinkError::Normalization("time response carries no usable clock".to_string())
            })
    }

    async fn supports(&self, feature: &str) -> Result<bool> {
        Ok(self.capabilities().await?.supported(feature))
    }

    async fn channel_supports(&self, channel: usize, feature: &str) -> Result<bool> {
        Ok(self.capabilities().await?.channel_supported(channel, feature))
    }
}
