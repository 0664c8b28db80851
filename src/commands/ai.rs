use crate::client::ReolinkClient;
use crate::error::{ReolinkError, Result};
use crate::normalize::{AiDetectState, ZoneGrid, zone_cell_count};
use async_trait::async_trait;
use serde_json::json;

#[async_trait]
pub trait Ai: Send + Sync {
    /// Current AI detection state (people/vehicle/pet) for a channel
    async fn get_ai_state(&self, channel: u8) -> Result<AiDetectState>;

    /// Read the motion-detection zone grid
    async fn get_detection_zone(&self, channel: u8) -> Result<ZoneGrid>;

    /// Write the motion-detection zone grid
    async fn set_detection_zone(&self, channel: u8, grid: &ZoneGrid) -> Result<()>;
}

#[async_trait]
impl Ai for ReolinkClient {
    async fn get_ai_state(&self, channel: u8) -> Result<AiDetectState> {
        let value = self
            .get_command("GetAiState", json!({"channel": channel}))
            .await?;
        Ok(AiDetectState::from_response(&value))
    }

    async fn get_detection_zone(&self, channel: u8) -> Result<ZoneGrid> {
        let value = self
            .get_command("GetMdAlarm", json!({"channel": channel}))
            .await?;
        ZoneGrid::from_response(&value)
    }

    async fn set_detection_zone(&self, channel: u8, grid: &ZoneGrid) -> Result<()> {
        let cells = zone_cell_count(grid.width, grid.height)
            .filter(|_| grid.width > 0 && grid.height > 0);
        if cells != Some(grid.bits.len()) {
            return Err(ReolinkError::InvalidParameter {
                code: 0,
                detail: format!(
                    "zone grid is {}x{} but carries {} bits",
                    grid.width,
                    grid.height,
                    grid.bits.len()
                ),
            });
        }
        if grid.bits.bytes().any(|b| b != b'0' && b != b'1') {
            return Err(ReolinkError::InvalidParameter {
                code: 0,
                detail: "zone grid bits must be 0 or 1".to_string(),
            });
        }

        self.set_command(
            "SetMdAlarm",
            json!({"MdAlarm": {
                "channel": channel,
                "scope": {
                    "cols": grid.width,
                    "rows": grid.height,
                    "table": grid.bits,
                },
            }}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zone_writes_are_validated_before_any_exchange() {
        let client = ReolinkClient::new("192.0.2.1", "admin", "secret");

        let short = ZoneGrid {
            width: 4,
            height: 3,
            bits: "11111111111".into(),
        };
        let err = client.set_detection_zone(0, &short).await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));

        let junk = ZoneGrid {
            width: 2,
            height: 2,
            bits: "10x1".into(),
        };
        let err = client.set_detection_zone(0, &junk).await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));

        // Dimensions whose product overflows i64 must be rejected, not
        // multiplied.
        let huge = ZoneGrid {
            width: 1 << 62,
            height: 4,
            bits: "1111".into(),
        };
        let err = client.set_detection_zone(0, &huge).await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));
    }
}
