use crate::client::ReolinkClient;
use crate::constants::{PATROL_DWELL_RANGE, PATROL_ID_RANGE, PRESET_ID_RANGE, PTZ_SPEED_RANGE};
use crate::error::{ReolinkError, Result};
use crate::normalize::{GuardPosition, PtzPatrol, PtzPreset};
use async_trait::async_trait;
use serde_json::json;
use strum_macros::AsRefStr;

/// Continuous-motion operations accepted by `PtzCtrl`.
#[derive(Debug, Clone, Copy, AsRefStr)]
pub enum PtzDirection {
    Left,
    Right,
    Up,
    Down,
    LeftUp,
    LeftDown,
    RightUp,
    RightDown,
    ZoomInc,
    ZoomDec,
    FocusInc,
    FocusDec,
}

#[async_trait]
pub trait Ptz: Send + Sync {
    /// Start continuous movement in a direction
    async fn ptz_move(&self, channel: u8, direction: PtzDirection, speed: i64) -> Result<()>;

    /// Stop any ongoing PTZ movement
    async fn ptz_stop(&self, channel: u8) -> Result<()>;

    /// List stored presets
    async fn get_ptz_presets(&self, channel: u8) -> Result<Vec<PtzPreset>>;

    /// Store the current position as a preset
    async fn set_ptz_preset(&self, channel: u8, id: i64, name: &str) -> Result<()>;

    /// Move to a stored preset
    async fn goto_ptz_preset(&self, channel: u8, id: i64, speed: i64) -> Result<()>;

    /// List configured patrol routes
    async fn get_ptz_patrols(&self, channel: u8) -> Result<Vec<PtzPatrol>>;

    /// Write a patrol route
    async fn set_ptz_patrol(&self, channel: u8, patrol: &PtzPatrol) -> Result<()>;

    /// Start running a patrol route
    async fn start_patrol(&self, channel: u8, id: i64) -> Result<()>;

    /// Stop the running patrol route
    async fn stop_patrol(&self, channel: u8) -> Result<()>;

    /// Read the guard (home) position state
    async fn get_ptz_guard(&self, channel: u8) -> Result<GuardPosition>;

    /// Configure the guard position return behavior
    async fn set_ptz_guard(&self, channel: u8, enabled: bool, timeout_seconds: i64) -> Result<()>;
}

fn check_range(
    what: &str,
    value: i64,
    range: &std::ops::RangeInclusive<i64>,
) -> Result<()> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(ReolinkError::InvalidParameter {
        code: 0,
        detail: format!(
            "{what} {value} is outside {}..={}",
            range.start(),
            range.end()
        ),
    })
}

#[async_trait]
impl Ptz for ReolinkClient {
    async fn ptz_move(&self, channel: u8, direction: PtzDirection, speed: i64) -> Result<()> {
        check_range("speed", speed, &PTZ_SPEED_RANGE)?;
        self.set_command(
            "PtzCtrl",
            json!({"channel": channel, "op": direction.as_ref(), "speed": speed}),
        )
        .await
    }

    async fn ptz_stop(&self, channel: u8) -> Result<()> {
        self.set_command("PtzCtrl", json!({"channel": channel, "op": "Stop"}))
            .await
    }

    async fn get_ptz_presets(&self, channel: u8) -> Result<Vec<PtzPreset>> {
        let value = self
            .get_command("GetPtzPreset", json!({"channel": channel}))
            .await?;
        Ok(PtzPreset::collection(&value))
    }

    async fn set_ptz_preset(&self, channel: u8, id: i64, name: &str) -> Result<()> {
        check_range("preset id", id, &PRESET_ID_RANGE)?;
        self.set_command(
            "SetPtzPreset",
            json!({"PtzPreset": {
                "channel": channel,
                "enable": 1,
                "id": id,
                "name": name,
            }}),
        )
        .await
    }

    async fn goto_ptz_preset(&self, channel: u8, id: i64, speed: i64) -> Result<()> {
        check_range("preset id", id, &PRESET_ID_RANGE)?;
        check_range("speed", speed, &PTZ_SPEED_RANGE)?;
        self.set_command(
            "PtzCtrl",
            json!({"channel": channel, "op": "ToPos", "id": id, "speed": speed}),
        )
        .await
    }

    async fn get_ptz_patrols(&self, channel: u8) -> Result<Vec<PtzPatrol>> {
        let value = self
            .get_command("GetPtzPatrol", json!({"channel": channel}))
            .await?;
        Ok(PtzPatrol::collection(&value))
    }

    async fn set_ptz_patrol(&self, channel: u8, patrol: &PtzPatrol) -> Result<()> {
        check_range("patrol id", patrol.id, &PATROL_ID_RANGE)?;
        for step in &patrol.steps {
            check_range("step preset", step.preset, &PRESET_ID_RANGE)?;
            check_range("step speed", step.speed, &PTZ_SPEED_RANGE)?;
            check_range("step dwell", step.dwell_seconds, &PATROL_DWELL_RANGE)?;
        }

        let steps: Vec<_> = patrol
            .steps
            .iter()
            .map(|s| json!({"id": s.preset, "speed": s.speed, "dwellTime": s.dwell_seconds}))
            .collect();

        self.set_command(
            "SetPtzPatrol",
            json!({"PtzPatrol": {
                "channel": channel,
                "enable": i32::from(patrol.enabled),
                "id": patrol.id,
                "name": patrol.name,
                "preset": steps,
            }}),
        )
        .await
    }

    async fn start_patrol(&self, channel: u8, id: i64) -> Result<()> {
        check_range("patrol id", id, &PATROL_ID_RANGE)?;
        self.set_command(
            "PtzCtrl",
            json!({"channel": channel, "op": "StartPatrol", "id": id}),
        )
        .await
    }

    async fn stop_patrol(&self, channel: u8) -> Result<()> {
        self.set_command("PtzCtrl", json!({"channel": channel, "op": "StopPatrol"}))
            .await
    }

    async fn get_ptz_guard(&self, channel: u8) -> Result<GuardPosition> {
        let value = self
            .get_command("GetPtzGuard", json!({"channel": channel}))
            .await?;
        GuardPosition::from_response(&value)
    }

    async fn set_ptz_guard(&self, channel: u8, enabled: bool, timeout_seconds: i64) -> Result<()> {
        self.set_command(
            "SetPtzGuard",
            json!({"PtzGuard": {
                "channel": channel,
                "benable": i32::from(enabled),
                "timeout": timeout_seconds,
                "cmdStr": "setPos",
            }}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_reject_out_of_range_values_before_any_exchange() {
        // No transport is configured; reaching the wire would error
        // differently, so an InvalidParameter here proves early rejection.
        let client = ReolinkClient::new("192.0.2.1", "admin", "secret");

        let err = client.ptz_move(0, PtzDirection::Left, 0).await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));

        let err = client.set_ptz_preset(0, 64, "too high").await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));

        let err = client.start_patrol(0, 6).await.unwrap_err();
        assert!(matches!(err, ReolinkError::InvalidParameter { .. }));
    }
}
