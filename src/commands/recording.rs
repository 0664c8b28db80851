use crate::client::ReolinkClient;
use crate::commands::{device_time_to_naive, naive_to_device_time};
use crate::error::{ReolinkError, Result};
use crate::normalize::{field_i64, field_str, get_ci};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde_json::{Value, json};
use tokio::{fs::File, io::AsyncWriteExt};

/// One recording on the device's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingFile {
    pub name: String,
    pub size: i64,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl RecordingFile {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            name: field_str(value, &["name", "fileName"])?,
            size: field_i64(value, &["size"]).unwrap_or(0),
            start: get_ci(value, "StartTime").and_then(device_time_to_naive),
            end: get_ci(value, "EndTime").and_then(device_time_to_naive),
        })
    }
}

#[async_trait]
pub trait Recording: Send + Sync {
    /// Search recordings on a channel within a time range
    async fn search_recordings(
        &self,
        channel: u8,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RecordingFile>>;

    /// Download a recording to a local path
    async fn download_recording(&self, filename: &str, target_path: &str) -> Result<()>;

    /// Grab a live JPEG snapshot
    async fn snapshot(&self, channel: u8) -> Result<Vec<u8>>;
}

#[async_trait]
impl Recording for ReolinkClient {
    async fn search_recordings(
        &self,
        channel: u8,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RecordingFile>> {
        if end < start {
            return Err(ReolinkError::InvalidParameter {
                code: 0,
                detail: "search range ends before it starts".to_string(),
            });
        }

        let value = self
            .get_command(
                "Search",
                json!({"Search": {
                    "channel": channel,
                    "onlyStatus": 0,
                    "streamType": "main",
                    "StartTime": naive_to_device_time(&start),
                    "EndTime": naive_to_device_time(&end),
                }}),
            )
            .await?;

        // An absent file list is a valid device state (nothing recorded).
        let files = get_ci(&value, "SearchResult")
            .and_then(|r| get_ci(r, "File"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(files.iter().filter_map(RecordingFile::from_value).collect())
    }

    async fn download_recording(&self, filename: &str, target_path: &str) -> Result<()> {
        let bytes = self
            .fetch_binary("Download", &[("source", filename), ("output", filename)])
            .await?;

        let mut file = File::create(target_path)
            .await
            .map_err(|e| ReolinkError::Transport(format!("failed to create {target_path}: {e}")))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| ReolinkError::Transport(format!("failed to write {target_path}: {e}")))?;
        Ok(())
    }

    async fn snapshot(&self, channel: u8) -> Result<Vec<u8>> {
        let channel = channel.to_string();
        // The device requires a unique `rs` value to defeat proxy caching.
        let rs = format!("{:x}", Utc::now().timestamp_micros());
        self.fetch_binary("Snap", &[("channel", channel.as_str()), ("rs", rs.as_str())])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_files_parse_device_timestamps() {
        let value = json!({
            "name": "Rec_001.mp4",
            "size": "1048576",
            "StartTime": {"year": 2025, "mon": 3, "day": 9, "hour": 13, "min": 5, "sec": 0},
            "EndTime": {"year": 2025, "mon": 3, "day": 9, "hour": 13, "min": 6, "sec": 30},
        });
        let file = RecordingFile::from_value(&value).unwrap();
        assert_eq!(file.name, "Rec_001.mp4");
        assert_eq!(file.size, 1_048_576);
        assert_eq!(
            file.start.unwrap().to_string(),
            "2025-03-09 13:05:00".to_string()
        );
    }

    #[test]
    fn nameless_file_entries_are_excluded() {
        assert!(RecordingFile::from_value(&json!({"size": 10})).is_none());
    }
}
