pub mod ai;
pub mod alarm;
pub mod ptz;
pub mod recording;
pub mod system;

pub use ai::Ai;
pub use alarm::Alarm;
pub use ptz::{Ptz, PtzDirection};
pub use recording::{Recording, RecordingFile};
pub use system::System;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde_json::{Value, json};

use crate::normalize::field_i64;

/// Decode the device's split-field timestamp objects
/// (`{year, mon, day, hour, min, sec}`).
pub(crate) fn device_time_to_naive(value: &Value) -> Option<NaiveDateTime> {
    let part = |keys: &[&str]| field_i64(value, keys);
    NaiveDate::from_ymd_opt(
        part(&["year"])? as i32,
        part(&["mon", "month"])? as u32,
        part(&["day"])? as u32,
    )?
    .and_hms_opt(
        part(&["hour"]).unwrap_or(0) as u32,
        part(&["min", "minute"]).unwrap_or(0) as u32,
        part(&["sec", "second"]).unwrap_or(0) as u32,
    )
}

pub(crate) fn naive_to_device_time(time: &NaiveDateTime) -> Value {
    use chrono::Datelike;
    json!({
        "year": time.year(),
        "mon": time.month(),
        "day": time.day(),
        "hour": time.hour(),
        "min": time.minute(),
        "sec": time.second(),
    })
}
