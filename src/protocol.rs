//! Wire envelope for the JSON command protocol.
//!
//! One physical exchange POSTs an ordered array of command envelopes and
//! receives an ordered array of per-command results. Order is the only
//! correlation mechanism; the device assigns no request identifiers.

use serde_json::{Value, json};

use crate::error::{ReolinkError, Result};
use crate::normalize::get_ci;

/// One named operation plus its parameters. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub cmd: String,
    /// Command-dependent selector; `1` asks for value plus range metadata
    /// on commands that support it.
    pub action: u8,
    pub param: Value,
}

impl CommandEnvelope {
    pub fn new(cmd: impl Into<String>, param: Value) -> Self {
        Self {
            cmd: cmd.into(),
            action: 0,
            param,
        }
    }

    /// An envelope with an empty parameter object.
    pub fn bare(cmd: impl Into<String>) -> Self {
        Self::new(cmd, json!({}))
    }

    pub fn with_action(mut self, action: u8) -> Self {
        self.action = action;
        self
    }
}

/// The device's per-command outcome.
#[derive(Debug, Clone)]
pub enum ResultEntry {
    Success(Value),
    Failure { code: i64, detail: String },
}

impl ResultEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this entry reports the session token as rejected.
    pub fn is_token_rejection(&self) -> bool {
        match self {
            Self::Failure { code, .. } => ReolinkError::is_token_rejection(*code),
            Self::Success(_) => false,
        }
    }

    /// Unwrap the value, classifying a failure through the device-code table.
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure { code, detail } => Err(ReolinkError::from_device_code(code, detail)),
        }
    }
}

pub(crate) fn encode_batch(commands: &[CommandEnvelope]) -> Result<Vec<u8>> {
    let body: Vec<Value> = commands
        .iter()
        .map(|c| {
            json!({
                "cmd": c.cmd,
                "action": c.action,
                "param": c.param,
            })
        })
        .collect();

    serde_json::to_vec(&body).map_err(|e| ReolinkError::Serialization(e.to_string()))
}

/// Decode a response body into result entries correlated by position.
///
/// The entry count must match the submitted envelope count; anything else
/// breaks order-based correlation and is rejected outright.
pub(crate) fn decode_batch(body: &[u8], expected: usize) -> Result<Vec<ResultEntry>> {
    let parsed: Value = serde_json::from_slice(body)
        .map_err(|e| ReolinkError::Normalization(format!("response is not JSON: {e}")))?;

    let entries = parsed
        .as_array()
        .ok_or_else(|| ReolinkError::Normalization("response is not an array".to_string()))?;

    if entries.len() != expected {
        return Err(ReolinkError::Normalization(format!(
            "submitted {expected} commands but device answered {}",
            entries.len()
        )));
    }

    Ok(entries.iter().map(decode_entry).collect())
}

fn decode_entry(entry: &Value) -> ResultEntry {
    let code = get_ci(entry, "code").and_then(Value::as_i64).unwrap_or(0);
    if code == 0 {
        let value = get_ci(entry, "value").cloned().unwrap_or(json!({}));
        return ResultEntry::Success(value);
    }

    let error = get_ci(entry, "error");
    let device_code = error
        .and_then(|e| get_ci(e, "rspCode"))
        .and_then(Value::as_i64)
        .unwrap_or(code);
    let detail = error
        .and_then(|e| get_ci(e, "detail"))
        .and_then(Value::as_str)
        .unwrap_or("no detail reported")
        .to_string();

    ResultEntry::Failure {
        code: device_code,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_success_and_failure_in_order() {
        let body = serde_json::to_vec(&json!([
            {"cmd": "GetDevInfo", "code": 0, "value": {"DevInfo": {"name": "Device1"}}},
            {"cmd": "GetEnc", "code": 1, "error": {"rspCode": -9, "detail": "not support"}},
        ]))
        .unwrap();

        let entries = decode_batch(&body, 2).unwrap();
        assert!(entries[0].is_success());
        match &entries[1] {
            ResultEntry::Failure { code, detail } => {
                assert_eq!(*code, -9);
                assert_eq!(detail, "not support");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn entry_count_mismatch_is_rejected() {
        let body = serde_json::to_vec(&json!([{"cmd": "GetDevInfo", "code": 0}])).unwrap();
        assert!(matches!(
            decode_batch(&body, 2),
            Err(ReolinkError::Normalization(_))
        ));
    }

    #[test]
    fn missing_value_decodes_to_empty_object() {
        let body = serde_json::to_vec(&json!([{"cmd": "SetPtzPreset", "code": 0}])).unwrap();
        let entries = decode_batch(&body, 1).unwrap();
        assert_eq!(entries[0].clone().into_value().unwrap(), json!({}));
    }

    #[test]
    fn token_rejection_is_detected() {
        let body = serde_json::to_vec(&json!([
            {"cmd": "GetDevInfo", "code": 1, "error": {"rspCode": -6, "detail": "please login first"}},
        ]))
        .unwrap();
        let entries = decode_batch(&body, 1).unwrap();
        assert!(entries[0].is_token_rejection());
    }
}
