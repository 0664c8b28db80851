//! Defensive parsing of device responses.
//!
//! The firmware family answers the same logical query with several
//! incompatible shapes: the documented wrapper object, a bare array at the
//! root, a singular object where an array is expected, or the wrapper key
//! under a different casing. Every entity here declares its candidate shapes
//! in a fixed priority order so the fallback behavior stays auditable, and a
//! bounded duck-typed scan is the logged last resort for firmwares nobody
//! documented.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use crate::error::{ReolinkError, Result};

/// One candidate layout for a collection-typed entity.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Shape {
    /// `{"<key>": [ .. ]}` — the documented wrapper-object layout.
    WrappedArray(&'static str),
    /// The value itself is the array.
    RootArray,
    /// `{"<key>": { .. }}` — a singular object promoted to one element.
    WrappedObject(&'static str),
}

/// Shape dispatch table for one entity type.
pub(crate) struct EntitySchema {
    pub name: &'static str,
    pub shapes: &'static [Shape],
    /// Keys that identify an element as this entity (duck typing).
    pub id_keys: &'static [&'static str],
}

impl EntitySchema {
    /// Resolve the raw value to the entity's element sequence.
    ///
    /// Tries each declared shape in order, then falls back to scanning the
    /// value's own keys for an array whose first element carries an id-like
    /// key, or for a nested object that does. An empty result is a valid
    /// outcome for collection entities.
    pub(crate) fn resolve(&self, value: &Value) -> Vec<Value> {
        for shape in self.shapes {
            match shape {
                Shape::WrappedArray(key) => {
                    if let Some(items) = get_ci(value, key).and_then(Value::as_array) {
                        return items.clone();
                    }
                }
                Shape::RootArray => {
                    if let Some(items) = value.as_array() {
                        return items.clone();
                    }
                }
                Shape::WrappedObject(key) => {
                    if let Some(obj) = get_ci(value, key).filter(|v| v.is_object()) {
                        return vec![obj.clone()];
                    }
                }
            }
        }

        // Last resort: duck-typed scan over the value's own keys.
        if let Some(map) = value.as_object() {
            for (key, candidate) in map {
                if let Some(items) = candidate.as_array()
                    && items.first().is_some_and(|v| self.looks_like(v))
                {
                    warn!(entity = self.name, key = %key, "resolved via duck-typed scan");
                    return items.clone();
                }
                if candidate.is_object() && self.looks_like(candidate) {
                    warn!(entity = self.name, key = %key, "resolved singular via duck-typed scan");
                    return vec![candidate.clone()];
                }
            }
        }

        Vec::new()
    }

    fn looks_like(&self, value: &Value) -> bool {
        value.is_object() && self.id_keys.iter().any(|k| get_ci(value, k).is_some())
    }
}

/// Case-insensitive object key lookup.
pub(crate) fn get_ci<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let map = value.as_object()?;
    if let Some(v) = map.get(key) {
        return Some(v);
    }
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// First present key wins; accepts both numbers and numeric strings.
pub(crate) fn field_i64(value: &Value, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| {
        let v = get_ci(value, k)?;
        v.as_i64().or_else(|| v.as_str()?.trim().parse().ok())
    })
}

pub(crate) fn field_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| get_ci(value, k)?.as_str().map(str::to_string))
}

/// Coerces a JSON bool or a 0/1 integer flag to a bool.
pub(crate) fn field_bool(value: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| as_flag(get_ci(value, k)?))
}

pub(crate) fn as_flag(value: &Value) -> Option<bool> {
    value.as_bool().or_else(|| value.as_i64().map(|n| n != 0))
}

/// The device omits `enable` on some firmwares; absence reads as enabled.
fn enabled_flag(value: &Value) -> bool {
    field_bool(value, &["enable", "enabled"]).unwrap_or(true)
}

// ── Canonical entities ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtzPreset {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
}

impl PtzPreset {
    const SCHEMA: EntitySchema = EntitySchema {
        name: "PtzPreset",
        shapes: &[
            Shape::WrappedArray("PtzPreset"),
            Shape::RootArray,
            Shape::WrappedObject("PtzPreset"),
            Shape::WrappedArray("Preset"),
        ],
        id_keys: &["id"],
    };

    fn from_value(value: &Value) -> Option<Self> {
        // No identifying key, no record; a preset without an id is useless.
        let id = field_i64(value, &["id"])?;
        let name = field_str(value, &["name"]).unwrap_or_else(|| format!("Preset {id}"));
        Some(Self {
            id,
            name,
            enabled: enabled_flag(value),
        })
    }

    pub fn collection(value: &Value) -> Vec<Self> {
        Self::SCHEMA
            .resolve(value)
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatrolStep {
    pub preset: i64,
    pub speed: i64,
    pub dwell_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtzPatrol {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub steps: Vec<PatrolStep>,
}

impl PtzPatrol {
    const SCHEMA: EntitySchema = EntitySchema {
        name: "PtzPatrol",
        shapes: &[
            Shape::WrappedArray("PtzPatrol"),
            Shape::RootArray,
            Shape::WrappedObject("PtzPatrol"),
            Shape::WrappedArray("Patrol"),
        ],
        id_keys: &["id"],
    };

    fn from_value(value: &Value) -> Option<Self> {
        let id = field_i64(value, &["id"])?;
        let name = field_str(value, &["name"]).unwrap_or_else(|| format!("Patrol {id}"));
        let steps = get_ci(value, "preset")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|step| {
                        // Read-time values pass through unvalidated; the
                        // device is authoritative for what it stored.
                        Some(PatrolStep {
                            preset: field_i64(step, &["id"])?,
                            speed: field_i64(step, &["speed"]).unwrap_or(1),
                            dwell_seconds: field_i64(step, &["dwellTime", "dwell"]).unwrap_or(1),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            name,
            enabled: enabled_flag(value),
            steps,
        })
    }

    pub fn collection(value: &Value) -> Vec<Self> {
        Self::SCHEMA
            .resolve(value)
            .iter()
            .filter_map(Self::from_value)
            .collect()
    }
}

/// PTZ guard (home) position state. Mandatory entity: a `GetPtzGuard`
/// response that yields no recognizable object is a normalization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPosition {
    pub enabled: bool,
    pub has_position: bool,
    pub timeout_seconds: i64,
}

impl GuardPosition {
    const SCHEMA: EntitySchema = EntitySchema {
        name: "PtzGuard",
        shapes: &[
            Shape::WrappedObject("PtzGuard"),
            Shape::WrappedObject("Guard"),
        ],
        id_keys: &["benable", "bexistPos", "timeout"],
    };

    pub fn from_response(value: &Value) -> Result<Self> {
        let obj = Self::SCHEMA
            .resolve(value)
            .into_iter()
            .next()
            .or_else(|| Self::SCHEMA.looks_like(value).then(|| value.clone()))
            .ok_or_else(|| {
                ReolinkError::Normalization("no guard position object in response".to_string())
            })?;

        Ok(Self {
            enabled: field_bool(&obj, &["benable", "enable"]).unwrap_or(true),
            has_position: field_bool(&obj, &["bexistPos", "existPos"]).unwrap_or(false),
            timeout_seconds: field_i64(&obj, &["timeout"]).unwrap_or(60),
        })
    }
}

/// A motion/AI detection zone grid. `bits` holds one `0`/`1` character per
/// cell, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneGrid {
    pub width: i64,
    pub height: i64,
    pub bits: String,
}

impl ZoneGrid {
    /// Accepts a scope object under any of the known wrappings, enforcing
    /// that the bit string covers the grid exactly. A size mismatch is a
    /// hard failure; truncating or padding would silently corrupt the zone.
    pub fn from_response(value: &Value) -> Result<Self> {
        let scope = Self::locate_scope(value).ok_or_else(|| {
            ReolinkError::Normalization("no zone scope object in response".to_string())
        })?;

        let width = field_i64(scope, &["width", "cols"]).ok_or_else(|| {
            ReolinkError::Normalization("zone scope is missing its width".to_string())
        })?;
        let height = field_i64(scope, &["height", "rows"]).ok_or_else(|| {
            ReolinkError::Normalization("zone scope is missing its height".to_string())
        })?;
        let bits = field_str(scope, &["table", "bits"]).ok_or_else(|| {
            ReolinkError::Normalization("zone scope is missing its bit table".to_string())
        })?;

        let expected = zone_cell_count(width, height).ok_or_else(|| {
            ReolinkError::Normalization(format!(
                "zone grid dimensions {width}x{height} are out of range"
            ))
        })?;
        if bits.len() != expected {
            return Err(ReolinkError::Normalization(format!(
                "zone grid is {width}x{height} but carries {} bits",
                bits.len()
            )));
        }

        Ok(Self {
            width,
            height,
            bits,
        })
    }

    fn locate_scope(value: &Value) -> Option<&Value> {
        let has_table = |v: &Value| get_ci(v, "table").is_some() || get_ci(v, "bits").is_some();

        for wrapper in ["MdAlarm", "Alarm", "AiAlarm"] {
            if let Some(inner) = get_ci(value, wrapper) {
                if let Some(scope) = get_ci(inner, "scope").filter(|v| has_table(v)) {
                    return Some(scope);
                }
                if has_table(inner) {
                    return Some(inner);
                }
            }
        }
        if let Some(scope) = get_ci(value, "scope").filter(|v| has_table(v)) {
            return Some(scope);
        }
        has_table(value).then_some(value)
    }
}

/// Largest grid dimension any known firmware produces, with generous slack.
const ZONE_GRID_MAX_DIM: i64 = 1024;

/// Cell count for a zone grid, or `None` when the dimensions are negative,
/// implausibly large, or would overflow.
pub(crate) fn zone_cell_count(width: i64, height: i64) -> Option<usize> {
    if !(0..=ZONE_GRID_MAX_DIM).contains(&width) || !(0..=ZONE_GRID_MAX_DIM).contains(&height) {
        return None;
    }
    width.checked_mul(height).map(|cells| cells as usize)
}

/// Per-type AI detection status for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AiDetectState {
    pub people: bool,
    pub vehicle: bool,
    pub pet: bool,
}

impl AiDetectState {
    /// The alarm field is either a bare 0/1 flag or an object carrying
    /// `alarm_state`, depending on firmware generation.
    pub fn from_response(value: &Value) -> Self {
        let state = |keys: &[&str]| -> bool {
            keys.iter().any(|k| {
                get_ci(value, k).is_some_and(|v| {
                    as_flag(v)
                        .or_else(|| field_bool(v, &["alarm_state", "state"]))
                        .unwrap_or(false)
                })
            })
        };

        Self {
            people: state(&["people"]),
            vehicle: state(&["vehicle"]),
            pet: state(&["dog_cat", "pet"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub model: String,
    pub firmware_version: String,
    pub serial: String,
    pub channels: i64,
}

impl DeviceInfo {
    pub fn from_response(value: &Value) -> Result<Self> {
        let obj = get_ci(value, "DevInfo").unwrap_or(value);
        let name = field_str(obj, &["name", "devName"]).ok_or_else(|| {
            ReolinkError::Normalization("device info carries no name".to_string())
        })?;
        Ok(Self {
            name,
            model: field_str(obj, &["model"]).unwrap_or_default(),
            firmware_version: field_str(obj, &["firmVer", "firmwareVersion"]).unwrap_or_default(),
            serial: field_str(obj, &["serial"]).unwrap_or_default(),
            channels: field_i64(obj, &["channelNum", "channels"]).unwrap_or(1),
        })
    }
}

/// Feature availability derived from the device `GetAbility` value.
///
/// Every ability entry is an object carrying `ver`; `ver != 0` means the
/// feature exists on this model. Derived once per session and cached.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    device: HashMap<String, bool>,
    channels: Vec<HashMap<String, bool>>,
}

impl Capabilities {
    pub fn from_response(value: &Value) -> Self {
        let ability = get_ci(value, "Ability").unwrap_or(value);

        let mut device = HashMap::new();
        let mut channels = Vec::new();

        if let Some(map) = ability.as_object() {
            for (key, entry) in map {
                if key.eq_ignore_ascii_case("abilityChn") {
                    if let Some(per_chan) = entry.as_array() {
                        channels = per_chan.iter().map(Self::flags_of).collect();
                    }
                    continue;
                }
                if let Some(flag) = Self::ability_flag(entry) {
                    device.insert(key.clone(), flag);
                }
            }
        }

        Self { device, channels }
    }

    fn flags_of(value: &Value) -> HashMap<String, bool> {
        value
            .as_object()
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| Some((k.clone(), Self::ability_flag(v)?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn ability_flag(entry: &Value) -> Option<bool> {
        field_i64(entry, &["ver"]).map(|ver| ver != 0)
    }

    pub fn supported(&self, feature: &str) -> bool {
        self.device.get(feature).copied().unwrap_or(false)
    }

    pub fn channel_supported(&self, channel: usize, feature: &str) -> bool {
        self.channels
            .get(channel)
            .and_then(|flags| flags.get(feature).copied())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn preset(id: i64, name: &str) -> Value {
        json!({"id": id, "name": name, "enable": 1, "channel": 0})
    }

    #[test]
    fn preset_shapes_normalize_identically() {
        let canonical = vec![
            PtzPreset {
                id: 1,
                name: "gate".into(),
                enabled: true,
            },
            PtzPreset {
                id: 2,
                name: "yard".into(),
                enabled: true,
            },
        ];

        let wrapped = json!({"PtzPreset": [preset(1, "gate"), preset(2, "yard")]});
        let root = json!([preset(1, "gate"), preset(2, "yard")]);
        let cased = json!({"ptzpreset": [preset(1, "gate"), preset(2, "yard")]});

        assert_eq!(PtzPreset::collection(&wrapped), canonical);
        assert_eq!(PtzPreset::collection(&root), canonical);
        assert_eq!(PtzPreset::collection(&cased), canonical);
    }

    #[test]
    fn singular_preset_promotes_to_one_element() {
        let value = json!({"PtzPreset": preset(7, "door")});
        let presets = PtzPreset::collection(&value);
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].id, 7);
    }

    #[test]
    fn duck_typed_scan_finds_undocumented_wrapper() {
        let value = json!({"SomeFirmwareKey": [preset(3, "roof")]});
        let presets = PtzPreset::collection(&value);
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].name, "roof");
    }

    #[test]
    fn preset_without_id_is_excluded() {
        let value = json!({"PtzPreset": [preset(1, "gate"), {"name": "orphan"}]});
        let presets = PtzPreset::collection(&value);
        assert_eq!(presets.len(), 1);
        assert_eq!(presets[0].id, 1);
    }

    #[test]
    fn missing_name_and_enable_get_defaults() {
        let value = json!({"PtzPreset": [{"id": 5}]});
        let presets = PtzPreset::collection(&value);
        assert_eq!(presets[0].name, "Preset 5");
        assert!(presets[0].enabled);
    }

    #[test]
    fn boolean_and_integer_flags_coerce_the_same() {
        let ints = json!({"PtzPreset": [{"id": 1, "enable": 0}]});
        let bools = json!({"PtzPreset": [{"id": 1, "enable": false}]});
        assert_eq!(PtzPreset::collection(&ints), PtzPreset::collection(&bools));
        assert!(!PtzPreset::collection(&ints)[0].enabled);
    }

    #[test]
    fn empty_and_unrecognizable_collections_degrade_to_empty() {
        assert!(PtzPreset::collection(&json!({"PtzPreset": []})).is_empty());
        assert!(PtzPreset::collection(&json!({"rspCode": 200})).is_empty());
        assert!(PtzPreset::collection(&json!(null)).is_empty());
    }

    #[test]
    fn patrol_carries_its_steps() {
        let value = json!({"PtzPatrol": [{
            "id": 1,
            "enable": 1,
            "name": "cruise",
            "preset": [
                {"id": 1, "speed": 32, "dwellTime": 3},
                {"id": 2, "speed": 16, "dwellTime": 5},
            ],
        }]});
        let patrols = PtzPatrol::collection(&value);
        assert_eq!(patrols.len(), 1);
        assert_eq!(
            patrols[0].steps,
            vec![
                PatrolStep {
                    preset: 1,
                    speed: 32,
                    dwell_seconds: 3
                },
                PatrolStep {
                    preset: 2,
                    speed: 16,
                    dwell_seconds: 5
                },
            ]
        );
    }

    #[test]
    fn out_of_range_read_values_pass_through() {
        // The device is authoritative for what it stored.
        let value = json!({"PtzPatrol": [{"id": 1, "preset": [{"id": 99, "speed": 900}]}]});
        let patrols = PtzPatrol::collection(&value);
        assert_eq!(patrols[0].steps[0].preset, 99);
        assert_eq!(patrols[0].steps[0].speed, 900);
    }

    #[test]
    fn guard_position_resolves_wrapped_and_bare() {
        let wrapped = json!({"PtzGuard": {"benable": 1, "bexistPos": 1, "timeout": 45}});
        let bare = json!({"benable": 1, "bexistPos": 1, "timeout": 45});
        let expected = GuardPosition {
            enabled: true,
            has_position: true,
            timeout_seconds: 45,
        };
        assert_eq!(GuardPosition::from_response(&wrapped).unwrap(), expected);
        assert_eq!(GuardPosition::from_response(&bare).unwrap(), expected);
    }

    #[test]
    fn guard_position_is_mandatory() {
        let err = GuardPosition::from_response(&json!({"rspCode": 200})).unwrap_err();
        assert!(matches!(err, ReolinkError::Normalization(_)));
    }

    #[test]
    fn zone_grid_accepts_exact_bit_length() {
        let value = json!({"MdAlarm": {"scope": {"cols": 4, "rows": 3, "table": "110010101011"}}});
        let grid = ZoneGrid::from_response(&value).unwrap();
        assert_eq!(grid.width, 4);
        assert_eq!(grid.height, 3);
        assert_eq!(grid.bits, "110010101011");
    }

    #[test]
    fn zone_grid_rejects_any_size_mismatch() {
        for bits in ["11001010101", "1100101010111", ""] {
            let value = json!({"scope": {"width": 4, "height": 3, "table": bits}});
            assert!(matches!(
                ZoneGrid::from_response(&value),
                Err(ReolinkError::Normalization(_))
            ));
        }
    }

    #[test]
    fn zone_grid_rejects_implausible_dimensions_without_panicking() {
        // Dimensions whose product overflows i64, and merely absurd ones.
        for (w, h) in [(1i64 << 62, 4i64), (-1, 3), (4, ZONE_GRID_MAX_DIM + 1)] {
            let value = json!({"scope": {"width": w, "height": h, "table": "1010"}});
            assert!(matches!(
                ZoneGrid::from_response(&value),
                Err(ReolinkError::Normalization(_))
            ));
        }
    }

    #[test]
    fn zone_grid_accepts_alternate_field_names() {
        let a = json!({"scope": {"cols": 2, "rows": 2, "table": "1010"}});
        let b = json!({"width": 2, "height": 2, "bits": "1010"});
        assert_eq!(
            ZoneGrid::from_response(&a).unwrap(),
            ZoneGrid::from_response(&b).unwrap()
        );
    }

    #[test]
    fn ai_state_coerces_both_firmware_layouts() {
        let nested = json!({
            "channel": 0,
            "people": {"alarm_state": 1, "support": 1},
            "vehicle": {"alarm_state": 0, "support": 1},
            "dog_cat": {"alarm_state": 0, "support": 0},
        });
        let flat = json!({"channel": 0, "people": 1, "vehicle": 0, "dog_cat": 0});

        let expected = AiDetectState {
            people: true,
            vehicle: false,
            pet: false,
        };
        assert_eq!(AiDetectState::from_response(&nested), expected);
        assert_eq!(AiDetectState::from_response(&flat), expected);
    }

    #[test]
    fn capabilities_read_device_and_channel_flags() {
        let value = json!({"Ability": {
            "email": {"permit": 6, "ver": 1},
            "ftp": {"permit": 6, "ver": 0},
            "abilityChn": [
                {"ptzType": {"permit": 6, "ver": 2}, "snap": {"permit": 4, "ver": 1}},
                {"ptzType": {"permit": 6, "ver": 0}},
            ],
        }});
        let caps = Capabilities::from_response(&value);
        assert!(caps.supported("email"));
        assert!(!caps.supported("ftp"));
        assert!(!caps.supported("nonexistent"));
        assert!(caps.channel_supported(0, "ptzType"));
        assert!(!caps.channel_supported(1, "ptzType"));
        assert!(!caps.channel_supported(9, "snap"));
    }

    #[test]
    fn device_info_requires_a_name() {
        let ok = json!({"DevInfo": {"name": "Cam", "model": "RLC-810A", "channelNum": 1}});
        let info = DeviceInfo::from_response(&ok).unwrap();
        assert_eq!(info.name, "Cam");
        assert_eq!(info.model, "RLC-810A");

        let bad = json!({"DevInfo": {"model": "RLC-810A"}});
        assert!(matches!(
            DeviceInfo::from_response(&bad),
            Err(ReolinkError::Normalization(_))
        ));
    }
}
