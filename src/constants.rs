use phf::phf_map;

/// Classification buckets for device response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    NotSupported,
    InvalidParameter,
    Unknown,
}

/// Device `rspCode` values and their classification, per the vendor API guide.
///
/// Codes not listed here classify as [`ErrorKind::Unknown`].
pub static RSP_CODES: phf::Map<i64, ErrorKind> = phf_map! {
    -1i64 => ErrorKind::InvalidParameter, // missing parameters
    -2i64 => ErrorKind::Unknown,          // used up memory
    -3i64 => ErrorKind::Unknown,          // check error
    -4i64 => ErrorKind::InvalidParameter, // parameters error
    -5i64 => ErrorKind::Auth,             // reached the max session number
    -6i64 => ErrorKind::Auth,             // login required / token expired
    -7i64 => ErrorKind::Auth,             // login failed
    -8i64 => ErrorKind::Unknown,          // operation timeout
    -9i64 => ErrorKind::NotSupported,     // not supported
    -10i64 => ErrorKind::Unknown,         // protocol error
    -11i64 => ErrorKind::Unknown,         // failed to read operation
    -12i64 => ErrorKind::Unknown,         // failed to get configuration
    -13i64 => ErrorKind::Unknown,         // failed to set configuration
    -14i64 => ErrorKind::Unknown,         // failed to apply to other channels
    -16i64 => ErrorKind::Unknown,         // failed to test
    -19i64 => ErrorKind::InvalidParameter, // parameter length is wrong
    -26i64 => ErrorKind::Unknown,         // device busy
    -27i64 => ErrorKind::Auth,            // wrong user or password
};

/// Codes that mean the session token was rejected and a re-login may recover.
pub const TOKEN_INVALID_CODES: &[i64] = &[-6];

/// Fixed command endpoint, relative to the device root.
pub const API_PATH: &str = "/cgi-bin/api.cgi";

pub const HTTP_PORT: u16 = 80;
pub const HTTPS_PORT: u16 = 443;

/// Lease slack subtracted from the advertised token lifetime so a token is
/// never presented right at its expiry edge.
pub const TOKEN_LEASE_MARGIN_SECS: u64 = 5;

// Documented numeric ranges for PTZ route data; enforced before writes only.
pub const PRESET_ID_RANGE: std::ops::RangeInclusive<i64> = 0..=63;
pub const PATROL_ID_RANGE: std::ops::RangeInclusive<i64> = 0..=5;
pub const PTZ_SPEED_RANGE: std::ops::RangeInclusive<i64> = 1..=64;
pub const PATROL_DWELL_RANGE: std::ops::RangeInclusive<i64> = 1..=30;
