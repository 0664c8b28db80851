pub mod client;
pub mod commands;
pub mod constants;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::ReolinkClient;
pub use commands::*;
pub use error::{ReolinkError, Result};
pub use normalize::{
    AiDetectState, Capabilities, DeviceInfo, GuardPosition, PatrolStep, PtzPatrol, PtzPreset,
    ZoneGrid,
};
pub use protocol::{CommandEnvelope, ResultEntry};
pub use session::SessionMode;
pub use transport::{Exchange, HttpTransport, Method, Transport};
