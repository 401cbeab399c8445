//! monitor_bridge-lib: patient-monitor link decoding, vital-sign merging and
//! payload publication

pub mod context;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod hl7;
pub mod merger;
pub mod message;
pub mod payload;
pub mod session;
pub mod wave;

// re-exports for ergonomic imports:
pub use context::Context;
pub use discovery::{DiscoveryConfig, MonitorAddress, discover};
pub use error::{DecodeError, SessionError};
pub use message::{ConnectIndication, Message, VitalSign, Wave};
pub use session::{Session, SessionConfig};
