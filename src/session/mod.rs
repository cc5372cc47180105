//! Session management: per-source chain assembly, the session set, and
//! receiver configuration.

mod config;
mod group;

#[allow(clippy::module_inception)]
mod session;

pub use config::{CommonConfig, FecConfig, ReceiverConfig, SessionConfig};
pub use group::{Interface, PacketEndpoint, Receiver};
pub use session::{Session, SessionError};
