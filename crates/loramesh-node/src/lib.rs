//! The loramesh device runtime.
//!
//! Owns what survives a reboot and what schedules the radio's day:
//! the persisted [`DeviceState`](devicestate::DeviceState) with its
//! bounded directory of mesh peers, staged-rename flash storage, TOML
//! configuration, and the async event loop that drives retransmission
//! ticks and periodic persistence over a caller-supplied flooding
//! substrate.

pub mod config;
pub mod devicestate;
pub mod error;
pub mod logging;
pub mod node;
pub mod nodedb;
pub mod region;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{Node, NodeEvent, ShutdownHandle};
pub use nodedb::{BootInfo, DirectoryUpdate, LoadedState, NodeDb};
pub use storage::{Store, StoreError};
