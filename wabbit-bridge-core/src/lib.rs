//! Narrow boundary between a host and an online learning core
//!
//! This crate exposes a learning core through three operations: open a
//! session from a configuration string, learn from or predict on one text
//! example, and close the session. Sessions are addressed by opaque handles,
//! every example is released before its call returns, and every failure
//! reaches the host as exactly one translated [`ErrorEnvelope`].
//!
//! Rust hosts use [`Bridge`] and [`Learner`]; foreign hosts use the C ABI in
//! [`ffi`].

pub mod bridge;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod example;
pub mod ffi;
pub mod label;
pub mod session;

pub use bridge::{Bridge, Learner};
pub use config::{BridgeConfig, CoreBackend};
pub use dispatch::Mode;
pub use error::{BridgeResult, CoreFailure, ErrorEnvelope, ErrorKind};
pub use label::{LabelKind, RawPrediction};
pub use session::{SessionHandle, SessionInfo, SessionRegistry};
