#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod connection;
pub mod console;
pub mod packets;
pub mod session;
pub mod signal;
pub mod stub;
pub mod target;

pub use session::{DebugSession, SessionState, SessionToken, StubConfig};
