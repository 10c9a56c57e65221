#![cfg_attr(not(test), no_std)]

pub mod breakpoint;
pub mod emulator;
pub mod frame;
pub mod memory;
pub mod registers;

pub use frame::{DebugCause, ExceptionCause, RawTrapFrame, StopReason};
