//! Wire protocol of the combi-device simulator.
//!
//! The device speaks a terse tag-prefixed binary-ASCII protocol. This crate
//! is pure: it decodes frames and encodes commands, but never touches a
//! transport. Byte acquisition (and its timeouts) lives in the driver.

pub mod assembler;
pub mod command;
pub mod ekey;
pub mod frame;
pub mod msr;

pub use assembler::FrameAssembler;
pub use command::Command;
pub use frame::{Frame, ScanData};
pub use msr::{MsrRead, TrackSet};
