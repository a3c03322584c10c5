//! Driver for the sample combi device.
//!
//! One physical connection carries eight logical peripherals: cash drawer,
//! keylock, electronic key, line display, MSR, keyboard, scanner and tone
//! indicator. A single poller task owns the connection:
//!
//! ```text
//!  CashDrawer ─┐                 ┌──────────┐   ┌───────────┐
//!  LineDisplay ┼─ execute/post ─►│ Command  │──►│           │──► Transport
//!  Scanner ... ┘                 │ Queue    │   │  Poller   │
//!                                └──────────┘   │           │◄── frames
//!  handles ◄── EventRouter ◄── DeviceMirror ◄───┴───────────┘
//! ```
//!
//! The poller writes at most one command awaiting a response at a time,
//! polls the device status when idle, and tracks the connection state
//! (`Closed`, `IoError`, `Online`, `Offline`). Status frames are mirrored;
//! only changes become events.
//!
//! Peripheral handles in [`peripherals`] share a [`Driver`], usually through
//! a [`DriverRegistry`].

#![allow(async_fn_in_trait)]

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod mirror;
pub mod peripherals;
mod poller;
pub mod queue;
pub mod reader;
pub mod registry;

pub use config::{DriverConfig, KeyTable};
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use events::{
    DataEvent, ErrorEvent, EventKind, EventReceiver, EventRouter, PeripheralEvent, StatusUpdate,
};
pub use mirror::{DeviceMirror, DeviceSnapshot};
pub use peripherals::{
    CashDrawer, KeyWait, Keylock, LineDisplay, Msr, Peripheral, PosKeyboard, Scanner,
    ToneIndicator,
};
pub use queue::CommandQueue;
pub use registry::DriverRegistry;
