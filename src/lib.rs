// lib.rs
#![warn(clippy::large_futures)]

pub use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

pub use anyhow::bail;
pub use log::*;
pub use serde::{Deserialize, Serialize};
pub use tokio::{
    sync::RwLock,
    time::{Duration, sleep},
};

mod config;
pub use config::*;

mod state;
pub use state::*;

mod wifi;
pub use wifi::*;

mod measure;
pub use measure::*;

mod timesync;
pub use timesync::*;

mod notify;
pub use notify::*;

mod cycle;
pub use cycle::*;

pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

// EOF
