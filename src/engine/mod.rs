// src/engine/mod.rs

pub mod locks;
pub mod ranking;
pub mod scoring;
pub mod session;
pub mod timer;
pub mod timing;

pub use session::SessionEngine;
pub use timer::{Expiry, TimerScheduler};
pub use timing::TimingTracker;
