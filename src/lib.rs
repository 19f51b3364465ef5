#![allow(clippy::uninlined_format_args)]

pub mod animation;
pub mod app;
pub mod clock;
pub mod codec;
pub mod comments;
pub mod config;
pub mod ignore;
pub mod navigation;
pub mod prefs;
pub mod read_state;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod throttle;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
