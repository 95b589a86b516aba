//! Service lifecycle: registration, boot, run and graceful shutdown.

pub mod app;
pub mod container;
pub mod service;

pub use app::{app, set_app, App, AppBuilder, DEFAULT_SHUTDOWN_TIMEOUT};
pub use container::Container;
pub use service::{shutdown_channel, Runner, Service, Shutdown, ShutdownTrigger};
