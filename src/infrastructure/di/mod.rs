//! Dependency wiring

mod service_container;

pub use service_container::{env_snapshot, ServiceContainer};
