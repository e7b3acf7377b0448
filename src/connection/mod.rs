//! Router configuration and the registry of forwarded client connections.

pub mod config;
pub mod registry;

pub use config::RouterConfig;
pub use registry::{
    Binding, BindingInfo, BindingTarget, ConnectionLease, ConnectionRegistry, RouterStats,
};
