//! Multi-tenant world layer built over the trust kernel.

pub mod config;
pub mod error;
pub mod namespace;
pub mod permissions;
pub mod registry;
pub mod types;

pub use config::WorldConfig;
pub use error::{Result, WorldError};
pub use namespace::namespaced;
pub use permissions::Permissions;
pub use registry::WorldRegistry;
pub use types::{Member, World, WorldId, WorldStatus};
