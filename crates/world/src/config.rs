//! Configuration for the world layer.

use crate::permissions::Permissions;

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub default_permissions: Permissions,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            default_permissions: Permissions::member(),
        }
    }
}
