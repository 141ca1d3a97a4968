//! Per-member capability flags within a world.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub request: bool,
}

impl Permissions {
    pub const fn owner() -> Self {
        Self {
            read: true,
            write: true,
            request: true,
        }
    }

    pub const fn member() -> Self {
        Self {
            read: true,
            write: true,
            request: true,
        }
    }

    pub const fn guest() -> Self {
        Self {
            read: true,
            write: false,
            request: false,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::member()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_cannot_write_or_request() {
        let guest = Permissions::guest();
        assert!(guest.read);
        assert!(!guest.write);
        assert!(!guest.request);
    }
}
