//! World layer data model.

use crate::permissions::Permissions;
use kernel::{SpeakerId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type WorldId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub speaker: SpeakerId,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub owner: SpeakerId,
    pub status: WorldStatus,
    pub created_at: Timestamp,
    pub members: BTreeMap<SpeakerId, Member>,
    pub invited: BTreeSet<SpeakerId>,
}

impl World {
    pub fn is_member(&self, speaker: SpeakerId) -> bool {
        speaker == self.owner || self.members.contains_key(&speaker)
    }

    pub fn permissions_of(&self, speaker: SpeakerId) -> Option<Permissions> {
        if speaker == self.owner {
            return Some(Permissions::owner());
        }
        self.members.get(&speaker).map(|m| m.permissions)
    }
}
