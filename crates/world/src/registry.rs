//! World registry and operations. A client of the kernel,
//! not an owner of it: every call takes `&Kernel` (a cheap, clonable handle)
//! and mediates its own membership rules on top.

use crate::config::WorldConfig;
use crate::error::{Result, WorldError};
use crate::namespace::namespaced;
use crate::permissions::Permissions;
use crate::types::{Member, World, WorldId, WorldStatus};
use kernel::{Kernel, Request, SpeakerId, Status, Timestamp, Value};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct WorldRegistry {
    worlds: BTreeMap<WorldId, World>,
    next_id: WorldId,
    config: WorldConfig,
}

impl WorldRegistry {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            worlds: BTreeMap::new(),
            next_id: 0,
            config,
        }
    }

    fn require_authenticated(kernel: &Kernel, speaker: SpeakerId) -> Result<()> {
        if kernel.is_authenticated(speaker) {
            Ok(())
        } else {
            Err(WorldError::SpeakerNotAuthenticated)
        }
    }

    fn world_mut(&mut self, id: WorldId) -> Result<&mut World> {
        self.worlds.get_mut(&id).ok_or(WorldError::WorldNotFound)
    }

    fn world(&self, id: WorldId) -> Result<&World> {
        self.worlds.get(&id).ok_or(WorldError::WorldNotFound)
    }

    pub fn get(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(&id)
    }

    pub fn create_world(&mut self, kernel: &Kernel, owner: SpeakerId, name: impl Into<String>) -> Result<World> {
        Self::require_authenticated(kernel, owner)?;
        let id = self.next_id;
        self.next_id += 1;
        let world = World {
            id,
            name: name.into(),
            owner,
            status: WorldStatus::Active,
            created_at: kernel.now(),
            members: BTreeMap::new(),
            invited: BTreeSet::new(),
        };
        self.worlds.insert(id, world.clone());
        tracing::info!(world_id = id, owner, "world created");
        Ok(world)
    }

    pub fn invite_to_world(
        &mut self,
        kernel: &Kernel,
        world_id: WorldId,
        inviter: SpeakerId,
        invitee: SpeakerId,
    ) -> Result<()> {
        Self::require_authenticated(kernel, invitee)?;
        let world = self.world_mut(world_id)?;
        if world.status == WorldStatus::Archived {
            return Err(WorldError::WorldArchived);
        }
        if inviter != world.owner {
            return Err(WorldError::NotOwner);
        }
        if world.is_member(invitee) {
            return Err(WorldError::AlreadyMember);
        }
        world.invited.insert(invitee);
        Ok(())
    }

    pub fn join_world(&mut self, kernel: &Kernel, world_id: WorldId, speaker: SpeakerId) -> Result<()> {
        Self::require_authenticated(kernel, speaker)?;
        let default_permissions = self.config.default_permissions;
        let world = self.world_mut(world_id)?;
        if world.status == WorldStatus::Archived {
            return Err(WorldError::WorldArchived);
        }
        if !world.invited.remove(&speaker) {
            return Err(WorldError::NotInvited);
        }
        world.members.insert(
            speaker,
            Member {
                speaker,
                permissions: default_permissions,
            },
        );
        Ok(())
    }

    pub fn leave_world(&mut self, world_id: WorldId, speaker: SpeakerId) -> Result<()> {
        let world = self.world_mut(world_id)?;
        if speaker == world.owner {
            return Err(WorldError::OwnerCannotLeave);
        }
        if world.members.remove(&speaker).is_none() {
            return Err(WorldError::NotMember);
        }
        Ok(())
    }

    /// One-way: an archived world never becomes active again.
    pub fn archive_world(&mut self, world_id: WorldId, caller: SpeakerId) -> Result<()> {
        let world = self.world_mut(world_id)?;
        if caller != world.owner {
            return Err(WorldError::NotOwner);
        }
        world.status = WorldStatus::Archived;
        Ok(())
    }

    pub fn audit(&self, world_id: WorldId) -> Result<Vec<Member>> {
        let world = self.world(world_id)?;
        let mut members: Vec<Member> = world.members.values().cloned().collect();
        members.push(Member {
            speaker: world.owner,
            permissions: Permissions::owner(),
        });
        Ok(members)
    }

    pub fn world_write(
        &self,
        kernel: &Kernel,
        world_id: WorldId,
        caller: SpeakerId,
        name: &str,
        value: Value,
    ) -> Result<Option<Value>> {
        let world = self.world(world_id)?;
        if world.status == WorldStatus::Archived {
            return Err(WorldError::WorldArchived);
        }
        match world.permissions_of(caller) {
            Some(p) if p.write => {}
            Some(_) => return Err(WorldError::NotMember),
            None => return Err(WorldError::NotMember),
        }
        let key = namespaced(&world.name, caller, name);
        kernel
            .write(caller, &key, value)
            .map_err(|_: Status| WorldError::SpeakerNotAuthenticated)
    }

    pub fn world_read(
        &self,
        kernel: &Kernel,
        world_id: WorldId,
        caller: SpeakerId,
        owner: SpeakerId,
        name: &str,
    ) -> Result<Value> {
        let world = self.world(world_id)?;
        if world.permissions_of(caller).is_none() {
            return Err(WorldError::NotMember);
        }
        let key = namespaced(&world.name, owner, name);
        kernel
            .read(caller, owner, &key)
            .map_err(|_: Status| WorldError::NotMember)
    }

    pub fn world_request(
        &self,
        kernel: &Kernel,
        world_id: WorldId,
        from: SpeakerId,
        to: SpeakerId,
        action: impl Into<String>,
        data: Option<Value>,
        expires_at: Option<Timestamp>,
    ) -> Result<Request> {
        let world = self.world(world_id)?;
        if world.status == WorldStatus::Archived {
            return Err(WorldError::WorldArchived);
        }
        match world.permissions_of(from) {
            Some(p) if p.request => {}
            _ => return Err(WorldError::NotMember),
        }
        if world.permissions_of(to).is_none() {
            return Err(WorldError::NotMember);
        }
        kernel
            .request(from, to, action, data, expires_at)
            .map_err(|_: Status| WorldError::SpeakerNotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::{KernelConfig, SimulatedClock, ROOT_SPEAKER};
    use std::rc::Rc;

    fn setup() -> (Kernel, WorldRegistry, SpeakerId, SpeakerId) {
        let kernel = Kernel::new(KernelConfig::default(), Rc::new(SimulatedClock::new()));
        let owner = kernel.create_speaker(ROOT_SPEAKER, "teacher").unwrap();
        let member = kernel.create_speaker(ROOT_SPEAKER, "student").unwrap();
        let registry = WorldRegistry::new(WorldConfig::default());
        (kernel, registry, owner.id, member.id)
    }

    #[test]
    fn join_requires_invite() {
        let (kernel, mut registry, owner, member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        let err = registry.join_world(&kernel, world.id, member).unwrap_err();
        assert_eq!(err, WorldError::NotInvited);
    }

    #[test]
    fn invite_then_join_then_leave() {
        let (kernel, mut registry, owner, member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        registry.invite_to_world(&kernel, world.id, owner, member).unwrap();
        registry.join_world(&kernel, world.id, member).unwrap();
        assert!(registry.get(world.id).unwrap().is_member(member));
        registry.leave_world(world.id, member).unwrap();
        assert!(!registry.get(world.id).unwrap().is_member(member));
    }

    #[test]
    fn owner_cannot_leave() {
        let (kernel, mut registry, owner, _member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        let err = registry.leave_world(world.id, owner).unwrap_err();
        assert_eq!(err, WorldError::OwnerCannotLeave);
    }

    #[test]
    fn archived_world_rejects_writes() {
        let (kernel, mut registry, owner, member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        registry.invite_to_world(&kernel, world.id, owner, member).unwrap();
        registry.join_world(&kernel, world.id, member).unwrap();
        registry.archive_world(world.id, owner).unwrap();
        let err = registry
            .world_write(&kernel, world.id, member, "grade", Value::Int(1))
            .unwrap_err();
        assert_eq!(err, WorldError::WorldArchived);
    }

    #[test]
    fn world_write_then_read_round_trips() {
        let (kernel, mut registry, owner, member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        registry.invite_to_world(&kernel, world.id, owner, member).unwrap();
        registry.join_world(&kernel, world.id, member).unwrap();
        registry
            .world_write(&kernel, world.id, member, "grade", Value::Int(95))
            .unwrap();
        let read = registry
            .world_read(&kernel, world.id, owner, member, "grade")
            .unwrap();
        assert_eq!(read, Value::Int(95));
    }

    #[test]
    fn audit_lists_owner_and_members() {
        let (kernel, mut registry, owner, member) = setup();
        let world = registry.create_world(&kernel, owner, "classroom").unwrap();
        registry.invite_to_world(&kernel, world.id, owner, member).unwrap();
        registry.join_world(&kernel, world.id, member).unwrap();
        let members = registry.audit(world.id).unwrap();
        assert_eq!(members.len(), 2);
    }
}
