use bitflags::bitflags;

pub type EntityId = u32;
pub type ClientId = u32;

bitflags! {
    /// Which roles the local process plays for an entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EntityRoles: u8 {
        /// Samples input and predicts locally.
        const OWNER = 1 << 0;
        /// Runs the authoritative simulation.
        const AUTHORITY = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub id: EntityId,
    pub roles: EntityRoles,
}

impl Entity {
    pub fn new(id: EntityId, roles: EntityRoles) -> Self {
        Self { id, roles }
    }

    pub fn owned(id: EntityId) -> Self {
        Self::new(id, EntityRoles::OWNER)
    }

    pub fn authoritative(id: EntityId) -> Self {
        Self::new(id, EntityRoles::AUTHORITY)
    }

    pub fn is_owner(&self) -> bool {
        self.roles.contains(EntityRoles::OWNER)
    }

    pub fn is_authority(&self) -> bool {
        self.roles.contains(EntityRoles::AUTHORITY)
    }

    pub fn revoke_ownership(&mut self) {
        self.roles.remove(EntityRoles::OWNER);
    }
}
