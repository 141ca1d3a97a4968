//! Error types for the world layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("speaker not authenticated")]
    SpeakerNotAuthenticated,
    #[error("world not found")]
    WorldNotFound,
    #[error("caller is not the world owner")]
    NotOwner,
    #[error("speaker was not invited")]
    NotInvited,
    #[error("speaker is not a member")]
    NotMember,
    #[error("speaker is already a member")]
    AlreadyMember,
    #[error("world is archived")]
    WorldArchived,
    #[error("owner cannot leave their own world")]
    OwnerCannotLeave,
}

pub type Result<T> = std::result::Result<T, WorldError>;
