use clanmanager_core::{ClanId, MemberId};
use clanmanager_directory::DirectoryError;
use thiserror::Error;

/// Errors surfaced by the reverification scheduler.
///
/// A disabled policy is deliberately not represented here: every operation
/// treats it as a silent no-op.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The member does not exist in the directory.
    #[error("Clan member not found: {0}")]
    MemberNotFound(MemberId),

    /// The clan does not exist, so no policy can be stored for it.
    #[error("Clan not found: {0}")]
    ClanNotFound(ClanId),

    /// The directory could not be reached or returned a storage error.
    #[error("Member directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

impl From<DirectoryError> for SchedulerError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::MemberNotFound(id) => SchedulerError::MemberNotFound(id),
            DirectoryError::ClanNotFound(id) => SchedulerError::ClanNotFound(id),
            DirectoryError::Database(e) => SchedulerError::DirectoryUnavailable(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors from delivering an expiry notice. Never fatal to the expiry itself.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Notification rejected with HTTP {status}")]
    Rejected { status: u16 },
}
