//! `clanmanager-core`: ids, records and configuration shared by every
//! clanmanager crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ClanManagerConfig, DatabaseConfig, NotifyConfig, ReverificationConfig};
pub use error::{ClanManagerError, Result};
pub use types::{ClanId, ClanMember, ExpiryPolicy, MemberId, DEFAULT_INTERVAL_DAYS};
