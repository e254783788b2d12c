//! `clanmanager-directory`: the clan/member system of record.
//!
//! The reverification scheduler only talks to the [`PolicyStore`] and
//! [`MemberDirectory`] traits; [`SqliteDirectory`] is the SQLite
//! implementation used by the daemon and the tests.

pub mod db;
pub mod error;
pub mod records;
pub mod sqlite;
pub mod store;

pub use error::{DirectoryError, Result};
pub use sqlite::SqliteDirectory;
pub use store::{MemberDirectory, PolicyStore};
