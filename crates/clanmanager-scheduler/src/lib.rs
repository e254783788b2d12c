//! `clanmanager-scheduler`: reverification expiry for clan members.
//!
//! # Overview
//!
//! A clan with reverification enabled expects every member to verify again
//! within `interval_days` of their last verification. The
//! [`ScheduleEngine`] arms one tokio timer per member for
//! `verified_at + interval_days`; when it fires, the policy is checked again
//! and the [`ActionExecutor`] runs (by default: direct-message the member,
//! then remove them from the clan).
//!
//! Schedules live only in memory. [`ReverificationManager::start`] rebuilds
//! them from the persisted policies and verification timestamps, so a
//! restart loses nothing; schedules whose time passed while the process was
//! down fire immediately.
//!
//! | Event                            | Call                                   |
//! |----------------------------------|----------------------------------------|
//! | process start                    | [`ReverificationManager::start`]       |
//! | member joins / verification renewed | [`ReverificationManager::schedule_member`], [`ReverificationManager::reverify`] |
//! | member leaves                    | [`ReverificationManager::cancel_member`] |
//! | clan enables / changes interval  | [`ReverificationManager::enable_for_group`], [`ReverificationManager::set_interval`] |
//! | clan disables                    | [`ReverificationManager::disable_for_group`] |

pub mod action;
pub mod engine;
pub mod error;
pub mod manager;
pub mod notify;
pub mod schedule;

pub use action::{ActionExecutor, RemoveMemberAction};
pub use engine::ScheduleEngine;
pub use error::{NotifyError, Result, SchedulerError};
pub use manager::{BulkReport, ReverificationManager};
pub use notify::{build_notifier, LogNotifier, Notifier, WebhookNotifier};
