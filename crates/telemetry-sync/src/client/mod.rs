//! Requesting side: the pending-request table and live subscriptions.
//!
//! # Submodules
//!
//! - [`cleanup_timer`] -- Deadline-checked timer that closes idle subscriptions.
//! - [`deferred`] -- Cloneable one-shot value shared by coalesced callers.
//! - [`manager`] -- [`SyncManagerClient`]: the per-connection table.
//! - [`stream`] -- [`SubscriptionStream`]: what subscribers consume.
//! - [`subscription`] -- One live, renewable subscription.
//!
//! [`SyncManagerClient`]: manager::SyncManagerClient
//! [`SubscriptionStream`]: stream::SubscriptionStream

pub mod cleanup_timer;
pub mod deferred;
pub mod manager;
pub mod stream;
pub mod subscription;
