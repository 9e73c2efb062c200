//! Linkcast - link social accounts and publish to them
//!
//! This library provides account linking through provider authorization
//! flows (LinkedIn, Discord) and concurrent publishing of a post to every
//! linked account it targets.

pub mod config;
pub mod correlation;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod http;
pub mod linking;
pub mod logging;
pub mod providers;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use correlation::{AuthorizationCorrelator, LinkIntent};
pub use db::Database;
pub use dispatcher::PublishingDispatcher;
pub use error::{LinkcastError, Result};
pub use linking::{CallbackHandler, LinkResult, ProviderResponse};
pub use providers::{ProviderAdapter, ProviderRegistry};
pub use service::LinkcastService;
pub use store::{AccountLinkStore, MemoryStore, PostStore};
pub use types::{AccountStatus, Post, PostStatus, PublishOutcome, SocialAccount};
