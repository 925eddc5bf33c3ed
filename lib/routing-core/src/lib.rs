//! Core service routing functionality
//!
//! This library provides:
//! - Metadata tag codec for the registry's flat tag convention
//! - Hostname normalization shared by every hostname-keyed structure
//! - Service cache: the in-process read model of healthy instances
//! - Configuration, logging and HTTP serving helpers used by the binaries

pub mod cache;
pub mod config;
pub mod error;
pub mod hostname;
pub mod logging;
pub mod server;
pub mod tags;

pub use cache::ServiceCache;
pub use error::{CoreError, Result};
pub use hostname::normalize_hostname;
pub use tags::{decode_tags, encode_tags, InstanceMetadata};
