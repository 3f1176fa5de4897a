//! Core library for the node mesh.
//!
//! This crate provides the value types every other crate builds on:
//! - Node identity (instance, session and logical node ids)
//! - Display name resolution over those ids
//! - The link-state data model published through gossip
//! - Node configuration

pub mod config;
pub mod error;
pub mod naming;
pub mod node;
pub mod topology;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use naming::{NameRegistry, DEFAULT_DISPLAY_NAME, OUTDATED_SUFFIX};
pub use node::{
    IdKind, InstanceId, InstanceSessionId, LogicalNodeId, LogicalNodeSessionId, NodeIdentifier,
    NodeIdentity,
};
pub use topology::{Link, LinkState};
