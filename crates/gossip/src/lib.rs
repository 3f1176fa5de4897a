//! Property gossip and the knowledge built from it.
//!
//! This crate provides:
//! - The node property model and the distribution collaborator traits
//! - Ordered asynchronous listener callbacks
//! - A generic knowledge engine with copy-on-write snapshots
//! - Topology (link-state) and capability knowledge
//! - Display names carried as properties
//! - An in-process property hub for tests and local runs

pub mod callback;
pub mod capability;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod link_state;
pub mod memory;
pub mod naming;
pub mod property;

pub use callback::{OrderedCallbackManager, WorkerPool};
pub use capability::{CapabilityDescriptor, CapabilityKnowledge, CAPABILITY_PROPERTY_PREFIX};
pub use error::{GossipError, Result};
pub use graph::NetworkGraph;
pub use knowledge::{
    GossipContext, KnowledgeDelta, KnowledgeGossip, KnowledgeKind, KnowledgeListener, KnowledgeSnapshot,
};
pub use link_state::{LinkStateKnowledge, MessageChannelLifecycleListener, LSA_PROPERTY_KEY};
pub use memory::{HubEndpoint, PropertyHub};
pub use naming::{DisplayNamePropertyBridge, DISPLAY_NAME_PROPERTY_KEY};
pub use property::{NodePropertiesListener, NodeProperty, PropertyDistribution};
