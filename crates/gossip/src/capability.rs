//! Capability knowledge: component installations offered by each node.
//!
//! Each published installation is one property
//! `componentInstallation/<installation id>` whose value is the JSON form of
//! a [`CapabilityDescriptor`]. The descriptor names the node that publishes
//! it; receivers drop descriptors whose node does not belong to the sending
//! instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use corelib::node::{NodeIdentifier, NodeIdentity};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{GossipError, Result};
use crate::knowledge::{GossipContext, KnowledgeGossip, KnowledgeKind, KnowledgeListener, KnowledgeSnapshot};

/// Key prefix of capability properties.
pub const CAPABILITY_PROPERTY_PREFIX: &str = "componentInstallation/";

/// Public description of one installed component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub installation_id: String,
    /// Canonical id of the node offering the installation.
    pub node_id: String,
    pub component_id: String,
    pub version: String,
    pub display_name: String,
}

impl CapabilityDescriptor {
    pub fn property_key(&self) -> String {
        format!("{}{}", CAPABILITY_PROPERTY_PREFIX, self.installation_id)
    }
}

/// Installations of one node, keyed by installation id.
pub type NodeCapabilities = BTreeMap<String, CapabilityDescriptor>;

/// [`KnowledgeKind`] for component installations.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityKind;

impl KnowledgeKind for CapabilityKind {
    type Value = NodeCapabilities;
    type Fact = CapabilityDescriptor;

    fn name(&self) -> &'static str {
        "capabilities"
    }

    fn owns_key(&self, key: &str) -> bool {
        key.starts_with(CAPABILITY_PROPERTY_PREFIX)
    }

    fn decode(&self, key: &str, payload: &str) -> Result<CapabilityDescriptor> {
        let descriptor: CapabilityDescriptor =
            serde_json::from_str(payload).map_err(|e| GossipError::malformed(key, e))?;
        if descriptor.component_id.is_empty() {
            return Err(GossipError::malformed(key, "missing component id"));
        }
        if descriptor.property_key() != key {
            return Err(GossipError::malformed(
                key,
                format!("installation id '{}' does not match the key", descriptor.installation_id),
            ));
        }
        Ok(descriptor)
    }

    fn encode(&self, _key: &str, fact: &CapabilityDescriptor) -> Result<String> {
        serde_json::to_string(fact).map_err(|e| GossipError::Serialization(e.to_string()))
    }

    fn declared_publisher(&self, fact: &CapabilityDescriptor) -> Option<String> {
        Some(fact.node_id.clone())
    }

    fn fold(
        &self,
        current: Option<&NodeCapabilities>,
        key: &str,
        fact: Option<CapabilityDescriptor>,
    ) -> Option<NodeCapabilities> {
        let installation_id = key.strip_prefix(CAPABILITY_PROPERTY_PREFIX)?;
        let mut capabilities = current.cloned().unwrap_or_default();
        match fact {
            Some(descriptor) => {
                capabilities.insert(installation_id.to_string(), descriptor);
            }
            None => {
                capabilities.remove(installation_id);
            }
        }
        if capabilities.is_empty() {
            None
        } else {
            Some(capabilities)
        }
    }
}

#[derive(Default)]
struct LocalInstallations {
    all: Vec<CapabilityDescriptor>,
    published: BTreeMap<String, CapabilityDescriptor>,
}

/// The capability knowledge of the local node.
pub struct CapabilityKnowledge {
    gossip: Arc<KnowledgeGossip<CapabilityKind>>,
    local: Mutex<LocalInstallations>,
}

impl CapabilityKnowledge {
    pub fn start(context: &GossipContext) -> Arc<Self> {
        Arc::new(Self {
            gossip: KnowledgeGossip::start(CapabilityKind, context),
            local: Mutex::new(LocalInstallations::default()),
        })
    }

    /// Replaces the local installations.
    ///
    /// `all` is every installation on this node; `published` the subset
    /// offered to other nodes. New or changed published descriptors are sent,
    /// descriptors no longer published are withdrawn, unchanged ones are left
    /// alone.
    pub fn set_local_installations(
        &self,
        all: Vec<CapabilityDescriptor>,
        published: Vec<CapabilityDescriptor>,
    ) -> Result<()> {
        let local_node = self.gossip.local_node().clone();
        for descriptor in &published {
            let declared = NodeIdentity::parse(&descriptor.node_id)
                .map_err(|e| GossipError::malformed(&descriptor.property_key(), e))?;
            if !declared.is_same_instance_as(&local_node) {
                return Err(GossipError::PublisherMismatch {
                    declared: descriptor.node_id.clone(),
                    sender: local_node.to_string(),
                });
            }
            if descriptor.component_id.is_empty() {
                return Err(GossipError::malformed(&descriptor.property_key(), "missing component id"));
            }
        }

        let mut local = self.local.lock();
        let next: BTreeMap<String, CapabilityDescriptor> = published
            .into_iter()
            .map(|descriptor| (descriptor.installation_id.clone(), descriptor))
            .collect();

        for (installation_id, descriptor) in &next {
            if local.published.get(installation_id) != Some(descriptor) {
                self.gossip.publish_local(&descriptor.property_key(), descriptor.clone())?;
            }
        }
        for (installation_id, descriptor) in &local.published {
            if !next.contains_key(installation_id) {
                self.gossip.retract_local(&descriptor.property_key())?;
            }
        }

        tracing::debug!(
            node = %local_node,
            installations = all.len(),
            published = next.len(),
            "local installations updated"
        );
        local.all = all;
        local.published = next;
        Ok(())
    }

    /// Every local installation, published or not.
    pub fn local_installations(&self) -> Vec<CapabilityDescriptor> {
        self.local.lock().all.clone()
    }

    pub fn published_installations(&self) -> Vec<CapabilityDescriptor> {
        self.local.lock().published.values().cloned().collect()
    }

    pub fn current_knowledge(&self) -> KnowledgeSnapshot<NodeCapabilities> {
        self.gossip.current_knowledge()
    }

    /// Every local installation plus every installation published by
    /// another node, sorted by installation id.
    pub fn all_installations(&self) -> Vec<CapabilityDescriptor> {
        let local_node = self.gossip.local_node().clone();
        let snapshot = self.gossip.current_knowledge();
        let mut all = self.local_installations();
        all.extend(
            snapshot
                .iter()
                .filter(|(node, _)| **node != local_node)
                .flat_map(|(_, capabilities)| capabilities.values().cloned()),
        );
        all.sort_by(|a, b| a.installation_id.cmp(&b.installation_id));
        all
    }

    /// All descriptors offering `component_id`, across nodes.
    pub fn find_component(&self, component_id: &str) -> Vec<CapabilityDescriptor> {
        let snapshot = self.gossip.current_knowledge();
        let mut found: Vec<_> = snapshot
            .iter()
            .flat_map(|(_, capabilities)| capabilities.values())
            .filter(|descriptor| descriptor.component_id == component_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.installation_id.cmp(&b.installation_id));
        found
    }

    pub fn add_listener(&self, listener: Arc<dyn KnowledgeListener<NodeCapabilities>>) {
        self.gossip.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn KnowledgeListener<NodeCapabilities>>) -> bool {
        self.gossip.remove_listener(listener)
    }

    pub fn gossip(&self) -> &Arc<KnowledgeGossip<CapabilityKind>> {
        &self.gossip
    }
}
