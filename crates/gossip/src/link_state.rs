//! Topology knowledge built from link-state announcements.
//!
//! Every node publishes its outgoing channels under [`LSA_PROPERTY_KEY`].
//! Only relay nodes advertise their real links; other nodes publish an empty
//! link state so that a stale value from an earlier relay run is replaced
//! rather than left behind in other nodes' snapshots.

use std::sync::Arc;

use corelib::topology::{Link, LinkState};
use parking_lot::Mutex;

use crate::error::{GossipError, Result};
use crate::knowledge::{GossipContext, KnowledgeGossip, KnowledgeKind, KnowledgeListener, KnowledgeSnapshot};

/// Property key of link-state announcements.
pub const LSA_PROPERTY_KEY: &str = "lsa";

/// Receives lifecycle events of outgoing message channels.
pub trait MessageChannelLifecycleListener: Send + Sync {
    fn on_outgoing_channel_established(&self, channel_id: &str, remote_node: &str);

    fn on_outgoing_channel_terminated(&self, channel_id: &str, remote_node: &str);
}

/// [`KnowledgeKind`] for link-state announcements.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkStateKind;

impl KnowledgeKind for LinkStateKind {
    type Value = LinkState;
    type Fact = LinkState;

    fn name(&self) -> &'static str {
        "topology"
    }

    fn owns_key(&self, key: &str) -> bool {
        key == LSA_PROPERTY_KEY
    }

    fn decode(&self, key: &str, payload: &str) -> Result<LinkState> {
        serde_json::from_str(payload).map_err(|e| GossipError::malformed(key, e))
    }

    fn encode(&self, _key: &str, fact: &LinkState) -> Result<String> {
        serde_json::to_string(fact).map_err(|e| GossipError::Serialization(e.to_string()))
    }

    fn fold(&self, _current: Option<&LinkState>, _key: &str, fact: Option<LinkState>) -> Option<LinkState> {
        fact
    }
}

/// The topology knowledge of the local node.
pub struct LinkStateKnowledge {
    gossip: Arc<KnowledgeGossip<LinkStateKind>>,
    relay: bool,
    links: Mutex<LinkState>,
}

impl LinkStateKnowledge {
    /// Registers with the distribution service and publishes the initial,
    /// empty link state.
    pub fn start(context: &GossipContext, relay: bool) -> Result<Arc<Self>> {
        let gossip = KnowledgeGossip::start(LinkStateKind, context);
        let knowledge = Arc::new(Self {
            gossip,
            relay,
            links: Mutex::new(LinkState::empty()),
        });
        knowledge.publish(&LinkState::empty())?;
        tracing::info!(node = %context.local_node, relay, "topology knowledge started");
        Ok(knowledge)
    }

    pub fn is_relay(&self) -> bool {
        self.relay
    }

    pub fn current_knowledge(&self) -> KnowledgeSnapshot<LinkState> {
        self.gossip.current_knowledge()
    }

    /// The local node's real link state, regardless of relay mode.
    pub fn local_link_state(&self) -> LinkState {
        self.links.lock().clone()
    }

    pub fn add_listener(&self, listener: Arc<dyn KnowledgeListener<LinkState>>) {
        self.gossip.add_listener(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn KnowledgeListener<LinkState>>) -> bool {
        self.gossip.remove_listener(listener)
    }

    pub fn gossip(&self) -> &Arc<KnowledgeGossip<LinkStateKind>> {
        &self.gossip
    }

    fn publish(&self, links: &LinkState) -> Result<()> {
        let advertised = if self.relay { links.clone() } else { LinkState::empty() };
        self.gossip.publish_local(LSA_PROPERTY_KEY, advertised)?;
        self.gossip.announce_local_state(links.clone());
        Ok(())
    }

    fn update_links(&self, change: impl FnOnce(&LinkState) -> Option<LinkState>) {
        let mut links = self.links.lock();
        let next = match change(&links) {
            Some(next) => next,
            None => return,
        };
        *links = next.clone();
        if let Err(err) = self.publish(&next) {
            tracing::error!(error = %err, "failed to publish local link state");
        }
    }
}

impl MessageChannelLifecycleListener for LinkStateKnowledge {
    fn on_outgoing_channel_established(&self, channel_id: &str, remote_node: &str) {
        self.update_links(|links| {
            if links.contains_link_id(channel_id) {
                tracing::warn!(
                    channel = channel_id,
                    remote = remote_node,
                    "channel already registered, ignoring duplicate"
                );
                return None;
            }
            tracing::debug!(channel = channel_id, remote = remote_node, "outgoing channel established");
            Some(links.with_link(Link::new(channel_id, remote_node)))
        });
    }

    fn on_outgoing_channel_terminated(&self, channel_id: &str, remote_node: &str) {
        self.update_links(|links| {
            if !links.contains_link_id(channel_id) {
                tracing::debug!(
                    channel = channel_id,
                    remote = remote_node,
                    "terminated channel was not registered"
                );
                return None;
            }
            tracing::debug!(channel = channel_id, remote = remote_node, "outgoing channel terminated");
            Some(links.without_link(channel_id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_garbage() {
        let kind = LinkStateKind;
        assert!(kind.decode(LSA_PROPERTY_KEY, "not json").is_err());
        assert!(kind.decode(LSA_PROPERTY_KEY, "[]").unwrap().is_empty());
    }

    #[test]
    fn test_owns_only_lsa_key() {
        assert!(LinkStateKind.owns_key("lsa"));
        assert!(!LinkStateKind.owns_key("lsa2"));
        assert!(!LinkStateKind.owns_key("componentInstallation/x"));
    }
}
