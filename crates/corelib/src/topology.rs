//! Link-state data model.
//!
//! A node's link state is the set of outgoing channels it currently has. It
//! is published through gossip as a JSON array of `{id, node}` records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One established outgoing channel.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Link {
    /// Channel id, unique per sending node.
    #[serde(rename = "id")]
    pub link_id: String,
    /// Canonical id string of the remote node.
    #[serde(rename = "node")]
    pub remote_node: String,
}

impl Link {
    pub fn new(link_id: impl Into<String>, remote_node: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            remote_node: remote_node.into(),
        }
    }
}

/// Immutable set of links of one node at one point in time.
#[derive(Clone, PartialEq, Eq, Default, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkState {
    links: BTreeSet<Link>,
}

impl LinkState {
    /// The link state of a node without channels.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(links: impl IntoIterator<Item = Link>) -> Self {
        Self {
            links: links.into_iter().collect(),
        }
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains_link_id(&self, link_id: &str) -> bool {
        self.links.iter().any(|link| link.link_id == link_id)
    }

    /// Returns a copy with `link` added.
    pub fn with_link(&self, link: Link) -> Self {
        let mut links = self.links.clone();
        links.insert(link);
        Self { links }
    }

    /// Returns a copy without the link with `link_id`.
    pub fn without_link(&self, link_id: &str) -> Self {
        Self {
            links: self
                .links
                .iter()
                .filter(|link| link.link_id != link_id)
                .cloned()
                .collect(),
        }
    }
}

impl FromIterator<Link> for LinkState {
    fn from_iter<I: IntoIterator<Item = Link>>(iter: I) -> Self {
        Self::new(iter)
    }
}
