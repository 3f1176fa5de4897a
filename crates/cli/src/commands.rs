//! Subcommands.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Subcommand;
use corelib::config::NodeConfig;
use corelib::naming::NameRegistry;
use corelib::node::{InstanceId, InstanceSessionId, NodeIdentifier, NodeIdentity};
use gossip::graph::NetworkGraph;
use gossip::knowledge::GossipContext;
use gossip::link_state::{LinkStateKnowledge, MessageChannelLifecycleListener};
use gossip::memory::PropertyHub;
use gossip::naming::DisplayNamePropertyBridge;
use rpc::ServiceCallResultFactory;

/// Largest mesh the demo command starts.
pub const MAX_DEMO_NODES: usize = 64;

/// Text printed by a command.
pub type CommandResult = anyhow::Result<String>;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a fresh instance id and a session id for it.
    GenerateId,

    /// Detect the kind of a node id and print its parts.
    Parse {
        /// Canonical id string.
        id: String,
    },

    /// Explain the error information of a failed service call.
    DecodeErrorInfo {
        /// Raw, escaped error information.
        raw: String,
    },

    /// Run in-memory nodes connected in a chain and print their topology.
    ///
    /// Node names are `<display_name>-<n>` when the configuration sets a
    /// display name, `node-<n>` otherwise.
    Demo {
        #[arg(long, default_value_t = 3)]
        nodes: usize,

        /// Advertise topology even if the configuration disables relaying.
        #[arg(long)]
        relay: bool,
    },
}

impl Command {
    pub fn execute(&self, config: &NodeConfig) -> CommandResult {
        match self {
            Command::GenerateId => Ok(generate_id()),
            Command::Parse { id } => parse(id),
            Command::DecodeErrorInfo { raw } => Ok(decode_error_info(raw)),
            Command::Demo { nodes, relay } => {
                let mut config = config.clone();
                config.relay |= *relay;
                demo(*nodes, &config)
            }
        }
    }
}

fn generate_id() -> String {
    let instance = InstanceId::generate();
    let session = instance.derive_session();
    format!("instance id: {}\nsession id:  {}", instance, session)
}

fn parse(id: &str) -> CommandResult {
    let id = NodeIdentity::parse(id)?;
    let mut out = String::new();
    writeln!(out, "kind:          {}", id.kind())?;
    writeln!(out, "instance part: {}", id.instance_part())?;
    if let Some(logical) = id.logical_part() {
        writeln!(out, "logical part:  {}", logical)?;
    }
    if let Some(session) = id.session_part() {
        writeln!(out, "session part:  {}", session)?;
    }
    Ok(out.trim_end().to_string())
}

fn decode_error_info(raw: &str) -> String {
    ServiceCallResultFactory::new(Arc::new(NameRegistry::new())).describe_error_info(raw)
}

struct DemoNode {
    session: InstanceSessionId,
    topology: Arc<LinkStateKnowledge>,
}

fn demo(count: usize, config: &NodeConfig) -> CommandResult {
    if count == 0 || count > MAX_DEMO_NODES {
        bail!("--nodes must be between 1 and {}", MAX_DEMO_NODES);
    }
    let hub = PropertyHub::new();
    let registry = Arc::new(NameRegistry::new());
    let base_name = config.display_name.as_deref().unwrap_or("node");

    let mut nodes = Vec::with_capacity(count);
    for index in 0..count {
        let session = registry.generate_instance_session_id(&InstanceId::generate());
        let endpoint = hub.attach(session.clone());
        let context = GossipContext::new(session.clone(), endpoint.clone(), config)
            .context("starting callback workers")?;
        let topology = LinkStateKnowledge::start(&context, config.relay)?;
        let names = DisplayNamePropertyBridge::start(Arc::clone(&registry), session.clone(), endpoint);
        names.set_local_display_name(&format!("{}-{}", base_name, index + 1));
        nodes.push(DemoNode { session, topology });
    }

    for (index, pair) in nodes.windows(2).enumerate() {
        pair[0]
            .topology
            .on_outgoing_channel_established(&format!("c-{}", index + 1), &pair[1].session.to_string());
    }
    tracing::info!(nodes = count, relay = config.relay, "demo mesh connected");

    let mut out = String::new();
    for node in &nodes {
        let knowledge = node.topology.current_knowledge();
        let graph = NetworkGraph::from_snapshot(&node.session, &knowledge);
        let mut reachable: Vec<String> = graph
            .reachable_from_local()
            .iter()
            .filter(|peer| **peer != node.session)
            .map(|peer| registry.get_associated_display_name(peer))
            .collect();
        reachable.sort();
        writeln!(out, "{}", registry.describe(&node.session))?;
        writeln!(
            out,
            "  knows {} nodes and {} links; reaches [{}]",
            graph.node_count(),
            graph.link_count(),
            reachable.join(", ")
        )?;
    }
    Ok(out.trim_end().to_string())
}
