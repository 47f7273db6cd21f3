//! Types for parsed Valkey cluster information.
//!
//! These types represent the parsed output of `CLUSTER NODES`, which is how
//! the reconciler observes the current slot ownership of the cluster.

use thiserror::Error;

use crate::slots::{SlotOwnership, SlotRange, TOTAL_SLOTS};

/// Errors that can occur when parsing cluster data.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid cluster nodes format: {0}")]
    InvalidClusterNodes(String),
    #[error("Invalid slot range: {0}")]
    InvalidSlotRange(String),
}

/// Flags indicating the state of a cluster node.
#[derive(Debug, Clone, Default)]
pub struct NodeFlags {
    /// This is the local node (myself).
    pub myself: bool,
    /// Node is a master.
    pub master: bool,
    /// Node is a replica.
    pub slave: bool,
    /// Node is in PFAIL state (potentially failed).
    pub pfail: bool,
    /// Node is in FAIL state.
    pub fail: bool,
    /// Node is in handshake state.
    pub handshake: bool,
    /// Node has no address yet.
    pub noaddr: bool,
}

impl NodeFlags {
    /// Parse flags from the CLUSTER NODES output.
    pub fn parse(flags_str: &str) -> Self {
        let mut flags = NodeFlags::default();
        for flag in flags_str.split(',') {
            match flag.trim() {
                "myself" => flags.myself = true,
                "master" => flags.master = true,
                "slave" => flags.slave = true,
                "pfail" => flags.pfail = true,
                "fail" => flags.fail = true,
                "handshake" => flags.handshake = true,
                "noaddr" => flags.noaddr = true,
                _ => {}
            }
        }
        flags
    }
}

/// Parse a slot token from a `CLUSTER NODES` line (e.g. "0-5460" or "5461").
///
/// Importing/migrating markers such as `[42->-<node-id>]` are not ownership
/// and are rejected.
pub fn parse_slot_token(s: &str) -> Result<SlotRange, ParseError> {
    let s = s.trim();

    if s.starts_with('[') {
        return Err(ParseError::InvalidSlotRange(format!(
            "Slot in migration: {}",
            s
        )));
    }

    let parse_slot = |raw: &str| -> Result<u16, ParseError> {
        raw.parse::<u16>()
            .ok()
            .filter(|slot| *slot < TOTAL_SLOTS)
            .ok_or_else(|| ParseError::InvalidSlotRange(format!("Invalid slot: {}", raw)))
    };

    let (start, end) = match s.split_once('-') {
        Some((start, end)) => (parse_slot(start)?, parse_slot(end)?),
        None => {
            let slot = parse_slot(s)?;
            (slot, slot)
        }
    };
    if start > end {
        return Err(ParseError::InvalidSlotRange(format!(
            "Start after end: {}",
            s
        )));
    }
    Ok(SlotRange { start, end })
}

/// A cluster node as reported by `CLUSTER NODES`.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// Unique node ID (40 hex characters).
    pub node_id: String,
    /// IP address and client port.
    pub address: String,
    /// Node flags.
    pub flags: NodeFlags,
    /// Master node ID if this is a replica, None otherwise.
    pub master_id: Option<String>,
    /// Link state ("connected" or "disconnected").
    pub link_state: String,
    /// Slot ranges owned by this node (masters only).
    pub slots: Vec<SlotRange>,
}

impl ClusterNode {
    /// Check if this is a master node.
    pub fn is_master(&self) -> bool {
        self.flags.master
    }

    /// Check if this is the local node.
    pub fn is_myself(&self) -> bool {
        self.flags.myself
    }

    /// Get total number of slots owned by this node.
    pub fn slot_count(&self) -> u32 {
        self.slots.iter().map(|r| u32::from(r.count())).sum()
    }

    /// Parse a single line from `CLUSTER NODES` output.
    ///
    /// Format: `<id> <ip:port@cport> <flags> <master> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ...`
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [node_id, address, flags, master, _ping, _pong, _epoch, link_state, slots @ ..] =
            parts.as_slice()
        else {
            return Err(ParseError::InvalidClusterNodes(format!(
                "Not enough fields in line: {}",
                line
            )));
        };

        // Drop the cluster bus part: ip:port@cport[,hostname]
        let address = address.split('@').next().unwrap_or(address).to_string();

        let master_id = if *master == "-" {
            None
        } else {
            Some((*master).to_string())
        };

        let slots: Vec<SlotRange> = slots
            .iter()
            .filter_map(|s| parse_slot_token(s).ok())
            .collect();

        Ok(ClusterNode {
            node_id: (*node_id).to_string(),
            address,
            flags: NodeFlags::parse(flags),
            master_id,
            link_state: (*link_state).to_string(),
            slots,
        })
    }
}

/// Parsed output of `CLUSTER NODES` command.
#[derive(Debug, Clone)]
pub struct ParsedClusterNodes {
    /// All nodes in the cluster.
    pub nodes: Vec<ClusterNode>,
}

impl ParsedClusterNodes {
    /// Parse the output of `CLUSTER NODES` command.
    pub fn parse(output: &str) -> Result<Self, ParseError> {
        let nodes: Vec<ClusterNode> = output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(ClusterNode::parse_line)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ParsedClusterNodes { nodes })
    }

    /// Get all master nodes.
    pub fn masters(&self) -> Vec<&ClusterNode> {
        self.nodes.iter().filter(|n| n.is_master()).collect()
    }

    /// Get the local node (marked with "myself" flag).
    pub fn myself(&self) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.is_myself())
    }

    /// Flatten into observed slot ownership, ordered by first slot.
    pub fn slot_ownership(&self) -> Vec<SlotOwnership> {
        let mut ownership: Vec<SlotOwnership> = self
            .masters()
            .into_iter()
            .flat_map(|node| {
                node.slots
                    .iter()
                    .map(|range| SlotOwnership::new(*range, node.node_id.clone()))
            })
            .collect();
        ownership.sort_by_key(|o| o.range.start);
        ownership
    }
}
