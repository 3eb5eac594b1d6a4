//! Barrier protocol messages
//!
//! Worker processes send group mutations to the console; the console broadcasts
//! `OpenBarrier` to every agent when a group is released. Messages travel as
//! JSON frames so that identities are compared by value on the far side.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::BarrierResult;
use crate::identity::{BarrierIdentity, WorkerIdentity};

/// A barrier protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BarrierMessage {
    /// Add one barrier to the named group
    AddBarrier {
        /// Group name
        name: String,
    },

    /// Remove barriers from the named group
    RemoveBarriers {
        /// Group name
        name: String,
        /// Number of barriers to remove
        count: u64,
    },

    /// Register a waiter with the named group
    AddWaiter {
        /// Group name
        name: String,
        /// Waiter identity
        identity: BarrierIdentity,
    },

    /// Cancel a waiter
    CancelWaiter {
        /// Group name
        name: String,
        /// Waiter identity
        identity: BarrierIdentity,
    },

    /// The named group was released; these waiters may proceed
    OpenBarrier {
        /// Group name
        name: String,
        /// Released waiters
        waiters: HashSet<BarrierIdentity>,
    },
}

impl BarrierMessage {
    /// Name of the group the message refers to
    pub fn group_name(&self) -> &str {
        match self {
            BarrierMessage::AddBarrier { name }
            | BarrierMessage::RemoveBarriers { name, .. }
            | BarrierMessage::AddWaiter { name, .. }
            | BarrierMessage::CancelWaiter { name, .. }
            | BarrierMessage::OpenBarrier { name, .. } => name,
        }
    }

    /// Short name of the message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            BarrierMessage::AddBarrier { .. } => "add_barrier",
            BarrierMessage::RemoveBarriers { .. } => "remove_barriers",
            BarrierMessage::AddWaiter { .. } => "add_waiter",
            BarrierMessage::CancelWaiter { .. } => "cancel_waiter",
            BarrierMessage::OpenBarrier { .. } => "open_barrier",
        }
    }

    /// Encode as a JSON frame
    pub fn encode(&self) -> BarrierResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON frame
    pub fn decode(frame: &str) -> BarrierResult<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}

/// A message stamped with the worker process that sent it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedMessage {
    /// The sending worker
    pub address: WorkerIdentity,
    /// The message
    pub message: BarrierMessage,
}

impl AddressedMessage {
    /// Encode as a JSON frame
    pub fn encode(&self) -> BarrierResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a JSON frame
    pub fn decode(frame: &str) -> BarrierResult<Self> {
        Ok(serde_json::from_str(frame)?)
    }
}
