//! Inbound and outbound event enums.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
	ConnectionId, ConnectionRecord, DebugStatus, Endpoint, LockHolder, NodeId, NodeRecord, NodeType,
};

/// Event sent from an editor session to the flow server.
///
/// Every event is fire-and-forget: the server validates, persists, and
/// broadcasts the outcome back to all sessions as a [`ServerEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
	/// Final position of a drag, rate-limited per node.
	NodeMoved {
		/// Moved node.
		id: NodeId,
		/// New horizontal coordinate.
		x: f64,
		/// New vertical coordinate.
		y: f64,
	},
	/// Soft-delete a node and its connections.
	DeleteNode {
		/// Node to delete.
		id: NodeId,
	},
	/// Server-side copy of a node next to the original.
	DuplicateNode {
		/// Node to copy.
		id: NodeId,
	},
	/// Create a new node; the server assigns the id.
	CreateNode {
		/// Kind of the new node.
		node_type: NodeType,
		/// Initial payload.
		data: Value,
		/// Horizontal coordinate.
		x: f64,
		/// Vertical coordinate.
		y: f64,
	},
	/// Replace a node payload.
	UpdateNode {
		/// Node to update.
		id: NodeId,
		/// New payload.
		data: Value,
	},
	/// Bring back a soft-deleted node with the connections it had.
	RestoreNode {
		/// Node as it was before deletion.
		node: NodeRecord,
		/// Connections touching the node before deletion.
		connections: Vec<ConnectionRecord>,
	},
	/// Connect two sockets.
	CreateConnection {
		/// Output side.
		source: Endpoint,
		/// Input side.
		target: Endpoint,
		/// Display label.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		label: Option<String>,
		/// Guard expression.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		condition: Option<String>,
	},
	/// Remove a connection.
	DeleteConnection {
		/// Connection to remove.
		id: ConnectionId,
	},
	/// Change connection metadata.
	UpdateConnection {
		/// Connection to update.
		id: ConnectionId,
		/// New label.
		label: Option<String>,
		/// New guard expression.
		condition: Option<String>,
	},
	/// Change a document-level metadata field.
	UpdateFlowMeta {
		/// Field name.
		field: String,
		/// New value.
		value: Value,
	},
	/// Announce that the local user started editing a node.
	LockNode {
		/// Node being edited.
		id: NodeId,
	},
	/// Announce that the local user stopped editing a node.
	UnlockNode {
		/// Node no longer being edited.
		id: NodeId,
	},
	/// Set or clear a debugger breakpoint.
	SetBreakpoint {
		/// Node carrying the breakpoint.
		id: NodeId,
		/// Whether the breakpoint is active.
		enabled: bool,
	},
}

impl ClientEvent {
	/// Returns the wire tag of the event.
	pub const fn tag(&self) -> &'static str {
		match self {
			Self::NodeMoved { .. } => "node_moved",
			Self::DeleteNode { .. } => "delete_node",
			Self::DuplicateNode { .. } => "duplicate_node",
			Self::CreateNode { .. } => "create_node",
			Self::UpdateNode { .. } => "update_node",
			Self::RestoreNode { .. } => "restore_node",
			Self::CreateConnection { .. } => "create_connection",
			Self::DeleteConnection { .. } => "delete_connection",
			Self::UpdateConnection { .. } => "update_connection",
			Self::UpdateFlowMeta { .. } => "update_flow_meta",
			Self::LockNode { .. } => "lock_node",
			Self::UnlockNode { .. } => "unlock_node",
			Self::SetBreakpoint { .. } => "set_breakpoint",
		}
	}

	/// Returns the node the event targets, if it targets exactly one.
	pub fn target_node(&self) -> Option<NodeId> {
		match self {
			Self::NodeMoved { id, .. }
			| Self::DeleteNode { id }
			| Self::DuplicateNode { id }
			| Self::UpdateNode { id, .. }
			| Self::LockNode { id }
			| Self::UnlockNode { id }
			| Self::SetBreakpoint { id, .. } => Some(*id),
			Self::RestoreNode { node, .. } => Some(node.id),
			Self::CreateNode { .. }
			| Self::CreateConnection { .. }
			| Self::DeleteConnection { .. }
			| Self::UpdateConnection { .. }
			| Self::UpdateFlowMeta { .. } => None,
		}
	}
}

/// Event broadcast by the flow server to every session of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
	/// Full document replacement; ids and positions may be renumbered.
	FlowUpdated {
		/// Every live node.
		#[serde(default)]
		nodes: Vec<NodeRecord>,
		/// Every live connection.
		#[serde(default)]
		connections: Vec<ConnectionRecord>,
	},
	/// A node was created.
	NodeAdded {
		/// The new node.
		node: NodeRecord,
	},
	/// A node was soft-deleted along with its connections.
	NodeRemoved {
		/// Removed node.
		id: NodeId,
	},
	/// A soft-deleted node came back.
	NodeRestored {
		/// Restored node.
		node: NodeRecord,
		/// Restored connections.
		#[serde(default)]
		connections: Vec<ConnectionRecord>,
	},
	/// A node payload changed.
	NodeUpdated {
		/// Updated node.
		id: NodeId,
		/// New payload.
		data: Value,
	},
	/// A node was moved.
	NodeMoved {
		/// Moved node.
		id: NodeId,
		/// New horizontal coordinate.
		x: f64,
		/// New vertical coordinate.
		y: f64,
	},
	/// History-only record of a payload change; does not mutate the graph.
	NodeDataChanged {
		/// Changed node.
		id: NodeId,
		/// Payload before the change.
		prev_data: Value,
		/// Payload after the change.
		new_data: Value,
	},
	/// A connection was created.
	ConnectionAdded {
		/// The new connection, carrying its assigned id.
		connection: ConnectionRecord,
	},
	/// A connection was removed.
	ConnectionRemoved {
		/// Removed connection.
		id: ConnectionId,
	},
	/// Connection metadata changed.
	ConnectionUpdated {
		/// Updated connection.
		id: ConnectionId,
		/// New label.
		#[serde(default)]
		label: Option<String>,
		/// New guard expression.
		#[serde(default)]
		condition: Option<String>,
	},
	/// History-only record of a document metadata change.
	FlowMetaChanged {
		/// Field name.
		field: String,
		/// Value before the change.
		prev: Value,
		/// Value after the change.
		new: Value,
	},
	/// Full snapshot of advisory locks.
	LocksUpdated {
		/// Node to holder mapping; absent nodes are unlocked.
		#[serde(default)]
		locks: BTreeMap<NodeId, LockHolder>,
	},
	/// One debugger step.
	DebugHighlightNode {
		/// New current node.
		node_id: NodeId,
		/// Status of the current node.
		status: DebugStatus,
		/// Every node visited so far, in order.
		#[serde(default)]
		execution_path: Vec<NodeId>,
	},
	/// Debug session ended; drop all highlights.
	DebugClearHighlights,
}

impl ServerEvent {
	/// Returns the wire tag of the event.
	pub const fn tag(&self) -> &'static str {
		match self {
			Self::FlowUpdated { .. } => "flow_updated",
			Self::NodeAdded { .. } => "node_added",
			Self::NodeRemoved { .. } => "node_removed",
			Self::NodeRestored { .. } => "node_restored",
			Self::NodeUpdated { .. } => "node_updated",
			Self::NodeMoved { .. } => "node_moved",
			Self::NodeDataChanged { .. } => "node_data_changed",
			Self::ConnectionAdded { .. } => "connection_added",
			Self::ConnectionRemoved { .. } => "connection_removed",
			Self::ConnectionUpdated { .. } => "connection_updated",
			Self::FlowMetaChanged { .. } => "flow_meta_changed",
			Self::LocksUpdated { .. } => "locks_updated",
			Self::DebugHighlightNode { .. } => "debug_highlight_node",
			Self::DebugClearHighlights => "debug_clear_highlights",
		}
	}
}

fn is_false(value: &bool) -> bool {
	!*value
}

/// A server broadcast together with its origin marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
	/// True when the event echoes an event this session sent.
	#[serde(rename = "self", default, skip_serializing_if = "is_false")]
	pub self_originated: bool,
	/// The broadcast event.
	#[serde(flatten)]
	pub event: ServerEvent,
}

impl Inbound {
	/// Wraps an event broadcast on behalf of another session.
	pub fn remote(event: ServerEvent) -> Self {
		Self {
			self_originated: false,
			event,
		}
	}

	/// Wraps an event echoing this session's own mutation.
	pub fn echo(event: ServerEvent) -> Self {
		Self {
			self_originated: true,
			event,
		}
	}
}
