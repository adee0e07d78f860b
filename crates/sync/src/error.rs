//! Error types for reconciliation and local edits.

use thiserror::Error;
use trellis_proto::{ConnectionId, LockHolder, NodeId};

/// Failure while applying an authoritative event to the mirror.
///
/// These never escape a session: [`Session::apply`] logs them and records them
/// in its report, and the mirror stays as it was before the failing step.
///
/// [`Session::apply`]: crate::session::Session::apply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
	/// A connection endpoint names a node that is not in the mirror.
	#[error("connection endpoint references unknown node {0}")]
	UnknownNode(NodeId),
	/// A connection endpoint names a socket the node does not expose.
	#[error("node {node} has no {direction} socket '{socket}'")]
	UnknownSocket {
		/// Node the endpoint points at.
		node: NodeId,
		/// Missing socket name.
		socket: String,
		/// `"input"` or `"output"`.
		direction: &'static str,
	},
	/// Two connections in one snapshot carry the same server id.
	#[error("duplicate connection id {0} in snapshot")]
	DuplicateConnection(ConnectionId),
}

/// Reason a local edit was refused before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
	/// Another collaborator holds the advisory lock on the node.
	#[error("node {node} is being edited by {}", holder.name)]
	Locked {
		/// Locked node.
		node: NodeId,
		/// Current holder.
		holder: LockHolder,
	},
	/// The node is not in the mirror.
	#[error("node {0} does not exist")]
	UnknownNode(NodeId),
	/// The connection is not in the mirror, or has no server id yet.
	#[error("connection {0} does not exist")]
	UnknownConnection(ConnectionId),
	/// The edit would create a connection the mirror cannot hold.
	#[error(transparent)]
	Invalid(#[from] SyncError),
}
