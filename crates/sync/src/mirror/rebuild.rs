//! Structural rebuild of a node whose socket layout changed.
//!
//! The node entry is replaced in place rather than removed and re-added, so
//! the id is present at every step. Attached connections are detached, the
//! node is re-rendered with the new payload, and each connection is
//! reattached under its original key if both of its sockets still exist.

use serde_json::Value;
use trellis_proto::{ConnectionRecord, NodeId, NodeRecord, NodeType};

use super::{ConnectionKey, GraphMirror, MirrorChange, MirrorNode};
use crate::guard::ScopeKind;

/// Outcome of a structural rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
	/// Rebuilt node.
	pub node: NodeId,
	/// Connections reattached under their original keys.
	pub kept: Vec<ConnectionKey>,
	/// Connections whose socket no longer exists.
	pub dropped: Vec<ConnectionRecord>,
}

impl GraphMirror {
	/// Recreates `id` with a new payload, keeping its position and every
	/// connection that still fits the new socket layout.
	///
	/// Returns `None` if the node is gone.
	pub fn rebuild_node(&mut self, id: NodeId, data: Value) -> Option<RebuildReport> {
		let node_type = self.nodes.get(&id)?.record.node_type;
		self.rebuild_as(id, node_type, data)
	}

	/// Like [`GraphMirror::rebuild_node`], but also changes the node type.
	pub fn rebuild_as(&mut self, id: NodeId, node_type: NodeType, data: Value) -> Option<RebuildReport> {
		let _scope = self.suppression.enter(ScopeKind::Rebuild);

		let position = self.nodes.get(&id)?.record.position;

		let captured: Vec<(ConnectionKey, ConnectionRecord)> = self.connections_touching(id);
		for (key, _) in &captured {
			self.connections.shift_remove(key);
			self.record(MirrorChange::ConnectionRemoved(*key));
		}

		// Render pass for the new payload.
		let sockets = self.renderer.sockets(node_type, &data);
		let slot = self.nodes.get_mut(&id)?;
		*slot = MirrorNode {
			record: NodeRecord {
				id,
				node_type,
				data,
				position,
			},
			sockets,
		};
		self.record(MirrorChange::NodeRebuilt(id));

		let mut report = RebuildReport {
			node: id,
			kept: Vec::with_capacity(captured.len()),
			dropped: Vec::new(),
		};
		for (key, record) in captured {
			match self.reinsert_connection(key, record.clone()) {
				Ok(()) => report.kept.push(key),
				Err(err) => {
					tracing::info!(
						node = %id,
						connection = ?record.id,
						error = %err,
						"connection dropped by structural rebuild"
					);
					report.dropped.push(record);
				}
			}
		}

		tracing::trace!(
			node = %id,
			kept = report.kept.len(),
			dropped = report.dropped.len(),
			"node rebuilt"
		);
		Some(report)
	}
}
