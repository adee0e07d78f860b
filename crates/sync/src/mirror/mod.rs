//! Local mirror of the server-owned flow graph.
//!
//! # Mental model
//!
//! - The server owns the graph; the mirror is a copy kept isomorphic to it by
//!   applying inbound events, plus optimistic local edits awaiting their echo.
//! - Nodes are keyed by [`NodeId`]. Connections are keyed by a local
//!   [`ConnectionKey`] because an optimistic add has no server id until the
//!   echo arrives.
//! - Socket sets come from the [`NodeRenderer`]; connections are validated
//!   against them on insert.
//! - Every mutation appends a [`ChangeRecord`] tagged with the
//!   [`ChangeOrigin`] active at the time, for the render layer to drain.
//!
//! # Invariants
//!
//! 1. Every connection endpoint resolves to a live node exposing the socket.
//!    - Enforced in: `GraphMirror::add_connection`, `GraphMirror::remove_node`,
//!      `GraphMirror::rebuild_node`
//!    - Tested by: `mirror::tests::removing_node_drops_touching_connections`,
//!      `tests/properties.rs`
//! 2. At most one connection exists per socket pair.
//!    - Enforced in: `GraphMirror::add_connection`
//!    - Tested by: `mirror::tests::duplicate_route_merges_metadata`
//! 3. A rebuilt node id stays present throughout the rebuild.
//!    - Enforced in: `GraphMirror::rebuild_node`
//!    - Tested by: `mirror::tests::rebuild_never_reports_removal`

mod rebuild;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;
use trellis_proto::{ConnectionId, ConnectionRecord, NodeId, NodeRecord, Position};

pub use self::rebuild::RebuildReport;
use crate::error::SyncError;
use crate::guard::{ChangeOrigin, Suppression};
use crate::schema::{NodeRenderer, SocketSet};

/// Local handle of a connection, stable across server id assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey(pub u64);

/// A node in the mirror together with its rendered sockets.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorNode {
	/// Authoritative record.
	pub record: NodeRecord,
	/// Sockets produced by the last render pass.
	pub sockets: SocketSet,
}

/// Kind of mirror mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorChange {
	/// A node appeared.
	NodeAdded(NodeId),
	/// A node disappeared.
	NodeRemoved(NodeId),
	/// A node payload changed in place.
	NodeUpdated(NodeId),
	/// A node moved.
	NodeMoved(NodeId),
	/// A node was recreated with a new socket layout.
	NodeRebuilt(NodeId),
	/// A connection appeared.
	ConnectionAdded(ConnectionKey),
	/// A connection disappeared.
	ConnectionRemoved(ConnectionKey),
	/// A connection received an id, label, or guard.
	ConnectionUpdated(ConnectionKey),
	/// Everything was dropped ahead of a reload.
	Cleared,
}

/// A mirror mutation and the scope it happened under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeRecord {
	/// What changed.
	pub change: MirrorChange,
	/// Who caused it.
	pub origin: ChangeOrigin,
}

/// Result of inserting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeInsert {
	/// The node was new.
	Inserted,
	/// The node existed and was refreshed from the record.
	Refreshed,
}

/// Result of replacing a node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeUpdate {
	/// The payload was already current.
	Unchanged,
	/// The payload was replaced in place.
	Refreshed,
	/// The socket shape changed and the node was rebuilt.
	Rebuilt(RebuildReport),
}

/// Result of inserting a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInsert {
	/// A new connection was stored under this key.
	Inserted(ConnectionKey),
	/// An existing connection on the same route took the inbound metadata.
	Merged(ConnectionKey),
}

impl ConnectionInsert {
	/// Key of the stored connection.
	pub fn key(self) -> ConnectionKey {
		match self {
			Self::Inserted(key) | Self::Merged(key) => key,
		}
	}
}

/// A removed node and the connections that were attached to it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
	/// Node record at removal time.
	pub node: NodeRecord,
	/// Connections dropped with it.
	pub connections: Vec<ConnectionRecord>,
}

/// In-memory node/connection graph mirrored from the server.
pub struct GraphMirror {
	renderer: Arc<dyn NodeRenderer>,
	suppression: Suppression,
	nodes: IndexMap<NodeId, MirrorNode, FxBuildHasher>,
	connections: IndexMap<ConnectionKey, ConnectionRecord, FxBuildHasher>,
	next_key: u64,
	changes: Vec<ChangeRecord>,
}

impl std::fmt::Debug for GraphMirror {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GraphMirror")
			.field("nodes", &self.nodes.len())
			.field("connections", &self.connections.len())
			.field("pending_changes", &self.changes.len())
			.finish()
	}
}

impl GraphMirror {
	/// Creates an empty mirror.
	///
	/// `suppression` is shared with the owning session so change records carry
	/// the scope that was active when they were made.
	pub fn new(renderer: Arc<dyn NodeRenderer>, suppression: Suppression) -> Self {
		Self {
			renderer,
			suppression,
			nodes: IndexMap::default(),
			connections: IndexMap::default(),
			next_key: 0,
			changes: Vec::new(),
		}
	}

	fn record(&mut self, change: MirrorChange) {
		self.changes.push(ChangeRecord {
			change,
			origin: self.suppression.origin(),
		});
	}

	fn alloc_key(&mut self) -> ConnectionKey {
		self.next_key += 1;
		ConnectionKey(self.next_key)
	}

	/// Takes all change records accumulated since the last drain.
	pub fn drain_changes(&mut self) -> Vec<ChangeRecord> {
		std::mem::take(&mut self.changes)
	}

	/// Returns the node with this id.
	pub fn node(&self, id: NodeId) -> Option<&MirrorNode> {
		self.nodes.get(&id)
	}

	/// Returns true if the node is live.
	pub fn contains_node(&self, id: NodeId) -> bool {
		self.nodes.contains_key(&id)
	}

	/// Iterates nodes in insertion order.
	pub fn nodes(&self) -> impl Iterator<Item = &MirrorNode> {
		self.nodes.values()
	}

	/// Number of live nodes.
	pub fn node_count(&self) -> usize {
		self.nodes.len()
	}

	/// Returns the connection stored under `key`.
	pub fn connection(&self, key: ConnectionKey) -> Option<&ConnectionRecord> {
		self.connections.get(&key)
	}

	/// Iterates connections in insertion order.
	pub fn connections(&self) -> impl Iterator<Item = (ConnectionKey, &ConnectionRecord)> {
		self.connections.iter().map(|(key, record)| (*key, record))
	}

	/// Number of live connections.
	pub fn connection_count(&self) -> usize {
		self.connections.len()
	}

	/// Finds the connection carrying a server id.
	pub fn find_connection(&self, id: ConnectionId) -> Option<ConnectionKey> {
		self.connections
			.iter()
			.find(|(_, record)| record.id == Some(id))
			.map(|(key, _)| *key)
	}

	/// Finds the connection joining the same sockets as `record`.
	pub fn find_route(&self, record: &ConnectionRecord) -> Option<ConnectionKey> {
		self.connections
			.iter()
			.find(|(_, existing)| existing.same_route(record))
			.map(|(key, _)| *key)
	}

	/// Returns every connection attached to `node`.
	pub fn connections_touching(&self, node: NodeId) -> Vec<(ConnectionKey, ConnectionRecord)> {
		self.connections
			.iter()
			.filter(|(_, record)| record.touches(node))
			.map(|(key, record)| (*key, record.clone()))
			.collect()
	}

	/// Inserts a node, or refreshes payload and position if it already exists.
	///
	/// An existing node arriving with a different type is rebuilt with the
	/// new type's sockets.
	pub fn add_node(&mut self, record: NodeRecord) -> NodeInsert {
		if let Some(existing) = self.nodes.get(&record.id) {
			let id = record.id;
			if existing.record.node_type == record.node_type {
				self.update_node_data(id, record.data);
			} else {
				tracing::debug!(node = %id, node_type = ?record.node_type, "node type changed; rebuilding");
				self.rebuild_as(id, record.node_type, record.data);
			}
			self.move_node(id, record.position);
			return NodeInsert::Refreshed;
		}

		let sockets = self.renderer.sockets(record.node_type, &record.data);
		let id = record.id;
		self.nodes.insert(id, MirrorNode { record, sockets });
		self.record(MirrorChange::NodeAdded(id));
		NodeInsert::Inserted
	}

	/// Removes a node and every connection attached to it.
	///
	/// Returns `None` if the node was already gone.
	pub fn remove_node(&mut self, id: NodeId) -> Option<RemovedNode> {
		if !self.nodes.contains_key(&id) {
			return None;
		}

		let mut connections = Vec::new();
		for (key, _) in self.connections_touching(id) {
			if let Some(record) = self.remove_connection(key) {
				connections.push(record);
			}
		}

		let node = self.nodes.shift_remove(&id)?.record;
		self.record(MirrorChange::NodeRemoved(id));
		Some(RemovedNode { node, connections })
	}

	/// Moves a node. Returns false if the node is gone.
	pub fn move_node(&mut self, id: NodeId, position: Position) -> bool {
		let Some(node) = self.nodes.get_mut(&id) else {
			return false;
		};
		if node.record.position != position {
			node.record.position = position;
			self.record(MirrorChange::NodeMoved(id));
		}
		true
	}

	/// Replaces a node payload, rebuilding the node if its sockets change.
	///
	/// Returns `None` if the node is gone.
	pub fn update_node_data(&mut self, id: NodeId, data: Value) -> Option<NodeUpdate> {
		let node = self.nodes.get(&id)?;
		if node.record.data == data {
			return Some(NodeUpdate::Unchanged);
		}

		if self
			.renderer
			.shape_changed(node.record.node_type, &node.record.data, &data)
		{
			return self.rebuild_node(id, data).map(NodeUpdate::Rebuilt);
		}

		let node = self.nodes.get_mut(&id)?;
		node.record.data = data;
		self.record(MirrorChange::NodeUpdated(id));
		Some(NodeUpdate::Refreshed)
	}

	fn validate(&self, record: &ConnectionRecord) -> Result<(), SyncError> {
		let source = self
			.nodes
			.get(&record.source.node)
			.ok_or(SyncError::UnknownNode(record.source.node))?;
		if !source.sockets.has_output(&record.source.socket) {
			return Err(SyncError::UnknownSocket {
				node: record.source.node,
				socket: record.source.socket.clone(),
				direction: "output",
			});
		}

		let target = self
			.nodes
			.get(&record.target.node)
			.ok_or(SyncError::UnknownNode(record.target.node))?;
		if !target.sockets.has_input(&record.target.socket) {
			return Err(SyncError::UnknownSocket {
				node: record.target.node,
				socket: record.target.socket.clone(),
				direction: "input",
			});
		}
		Ok(())
	}

	/// Inserts a connection, merging onto an existing one on the same route.
	///
	/// On merge the inbound metadata wins: a present id replaces the stored
	/// one, and label and guard are overwritten.
	pub fn add_connection(&mut self, record: ConnectionRecord) -> Result<ConnectionInsert, SyncError> {
		self.validate(&record)?;

		if let Some(key) = self.find_route(&record) {
			if let Some(id) = record.id
				&& let Some(stale) = self.find_connection(id)
				&& stale != key
			{
				self.remove_connection(stale);
			}
			if let Some(existing) = self.connections.get_mut(&key) {
				if record.id.is_some() {
					existing.id = record.id;
				}
				existing.label = record.label;
				existing.condition = record.condition;
			}
			self.record(MirrorChange::ConnectionUpdated(key));
			return Ok(ConnectionInsert::Merged(key));
		}

		if let Some(id) = record.id
			&& let Some(stale) = self.find_connection(id)
		{
			tracing::debug!(%id, "connection id re-routed; replacing stale route");
			self.remove_connection(stale);
		}

		let key = self.alloc_key();
		self.connections.insert(key, record);
		self.record(MirrorChange::ConnectionAdded(key));
		Ok(ConnectionInsert::Inserted(key))
	}

	fn reinsert_connection(&mut self, key: ConnectionKey, record: ConnectionRecord) -> Result<(), SyncError> {
		self.validate(&record)?;
		self.connections.insert(key, record);
		self.record(MirrorChange::ConnectionAdded(key));
		Ok(())
	}

	/// Removes a connection by local key.
	pub fn remove_connection(&mut self, key: ConnectionKey) -> Option<ConnectionRecord> {
		let record = self.connections.shift_remove(&key)?;
		self.record(MirrorChange::ConnectionRemoved(key));
		Some(record)
	}

	/// Removes a connection by server id. Returns `None` if it was already gone.
	pub fn remove_connection_by_id(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
		let key = self.find_connection(id)?;
		self.remove_connection(key)
	}

	/// Replaces label and guard of a connection. Returns false if it is gone.
	pub fn update_connection(
		&mut self,
		id: ConnectionId,
		label: Option<String>,
		condition: Option<String>,
	) -> bool {
		let Some(key) = self.find_connection(id) else {
			return false;
		};
		if let Some(record) = self.connections.get_mut(&key)
			&& (record.label != label || record.condition != condition)
		{
			record.label = label;
			record.condition = condition;
			self.record(MirrorChange::ConnectionUpdated(key));
		}
		true
	}

	/// Drops every node and connection.
	pub fn clear(&mut self) {
		self.nodes.clear();
		self.connections.clear();
		self.record(MirrorChange::Cleared);
	}

	/// Replaces the whole graph with a snapshot.
	///
	/// Connections that cannot be attached are skipped and reported.
	pub fn load(&mut self, nodes: Vec<NodeRecord>, connections: Vec<ConnectionRecord>) -> Vec<SyncError> {
		self.clear();
		for node in nodes {
			self.add_node(node);
		}

		let mut errors = Vec::new();
		for record in connections {
			if let Some(id) = record.id
				&& self.find_connection(id).is_some()
			{
				errors.push(SyncError::DuplicateConnection(id));
				continue;
			}
			if let Err(err) = self.add_connection(record) {
				errors.push(err);
			}
		}
		errors
	}

	/// Checks that every connection endpoint resolves to a live socket.
	pub fn check_integrity(&self) -> Result<(), SyncError> {
		self.connections.values().try_for_each(|record| self.validate(record))
	}
}
