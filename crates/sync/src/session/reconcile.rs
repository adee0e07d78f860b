//! Reducers for server broadcasts.
//!
//! [`Session::apply`] matches on the event variant and hands the payload to
//! one reducer per tag. Every reducer is idempotent: re-applying an event, or
//! applying the echo of an optimistic local edit, leaves the mirror as it was.
//! Stale references are dropped with a debug log.

use std::collections::BTreeMap;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, trace, warn};
use trellis_proto::{
	ConnectionId, ConnectionRecord, DebugStatus, Inbound, LockHolder, NodeId, NodeRecord, Position, ServerEvent,
};

use super::Session;
use crate::error::SyncError;
use crate::guard::ScopeKind;
use crate::history::{Action, EchoKey};
use crate::mirror::NodeUpdate;

/// What an inbound event did to the undo history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryEffect {
	/// Nothing was recorded.
	#[default]
	None,
	/// A new entry was pushed.
	Recorded,
	/// The top entry was extended in place.
	Coalesced,
	/// The event was the echo of an undo or redo and was consumed.
	Replayed,
	/// Both stacks were dropped by a snapshot reload.
	Cleared,
}

/// Outcome of applying one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
	/// Wire tag of the event.
	pub tag: &'static str,
	/// Whether the event echoed this session's own mutation.
	pub self_originated: bool,
	/// Effect on the undo history.
	pub history: HistoryEffect,
	/// The event referenced a node or connection that no longer exists.
	pub stale: bool,
	/// Contained reconciliation failures.
	pub errors: Vec<SyncError>,
}

impl ApplyReport {
	fn new(tag: &'static str, self_originated: bool) -> Self {
		Self {
			tag,
			self_originated,
			history: HistoryEffect::None,
			stale: false,
			errors: Vec::new(),
		}
	}

	fn fail(&mut self, err: SyncError) {
		warn!(event = self.tag, error = %err, "reconciliation step failed");
		self.errors.push(err);
	}

	fn stale(&mut self, what: &'static str, id: impl std::fmt::Display) {
		debug!(event = self.tag, what, %id, "stale reference dropped");
		self.stale = true;
	}
}

impl Session {
	/// Applies one server broadcast.
	///
	/// The whole batch runs inside a remote-apply scope, so mirror changes are
	/// tagged as server-driven and local edit entry points are inert. Failures
	/// are contained and reported; nothing is ever sent back.
	pub fn apply(&mut self, inbound: Inbound, now: Instant) -> ApplyReport {
		let Inbound { self_originated, event } = inbound;
		let mut report = ApplyReport::new(event.tag(), self_originated);
		let _scope = self.suppression.enter(ScopeKind::RemoteApply);

		match event {
			ServerEvent::FlowUpdated { nodes, connections } => self.on_flow_updated(nodes, connections, &mut report),
			ServerEvent::NodeAdded { node } => self.on_node_added(node, now, &mut report),
			ServerEvent::NodeRemoved { id } => self.on_node_removed(id, now, &mut report),
			ServerEvent::NodeRestored { node, connections } => {
				self.on_node_restored(node, connections, now, &mut report)
			}
			ServerEvent::NodeUpdated { id, data } => self.on_node_updated(id, data, &mut report),
			ServerEvent::NodeMoved { id, x, y } => self.on_node_moved(id, Position::new(x, y), &mut report),
			ServerEvent::NodeDataChanged { id, prev_data, new_data } => {
				self.on_node_data_changed(id, prev_data, new_data, now, &mut report)
			}
			ServerEvent::ConnectionAdded { connection } => self.on_connection_added(connection, &mut report),
			ServerEvent::ConnectionRemoved { id } => self.on_connection_removed(id, &mut report),
			ServerEvent::ConnectionUpdated { id, label, condition } => {
				self.on_connection_updated(id, label, condition, &mut report)
			}
			ServerEvent::FlowMetaChanged { field, prev, new } => {
				self.on_flow_meta_changed(field, prev, new, now, &mut report)
			}
			ServerEvent::LocksUpdated { locks } => self.on_locks_updated(locks),
			ServerEvent::DebugHighlightNode {
				node_id,
				status,
				execution_path,
			} => self.on_debug_highlight(node_id, status, &execution_path, now),
			ServerEvent::DebugClearHighlights => self.debug.clear(),
		}

		report
	}

	fn on_flow_updated(&mut self, nodes: Vec<NodeRecord>, connections: Vec<ConnectionRecord>, report: &mut ApplyReport) {
		let _reload = self.suppression.enter(ScopeKind::BulkReload);

		self.moves.clear();
		self.history.clear();
		self.replay.clear();
		self.pending_deletes.clear();
		report.history = HistoryEffect::Cleared;

		for err in self.mirror.load(nodes, connections) {
			report.fail(err);
		}
		let mirror = &self.mirror;
		self.debug.retain(|id| mirror.contains_node(id));
		debug!(
			nodes = self.mirror.node_count(),
			connections = self.mirror.connection_count(),
			"flow reloaded"
		);
	}

	fn on_node_added(&mut self, node: NodeRecord, now: Instant, report: &mut ApplyReport) {
		self.drop_pending_delete(node.id);
		self.mirror.add_node(node.clone());
		if report.self_originated {
			self.record(
				Action::Create {
					node,
					connections: Vec::new(),
				},
				now,
				report,
			);
		}
	}

	fn on_node_removed(&mut self, id: NodeId, now: Instant, report: &mut ApplyReport) {
		self.forget_node(id);
		let removed = self.mirror.remove_node(id);
		let stashed = self.pending_deletes.remove(&id);

		if !report.self_originated {
			if removed.is_none() {
				report.stale("node", id);
			}
			return;
		}
		if self.consume_replay(EchoKey::Removed(id), None, now, report) {
			return;
		}
		match stashed.or(removed) {
			Some(snapshot) => self.record(
				Action::Delete {
					node: snapshot.node,
					connections: snapshot.connections,
				},
				now,
				report,
			),
			None => debug!(node = %id, "delete echo without a snapshot; not recorded"),
		}
	}

	fn on_node_restored(
		&mut self,
		node: NodeRecord,
		connections: Vec<ConnectionRecord>,
		now: Instant,
		report: &mut ApplyReport,
	) {
		let id = node.id;
		self.drop_pending_delete(id);
		self.mirror.add_node(node.clone());
		for connection in &connections {
			if let Err(err) = self.mirror.add_connection(connection.clone()) {
				report.fail(err);
			}
		}

		if report.self_originated && !self.consume_replay(EchoKey::Restored(id), None, now, report) {
			self.record(Action::Create { node, connections }, now, report);
		}
	}

	fn on_node_updated(&mut self, id: NodeId, data: Value, report: &mut ApplyReport) {
		match self.mirror.update_node_data(id, data) {
			None => report.stale("node", id),
			Some(NodeUpdate::Rebuilt(rebuild)) if !rebuild.dropped.is_empty() => {
				debug!(node = %id, dropped = rebuild.dropped.len(), "inbound update rebuilt node");
			}
			Some(_) => {}
		}
	}

	fn on_node_moved(&mut self, id: NodeId, position: Position, report: &mut ApplyReport) {
		// The pending move already holds a newer local position.
		if report.self_originated && self.moves.is_pending(id) {
			trace!(node = %id, "own move echo superseded by pending drag");
			return;
		}
		if !self.mirror.move_node(id, position) {
			report.stale("node", id);
		}
	}

	fn on_node_data_changed(&mut self, id: NodeId, prev: Value, new: Value, now: Instant, report: &mut ApplyReport) {
		if !report.self_originated || self.consume_replay(EchoKey::DataChanged(id), Some(&new), now, report) {
			return;
		}

		let window = self.config.data_coalesce_window();
		if let Some(entry) = self.history.recent_mut(window, now)
			&& let Action::NodeDataChange { id: top, new: latest, .. } = &mut entry.action
			&& *top == id
		{
			*latest = new;
			entry.at = now;
			report.history = HistoryEffect::Coalesced;
			return;
		}
		self.record(Action::NodeDataChange { id, prev, new }, now, report);
	}

	fn on_connection_added(&mut self, connection: ConnectionRecord, report: &mut ApplyReport) {
		if let Err(err) = self.mirror.add_connection(connection) {
			report.fail(err);
		}
	}

	fn on_connection_removed(&mut self, id: ConnectionId, report: &mut ApplyReport) {
		if self.mirror.remove_connection_by_id(id).is_none() {
			report.stale("connection", id);
		}
	}

	fn on_connection_updated(
		&mut self,
		id: ConnectionId,
		label: Option<String>,
		condition: Option<String>,
		report: &mut ApplyReport,
	) {
		if !self.mirror.update_connection(id, label, condition) {
			report.stale("connection", id);
		}
	}

	fn on_flow_meta_changed(&mut self, field: String, prev: Value, new: Value, now: Instant, report: &mut ApplyReport) {
		self.meta.insert(field.clone(), new.clone());
		if !report.self_originated
			|| self.consume_replay(EchoKey::MetaChanged(field.clone()), Some(&new), now, report)
		{
			return;
		}

		let window = self.config.meta_coalesce_window();
		if let Some(entry) = self.history.recent_mut(window, now)
			&& let Action::MetaChange { field: top, new: latest, .. } = &mut entry.action
			&& *top == field
		{
			*latest = new;
			entry.at = now;
			report.history = HistoryEffect::Coalesced;
			return;
		}
		self.record(Action::MetaChange { field, prev, new }, now, report);
	}

	fn on_locks_updated(&mut self, locks: BTreeMap<NodeId, LockHolder>) {
		self.locks.locks_updated(locks);
	}

	fn on_debug_highlight(&mut self, node: NodeId, status: DebugStatus, path: &[NodeId], now: Instant) {
		self.debug.highlight(node, status, path, now);
	}

	/// A node coming back means its local delete never took effect.
	fn drop_pending_delete(&mut self, id: NodeId) {
		if self.pending_deletes.remove(&id).is_some() {
			debug!(node = %id, "node reappeared; local delete abandoned");
		}
	}

	fn record(&mut self, action: Action, now: Instant, report: &mut ApplyReport) {
		if self.suppression.is_reloading() {
			return;
		}
		self.history.push(action, now);
		report.history = HistoryEffect::Recorded;
	}

	/// Consumes the expected echo of an undo or redo, if this is one.
	fn consume_replay(
		&mut self,
		key: EchoKey,
		payload: Option<&Value>,
		now: Instant,
		report: &mut ApplyReport,
	) -> bool {
		let consumed = self.replay.consume(&key, payload, now);
		if consumed {
			report.history = HistoryEffect::Replayed;
		}
		consumed
	}
}
