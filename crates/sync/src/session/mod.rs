//! Per-document editing session.
//!
//! # Purpose
//!
//! - Owns every piece of client state for one open flow document: the graph
//!   mirror, advisory locks, pending drag moves, undo history, and debug
//!   overlay.
//! - Local edits enter through methods on [`Session`] that apply optimistically
//!   and return the outbound [`ClientEvent`] to send.
//! - Server broadcasts enter through [`Session::apply`], which dispatches each
//!   event variant to its reducer.
//!
//! # Mental model
//!
//! - Local edits are refused up front when a collaborator holds the node's
//!   lock, and ignored while a suppression scope is held.
//! - Reconciliation never consults locks and never emits anything.
//! - History is written only from self-originated echoes, so what is recorded
//!   is what the server accepted.
//!
//! # Invariants
//!
//! 1. Every delete path cancels the node's pending move.
//!    - Enforced in: `Session::delete_node`, `Session::on_node_removed`,
//!      `Session::on_flow_updated`, `Session::replay_delete`
//!    - Tested by: `session::tests::delete_cancels_pending_move`,
//!      `session::tests::collaborator_delete_cancels_pending_move`
//! 2. No history entry is produced while a bulk reload is applied.
//!    - Enforced in: `Session::on_flow_updated`
//!    - Tested by: `session::tests::reload_clears_history_and_records_nothing`
//! 3. The echo of an undo or redo is not recorded again.
//!    - Enforced in: `Session::consume_replay`
//!    - Tested by: `session::tests::undo_echo_is_not_recorded`

mod reconcile;
mod undo;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use trellis_proto::{
	ClientEvent, ConnectionId, ConnectionRecord, Endpoint, LockHolder, NodeId, NodeRecord, NodeType,
	Position, SessionId,
};

pub use self::reconcile::{ApplyReport, HistoryEffect};
use crate::config::SessionConfig;
use crate::debounce::MoveDebouncer;
use crate::debug::{DebugMark, DebugView};
use crate::error::EditError;
use crate::guard::Suppression;
use crate::history::{History, ReplayTracker};
use crate::locks::LockTracker;
use crate::mirror::{ChangeRecord, GraphMirror, NodeUpdate, RemovedNode};
use crate::schema::{FlowRenderer, NodeRenderer};

/// Client state of one open flow document.
#[derive(Debug)]
pub struct Session {
	config: SessionConfig,
	suppression: Suppression,
	mirror: GraphMirror,
	locks: LockTracker,
	moves: MoveDebouncer,
	history: History,
	replay: ReplayTracker,
	debug: DebugView,
	meta: BTreeMap<String, Value>,
	/// Nodes deleted locally, kept until the echo so the delete can be undone.
	pending_deletes: FxHashMap<NodeId, RemovedNode>,
}

impl Session {
	/// Opens a session rendering sockets with the built-in flow layouts.
	pub fn new(config: SessionConfig) -> Self {
		Self::with_renderer(config, Arc::new(FlowRenderer))
	}

	/// Opens a session with a custom node renderer.
	pub fn with_renderer(config: SessionConfig, renderer: Arc<dyn NodeRenderer>) -> Self {
		let suppression = Suppression::new();
		Self {
			mirror: GraphMirror::new(renderer, suppression.clone()),
			locks: LockTracker::new(config.local_session),
			moves: MoveDebouncer::new(config.move_debounce()),
			history: History::new(config.history_limit),
			replay: ReplayTracker::new(config.replay_echo_timeout()),
			debug: DebugView::new(config.waiting_input_hold()),
			meta: BTreeMap::new(),
			pending_deletes: FxHashMap::default(),
			suppression,
			config,
		}
	}

	/// Session configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Identity of the local session.
	pub fn local_session(&self) -> SessionId {
		self.config.local_session
	}

	/// Shared suppression counters, for listeners that need to tell local
	/// changes from server-driven ones.
	pub fn suppression(&self) -> &Suppression {
		&self.suppression
	}

	/// Graph mirror.
	pub fn mirror(&self) -> &GraphMirror {
		&self.mirror
	}

	/// Advisory lock table.
	pub fn locks(&self) -> &LockTracker {
		&self.locks
	}

	/// Undo history.
	pub fn history(&self) -> &History {
		&self.history
	}

	/// Debug overlay.
	pub fn debug_view(&self) -> &DebugView {
		&self.debug
	}

	/// Document metadata fields.
	pub fn meta(&self) -> &BTreeMap<String, Value> {
		&self.meta
	}

	/// Takes mirror changes accumulated since the last drain.
	pub fn drain_changes(&mut self) -> Vec<ChangeRecord> {
		self.mirror.drain_changes()
	}

	fn ignored_while_suppressed(&self, op: &'static str) -> bool {
		let suppressed = self.suppression.is_suppressed();
		if suppressed {
			trace!(op, "local edit ignored while applying server state");
		}
		suppressed
	}

	fn check_editable(&self, node: NodeId) -> Result<(), EditError> {
		if !self.mirror.contains_node(node) {
			return Err(EditError::UnknownNode(node));
		}
		self.check_unlocked(node)
	}

	fn check_unlocked(&self, node: NodeId) -> Result<(), EditError> {
		match self.locks.blocking_holder(node) {
			Some(holder) => Err(EditError::Locked {
				node,
				holder: holder.clone(),
			}),
			None => Ok(()),
		}
	}

	/// Moves a node locally and arms its debounced `node_moved`.
	pub fn move_node(&mut self, id: NodeId, position: Position, now: Instant) -> Result<(), EditError> {
		if self.ignored_while_suppressed("move_node") {
			return Ok(());
		}
		self.check_editable(id)?;
		self.mirror.move_node(id, position);
		self.moves.schedule(id, position, now);
		Ok(())
	}

	/// Replaces a node payload locally.
	pub fn update_node_data(&mut self, id: NodeId, data: Value) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("update_node") {
			return Ok(None);
		}
		self.check_editable(id)?;
		match self.mirror.update_node_data(id, data.clone()) {
			Some(NodeUpdate::Unchanged) => Ok(None),
			Some(_) => Ok(Some(ClientEvent::UpdateNode { id, data })),
			None => Err(EditError::UnknownNode(id)),
		}
	}

	/// Deletes a node locally, cancelling its pending move.
	pub fn delete_node(&mut self, id: NodeId) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("delete_node") {
			return Ok(None);
		}
		self.check_editable(id)?;
		self.forget_node(id);
		if let Some(removed) = self.mirror.remove_node(id) {
			self.pending_deletes.insert(id, removed);
		}
		Ok(Some(ClientEvent::DeleteNode { id }))
	}

	/// Asks the server to copy a node. The copy arrives as `node_added`.
	pub fn duplicate_node(&mut self, id: NodeId) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("duplicate_node") {
			return Ok(None);
		}
		self.check_editable(id)?;
		Ok(Some(ClientEvent::DuplicateNode { id }))
	}

	/// Asks the server to create a node. The node arrives as `node_added`.
	pub fn create_node(&mut self, node_type: NodeType, data: Value, position: Position) -> Option<ClientEvent> {
		if self.ignored_while_suppressed("create_node") {
			return None;
		}
		Some(ClientEvent::CreateNode {
			node_type,
			data,
			x: position.x,
			y: position.y,
		})
	}

	/// Connects two sockets optimistically; the echo assigns the id.
	pub fn connect(
		&mut self,
		source: Endpoint,
		target: Endpoint,
		label: Option<String>,
		condition: Option<String>,
	) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("create_connection") {
			return Ok(None);
		}
		self.check_editable(source.node)?;
		self.check_editable(target.node)?;
		self.mirror.add_connection(ConnectionRecord {
			id: None,
			source: source.clone(),
			target: target.clone(),
			label: label.clone(),
			condition: condition.clone(),
		})?;
		Ok(Some(ClientEvent::CreateConnection {
			source,
			target,
			label,
			condition,
		}))
	}

	/// Removes a connection locally.
	pub fn disconnect(&mut self, id: ConnectionId) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("delete_connection") {
			return Ok(None);
		}
		self.mirror
			.remove_connection_by_id(id)
			.ok_or(EditError::UnknownConnection(id))?;
		Ok(Some(ClientEvent::DeleteConnection { id }))
	}

	/// Changes connection label and guard locally.
	pub fn update_connection(
		&mut self,
		id: ConnectionId,
		label: Option<String>,
		condition: Option<String>,
	) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed("update_connection") {
			return Ok(None);
		}
		if !self.mirror.update_connection(id, label.clone(), condition.clone()) {
			return Err(EditError::UnknownConnection(id));
		}
		Ok(Some(ClientEvent::UpdateConnection { id, label, condition }))
	}

	/// Sets a document metadata field locally.
	pub fn update_flow_meta(&mut self, field: impl Into<String>, value: Value) -> Option<ClientEvent> {
		if self.ignored_while_suppressed("update_flow_meta") {
			return None;
		}
		let field = field.into();
		if self.meta.get(&field) == Some(&value) {
			return None;
		}
		self.meta.insert(field.clone(), value.clone());
		Some(ClientEvent::UpdateFlowMeta { field, value })
	}

	/// Announces that the local user started editing a node.
	pub fn request_lock(&mut self, id: NodeId) -> Result<Option<ClientEvent>, EditError> {
		self.check_editable(id)?;
		if self.locks.is_held_locally(id) {
			return Ok(None);
		}
		Ok(Some(ClientEvent::LockNode { id }))
	}

	/// Announces that the local user stopped editing a node.
	pub fn release_lock(&mut self, id: NodeId) -> Option<ClientEvent> {
		self.locks
			.is_held_locally(id)
			.then_some(ClientEvent::UnlockNode { id })
	}

	/// Flips the breakpoint on a node.
	pub fn toggle_breakpoint(&mut self, id: NodeId) -> Result<ClientEvent, EditError> {
		if !self.mirror.contains_node(id) {
			return Err(EditError::UnknownNode(id));
		}
		let enabled = self.debug.toggle_breakpoint(id);
		Ok(ClientEvent::SetBreakpoint { id, enabled })
	}

	/// Runs expired timers and returns the moves that are due.
	pub fn poll(&mut self, now: Instant) -> Vec<ClientEvent> {
		self.debug.tick(now);
		self.replay.expire(now);
		self.moves.poll_due(now)
	}

	/// Earliest instant at which [`Session::poll`] has work.
	pub fn next_deadline(&self) -> Option<Instant> {
		match (self.moves.next_deadline(), self.debug.next_deadline()) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(a, b) => a.or(b),
		}
	}

	/// Returns true if a debounced move for `id` is armed.
	pub fn has_pending_move(&self, id: NodeId) -> bool {
		self.moves.is_pending(id)
	}

	/// Serializable view of the whole session state.
	pub fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			nodes: self.mirror.nodes().map(|node| node.record.clone()).collect(),
			connections: self.mirror.connections().map(|(_, record)| record.clone()).collect(),
			locks: self
				.locks
				.iter()
				.map(|(node, holder)| (node, holder.clone()))
				.collect(),
			debug: self
				.debug
				.marks()
				.filter(|(_, mark)| *mark != DebugMark::None)
				.collect(),
			breakpoints: {
				let mut nodes: Vec<NodeId> = self.debug.breakpoints().collect();
				nodes.sort();
				nodes
			},
			meta: self.meta.clone(),
			undo_depth: self.history.undo_len(),
			redo_depth: self.history.redo_len(),
		}
	}

	fn forget_node(&mut self, id: NodeId) {
		if self.moves.cancel(id) {
			debug!(node = %id, "pending move dropped for removed node");
		}
		self.debug.forget(id);
		self.locks.forget(id);
	}
}

/// Point-in-time copy of a session, for inspection and replay output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
	/// Live nodes in insertion order.
	pub nodes: Vec<NodeRecord>,
	/// Live connections in insertion order.
	pub connections: Vec<ConnectionRecord>,
	/// Advisory locks.
	pub locks: BTreeMap<NodeId, LockHolder>,
	/// Non-empty debug marks.
	pub debug: BTreeMap<NodeId, DebugMark>,
	/// Nodes carrying a breakpoint.
	pub breakpoints: Vec<NodeId>,
	/// Document metadata.
	pub meta: BTreeMap<String, Value>,
	/// Undo entries available.
	pub undo_depth: usize,
	/// Redo entries available.
	pub redo_depth: usize,
}
