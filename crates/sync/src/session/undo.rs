//! Undo and redo as ordinary outbound mutations.
//!
//! Replaying an entry applies it to the mirror optimistically, registers the
//! echo the server will send back, and returns the mutation to send. The
//! server cannot tell a replay from a fresh edit.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, trace};
use trellis_proto::{ClientEvent, ConnectionRecord, NodeId, NodeRecord};

use super::Session;
use crate::error::EditError;
use crate::history::{Action, EchoKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
	Undo,
	Redo,
}

impl Direction {
	fn name(self) -> &'static str {
		match self {
			Self::Undo => "undo",
			Self::Redo => "redo",
		}
	}
}

impl Session {
	/// Reverts the most recent recorded action.
	///
	/// Returns `Ok(None)` when there is nothing to undo. A node locked by a
	/// collaborator refuses the undo and the entry stays where it is. An entry
	/// whose node has since disappeared is discarded.
	pub fn undo(&mut self, now: Instant) -> Result<Option<ClientEvent>, EditError> {
		self.replay_step(Direction::Undo, now)
	}

	/// Re-applies the most recently undone action.
	pub fn redo(&mut self, now: Instant) -> Result<Option<ClientEvent>, EditError> {
		self.replay_step(Direction::Redo, now)
	}

	fn replay_step(&mut self, direction: Direction, now: Instant) -> Result<Option<ClientEvent>, EditError> {
		if self.ignored_while_suppressed(direction.name()) {
			return Ok(None);
		}

		let (target, needs_live) = {
			let peeked = match direction {
				Direction::Undo => self.history.peek_undo(),
				Direction::Redo => self.history.peek_redo(),
			};
			let Some(action) = peeked else {
				trace!(op = direction.name(), "nothing to replay");
				return Ok(None);
			};
			let needs_live = match (action, direction) {
				(Action::Create { .. }, Direction::Undo)
				| (Action::Delete { .. }, Direction::Redo)
				| (Action::NodeDataChange { .. }, _) => action.target_node(),
				_ => None,
			};
			(action.target_node(), needs_live)
		};

		if let Some(node) = target {
			self.check_unlocked(node)?;
		}
		if let Some(node) = needs_live
			&& !self.mirror.contains_node(node)
		{
			debug!(op = direction.name(), %node, "history entry targets a removed node; discarded");
			match direction {
				Direction::Undo => self.history.discard_undo(),
				Direction::Redo => self.history.discard_redo(),
			};
			return Err(EditError::UnknownNode(node));
		}

		let action = match direction {
			Direction::Undo => self.history.undo(),
			Direction::Redo => self.history.redo(),
		};
		let Some(action) = action else {
			return Ok(None);
		};

		let event = match (action, direction) {
			(Action::Create { node, .. }, Direction::Undo) | (Action::Delete { node, .. }, Direction::Redo) => {
				self.replay_delete(node.id, now)
			}
			(Action::Create { node, connections }, Direction::Redo)
			| (Action::Delete { node, connections }, Direction::Undo) => self.replay_restore(node, connections, now),
			(Action::NodeDataChange { id, prev: data, .. }, Direction::Undo)
			| (Action::NodeDataChange { id, new: data, .. }, Direction::Redo) => self.replay_data(id, data, now),
			(Action::MetaChange { field, prev: value, .. }, Direction::Undo)
			| (Action::MetaChange { field, new: value, .. }, Direction::Redo) => self.replay_meta(field, value, now),
		};
		Ok(Some(event))
	}

	fn replay_delete(&mut self, id: NodeId, now: Instant) -> ClientEvent {
		self.forget_node(id);
		self.mirror.remove_node(id);
		self.pending_deletes.remove(&id);
		self.replay.expect(EchoKey::Removed(id), None, now);
		ClientEvent::DeleteNode { id }
	}

	fn replay_restore(&mut self, node: NodeRecord, connections: Vec<ConnectionRecord>, now: Instant) -> ClientEvent {
		self.mirror.add_node(node.clone());
		for connection in &connections {
			if let Err(err) = self.mirror.add_connection(connection.clone()) {
				debug!(node = %node.id, error = %err, "restored connection left to the server echo");
			}
		}
		self.replay.expect(EchoKey::Restored(node.id), None, now);
		ClientEvent::RestoreNode { node, connections }
	}

	fn replay_data(&mut self, id: NodeId, data: Value, now: Instant) -> ClientEvent {
		self.mirror.update_node_data(id, data.clone());
		self.replay.expect(EchoKey::DataChanged(id), Some(data.clone()), now);
		ClientEvent::UpdateNode { id, data }
	}

	fn replay_meta(&mut self, field: String, value: Value, now: Instant) -> ClientEvent {
		self.meta.insert(field.clone(), value.clone());
		self.replay.expect(EchoKey::MetaChanged(field.clone()), Some(value.clone()), now);
		ClientEvent::UpdateFlowMeta { field, value }
	}
}
