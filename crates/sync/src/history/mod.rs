//! Linear undo/redo history of user actions.
//!
//! # Mental model
//!
//! - Entries are recorded from self-originated server echoes, never from
//!   collaborator events, snapshot reloads, or the echoes of undo/redo itself.
//! - The stack is linear: any new entry invalidates redo.
//! - Coalescing happens on the top entry only. The session asks for the top
//!   entry via [`History::recent_mut`] and extends it in place when the kind
//!   and target match.
//! - Undo and redo replay as ordinary outbound mutations. Each one registers
//!   an expected echo with the [`ReplayTracker`] so its round trip is not
//!   recorded again.
//!
//! # Invariants
//!
//! 1. Pushing an entry clears redo.
//!    - Enforced in: `History::push`
//!    - Tested by: `history::tests::push_invalidates_redo`
//! 2. Depth never exceeds the configured limit; the oldest entries drop.
//!    - Enforced in: `History::push`, `History::redo`
//!    - Tested by: `history::tests::oldest_entries_drop_past_limit`
//! 3. An edit made after an undo never merges into an older entry.
//!    - Enforced in: `History::recent_mut`
//!    - Tested by: `history::tests::nothing_coalesces_while_redo_is_pending`

mod replay;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::trace;
use trellis_proto::{ConnectionRecord, NodeId, NodeRecord};

pub use self::replay::{EchoKey, ReplayTracker};

/// A reversible user action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
	/// A node was created. Undo deletes it, redo restores it.
	Create {
		/// Node as created.
		node: NodeRecord,
		/// Connections it came back with, for restores.
		connections: Vec<ConnectionRecord>,
	},
	/// A node was deleted with its connections.
	Delete {
		/// Node before deletion.
		node: NodeRecord,
		/// Connections dropped with it.
		connections: Vec<ConnectionRecord>,
	},
	/// A node payload changed.
	NodeDataChange {
		/// Changed node.
		id: NodeId,
		/// Payload before the first edit of the burst.
		prev: Value,
		/// Payload after the last edit of the burst.
		new: Value,
	},
	/// A document metadata field changed.
	MetaChange {
		/// Field name.
		field: String,
		/// Value before the first edit of the burst.
		prev: Value,
		/// Value after the last edit of the burst.
		new: Value,
	},
}

impl Action {
	/// Node the action targets, if any.
	pub fn target_node(&self) -> Option<NodeId> {
		match self {
			Self::Create { node, .. } | Self::Delete { node, .. } => Some(node.id),
			Self::NodeDataChange { id, .. } => Some(*id),
			Self::MetaChange { .. } => None,
		}
	}

	/// Short name for logs.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Create { .. } => "create",
			Self::Delete { .. } => "delete",
			Self::NodeDataChange { .. } => "node_data",
			Self::MetaChange { .. } => "meta",
		}
	}
}

/// An action and the time it was last extended.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
	/// The recorded action.
	pub action: Action,
	/// When the action was recorded or last coalesced.
	pub at: Instant,
}

/// Bounded undo and redo stacks.
#[derive(Debug)]
pub struct History {
	undo_stack: VecDeque<Entry>,
	redo_stack: Vec<Entry>,
	limit: usize,
}

impl History {
	/// Creates empty stacks keeping at most `limit` undo entries.
	pub fn new(limit: usize) -> Self {
		Self {
			undo_stack: VecDeque::new(),
			redo_stack: Vec::new(),
			limit: limit.max(1),
		}
	}

	/// Returns the number of undo entries.
	pub fn undo_len(&self) -> usize {
		self.undo_stack.len()
	}

	/// Returns the number of redo entries.
	pub fn redo_len(&self) -> usize {
		self.redo_stack.len()
	}

	/// Returns `true` if there are undo entries.
	pub fn can_undo(&self) -> bool {
		!self.undo_stack.is_empty()
	}

	/// Returns `true` if there are redo entries.
	pub fn can_redo(&self) -> bool {
		!self.redo_stack.is_empty()
	}

	/// Pushes an action and clears the redo stack.
	pub fn push(&mut self, action: Action, now: Instant) {
		trace!(
			kind = action.kind(),
			target = ?action.target_node(),
			undo_stack = self.undo_stack.len() + 1,
			"history entry pushed"
		);
		self.undo_stack.push_back(Entry { action, at: now });
		self.enforce_limit();
		if !self.redo_stack.is_empty() {
			trace!(cleared = self.redo_stack.len(), "redo stack cleared");
		}
		self.redo_stack.clear();
	}

	fn enforce_limit(&mut self) {
		while self.undo_stack.len() > self.limit {
			if let Some(dropped) = self.undo_stack.pop_front() {
				trace!(kind = dropped.action.kind(), "oldest history entry dropped");
			}
		}
	}

	/// Returns the top entry if it was recorded or extended within `window`
	/// of `now`.
	///
	/// Callers check the kind and target themselves; on a match they update
	/// the new value and set `at` to `now`. Nothing coalesces while redo
	/// entries exist: the top entry then predates an undone action, and the
	/// edit must be pushed so redo is invalidated.
	pub fn recent_mut(&mut self, window: Duration, now: Instant) -> Option<&mut Entry> {
		if !self.redo_stack.is_empty() {
			return None;
		}
		self.undo_stack
			.back_mut()
			.filter(|entry| now.saturating_duration_since(entry.at) <= window)
	}

	/// Returns the action the next undo would replay.
	pub fn peek_undo(&self) -> Option<&Action> {
		self.undo_stack.back().map(|entry| &entry.action)
	}

	/// Returns the action the next redo would replay.
	pub fn peek_redo(&self) -> Option<&Action> {
		self.redo_stack.last().map(|entry| &entry.action)
	}

	/// Moves the top undo entry to the redo stack and returns its action.
	pub fn undo(&mut self) -> Option<Action> {
		let entry = self.undo_stack.pop_back()?;
		let action = entry.action.clone();
		trace!(
			kind = action.kind(),
			undo_stack = self.undo_stack.len(),
			redo_stack = self.redo_stack.len() + 1,
			"undo"
		);
		self.redo_stack.push(entry);
		Some(action)
	}

	/// Moves the top redo entry back to the undo stack and returns its action.
	pub fn redo(&mut self) -> Option<Action> {
		let entry = self.redo_stack.pop()?;
		let action = entry.action.clone();
		trace!(
			kind = action.kind(),
			undo_stack = self.undo_stack.len() + 1,
			redo_stack = self.redo_stack.len(),
			"redo"
		);
		self.undo_stack.push_back(entry);
		self.enforce_limit();
		Some(action)
	}

	/// Drops the top undo entry without replaying it.
	pub fn discard_undo(&mut self) -> Option<Action> {
		self.undo_stack.pop_back().map(|entry| entry.action)
	}

	/// Drops the top redo entry without replaying it.
	pub fn discard_redo(&mut self) -> Option<Action> {
		self.redo_stack.pop().map(|entry| entry.action)
	}

	/// Drops both stacks.
	pub fn clear(&mut self) {
		if self.can_undo() || self.can_redo() {
			trace!(
				undo_stack = self.undo_stack.len(),
				redo_stack = self.redo_stack.len(),
				"history cleared"
			);
		}
		self.undo_stack.clear();
		self.redo_stack.clear();
	}
}
