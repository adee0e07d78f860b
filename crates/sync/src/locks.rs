//! Advisory per-node lock table.
//!
//! Locks tell the local user that someone else is editing a node. They are a
//! UX hint only: the table is replaced wholesale by each `locks_updated`
//! snapshot, never consulted by reconciliation, and the server remains the
//! arbiter of conflicting writes.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use trellis_proto::{LockHolder, NodeId, SessionId};

/// Snapshot of who is editing which node.
#[derive(Debug, Clone)]
pub struct LockTracker {
	local: SessionId,
	locks: FxHashMap<NodeId, LockHolder>,
}

impl LockTracker {
	/// Creates an empty table for the given local session.
	pub fn new(local: SessionId) -> Self {
		Self {
			local,
			locks: FxHashMap::default(),
		}
	}

	/// Replaces the whole table with a server snapshot.
	pub fn locks_updated(&mut self, snapshot: BTreeMap<NodeId, LockHolder>) {
		tracing::trace!(count = snapshot.len(), "lock snapshot applied");
		self.locks = snapshot.into_iter().collect();
	}

	/// Returns true if a collaborator other than the local session holds the node.
	pub fn is_locked(&self, node: NodeId) -> bool {
		self.locks
			.get(&node)
			.is_some_and(|holder| holder.session != self.local)
	}

	/// Returns the holder if it blocks local edits of `node`.
	pub fn blocking_holder(&self, node: NodeId) -> Option<&LockHolder> {
		self.locks
			.get(&node)
			.filter(|holder| holder.session != self.local)
	}

	/// Returns true if the local session holds the node.
	pub fn is_held_locally(&self, node: NodeId) -> bool {
		self.locks
			.get(&node)
			.is_some_and(|holder| holder.session == self.local)
	}

	/// Iterates all entries in unspecified order.
	pub fn iter(&self) -> impl Iterator<Item = (NodeId, &LockHolder)> {
		self.locks.iter().map(|(node, holder)| (*node, holder))
	}

	/// Drops the entry for a node that no longer exists, until the next
	/// snapshot says otherwise.
	pub fn forget(&mut self, node: NodeId) {
		if self.locks.remove(&node).is_some() {
			tracing::trace!(%node, "lock dropped with its node");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn holder(session: u64, name: &str) -> LockHolder {
		LockHolder {
			session: SessionId(session),
			name: name.to_string(),
			color: None,
		}
	}

	#[test]
	fn own_locks_do_not_block() {
		let mut tracker = LockTracker::new(SessionId(1));
		tracker.locks_updated(BTreeMap::from([
			(NodeId(10), holder(1, "me")),
			(NodeId(11), holder(2, "ana")),
		]));

		assert!(!tracker.is_locked(NodeId(10)));
		assert!(tracker.is_held_locally(NodeId(10)));
		assert!(tracker.is_locked(NodeId(11)));
		assert_eq!(tracker.blocking_holder(NodeId(11)).map(|h| h.name.as_str()), Some("ana"));
		assert!(!tracker.is_locked(NodeId(12)));
	}

	#[test]
	fn snapshot_replaces_previous_table() {
		let mut tracker = LockTracker::new(SessionId(1));
		tracker.locks_updated(BTreeMap::from([(NodeId(11), holder(2, "ana"))]));
		tracker.locks_updated(BTreeMap::from([(NodeId(12), holder(3, "bo"))]));

		assert!(!tracker.is_locked(NodeId(11)), "absent from snapshot means unlocked");
		assert!(tracker.is_locked(NodeId(12)));
		assert_eq!(tracker.iter().count(), 1);
	}

	#[test]
	fn forgotten_node_is_editable() {
		let mut tracker = LockTracker::new(SessionId(1));
		tracker.locks_updated(BTreeMap::from([(NodeId(11), holder(2, "ana"))]));
		tracker.forget(NodeId(11));
		tracker.forget(NodeId(11));

		assert!(!tracker.is_locked(NodeId(11)));
		assert_eq!(tracker.iter().count(), 0);
	}
}
