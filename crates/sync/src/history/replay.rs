//! Expected echoes of undo/redo mutations.
//!
//! The protocol does not distinguish a replayed mutation from a fresh edit, so
//! the server echoes it back like any other. Before an undo or redo emits its
//! mutation it registers the echo it expects here; the reconciliation layer
//! consumes a matching self-originated echo instead of recording it.
//!
//! The server may reject a replayed write, in which case no echo ever comes.
//! An expectation therefore carries the payload it was sent with and a
//! deadline: a self echo only matches if its payload agrees, and an
//! expectation past its deadline matches nothing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;
use trellis_proto::NodeId;

/// History-relevant echo a replayed mutation produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EchoKey {
	/// `node_removed` after a replayed `delete_node`.
	Removed(NodeId),
	/// `node_restored` after a replayed `restore_node`.
	Restored(NodeId),
	/// `node_data_changed` after a replayed `update_node`.
	DataChanged(NodeId),
	/// `flow_meta_changed` after a replayed `update_flow_meta`.
	MetaChanged(String),
}

#[derive(Debug, Clone)]
struct Expected {
	/// Value the echo must carry; `None` matches any echo under the key.
	payload: Option<Value>,
	deadline: Instant,
}

impl Expected {
	fn matches(&self, payload: Option<&Value>) -> bool {
		match (&self.payload, payload) {
			(Some(want), Some(got)) => want == got,
			_ => true,
		}
	}
}

/// Outstanding echoes per key, oldest first.
#[derive(Debug)]
pub struct ReplayTracker {
	expected: FxHashMap<EchoKey, VecDeque<Expected>>,
	ttl: Duration,
}

impl ReplayTracker {
	/// Creates an empty tracker whose expectations live for `ttl`.
	pub fn new(ttl: Duration) -> Self {
		Self {
			expected: FxHashMap::default(),
			ttl,
		}
	}

	/// Registers one expected echo sent at `now`.
	pub fn expect(&mut self, key: EchoKey, payload: Option<Value>, now: Instant) {
		self.expected.entry(key).or_default().push_back(Expected {
			payload,
			deadline: now + self.ttl,
		});
	}

	/// Consumes the oldest live expectation under `key` whose payload agrees.
	///
	/// Returns false if none matched. Expired expectations under `key` are
	/// dropped on the way.
	pub fn consume(&mut self, key: &EchoKey, payload: Option<&Value>, now: Instant) -> bool {
		let Some(queue) = self.expected.get_mut(key) else {
			return false;
		};
		let before = queue.len();
		queue.retain(|expected| expected.deadline >= now);
		if queue.len() < before {
			trace!(?key, expired = before - queue.len(), "unanswered replay expectations dropped");
		}

		let hit = queue
			.iter()
			.position(|expected| expected.matches(payload))
			.and_then(|index| queue.remove(index))
			.is_some();
		if queue.is_empty() {
			self.expected.remove(key);
		}
		hit
	}

	/// Drops every expectation past its deadline.
	pub fn expire(&mut self, now: Instant) {
		self.expected.retain(|_, queue| {
			queue.retain(|expected| expected.deadline >= now);
			!queue.is_empty()
		});
	}

	/// Total outstanding echoes, expired ones included until the next
	/// [`ReplayTracker::expire`].
	pub fn outstanding(&self) -> usize {
		self.expected.values().map(VecDeque::len).sum()
	}

	/// Forgets every outstanding echo.
	pub fn clear(&mut self) {
		self.expected.clear();
	}
}
