//! Per-node debounce of drag moves.
//!
//! A drag produces a position per frame; only the last one within the delay
//! goes out. Each node has at most one pending slot. The queue is driven by
//! explicit instants so the session loop owns the clock.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use trellis_proto::{ClientEvent, NodeId, Position};

#[derive(Debug, Clone, Copy)]
struct PendingMove {
	position: Position,
	deadline: Instant,
}

/// Rate limiter turning drag streams into one `node_moved` per node.
#[derive(Debug, Clone)]
pub struct MoveDebouncer {
	delay: Duration,
	pending: FxHashMap<NodeId, PendingMove>,
}

impl MoveDebouncer {
	/// Creates an empty queue with the given delay.
	pub fn new(delay: Duration) -> Self {
		Self {
			delay,
			pending: FxHashMap::default(),
		}
	}

	/// Replaces any pending move for `node` and re-arms its timer.
	pub fn schedule(&mut self, node: NodeId, position: Position, now: Instant) {
		self.pending.insert(
			node,
			PendingMove {
				position,
				deadline: now + self.delay,
			},
		);
	}

	/// Drops the pending move for `node`. Returns true if one was armed.
	pub fn cancel(&mut self, node: NodeId) -> bool {
		let cancelled = self.pending.remove(&node).is_some();
		if cancelled {
			tracing::trace!(%node, "pending move cancelled");
		}
		cancelled
	}

	/// Drops every pending move.
	pub fn clear(&mut self) {
		self.pending.clear();
	}

	/// Returns true if a move for `node` is armed.
	pub fn is_pending(&self, node: NodeId) -> bool {
		self.pending.contains_key(&node)
	}

	/// Number of armed moves.
	pub fn len(&self) -> usize {
		self.pending.len()
	}

	/// Returns true if nothing is armed.
	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}

	/// Earliest deadline among armed moves.
	pub fn next_deadline(&self) -> Option<Instant> {
		self.pending.values().map(|p| p.deadline).min()
	}

	/// Emits one `node_moved` per expired slot, ordered by deadline, and
	/// clears those slots.
	pub fn poll_due(&mut self, now: Instant) -> Vec<ClientEvent> {
		let mut due: Vec<(NodeId, PendingMove)> = self
			.pending
			.iter()
			.filter(|(_, p)| p.deadline <= now)
			.map(|(node, p)| (*node, *p))
			.collect();
		due.sort_by_key(|(node, p)| (p.deadline, *node));

		due.into_iter()
			.map(|(id, p)| {
				self.pending.remove(&id);
				ClientEvent::NodeMoved {
					id,
					x: p.position.x,
					y: p.position.y,
				}
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const DELAY: Duration = Duration::from_millis(300);

	#[test]
	fn burst_emits_latest_position_once() {
		let start = Instant::now();
		let mut queue = MoveDebouncer::new(DELAY);
		for step in 0..10u64 {
			let at = start + Duration::from_millis(step * 20);
			queue.schedule(NodeId(1), Position::new(step as f64, 0.0), at);
		}

		let last_arm = start + Duration::from_millis(180);
		assert!(queue.poll_due(last_arm + Duration::from_millis(299)).is_empty());

		let emitted = queue.poll_due(last_arm + DELAY);
		assert_eq!(
			emitted,
			vec![ClientEvent::NodeMoved {
				id: NodeId(1),
				x: 9.0,
				y: 0.0,
			}]
		);
		assert!(queue.is_empty());
		assert!(queue.poll_due(last_arm + DELAY * 4).is_empty());
	}

	#[test]
	fn cancel_prevents_emission() {
		let start = Instant::now();
		let mut queue = MoveDebouncer::new(DELAY);
		queue.schedule(NodeId(1), Position::new(1.0, 1.0), start);
		queue.schedule(NodeId(2), Position::new(2.0, 2.0), start);

		assert!(queue.cancel(NodeId(1)));
		assert!(!queue.cancel(NodeId(1)));

		let emitted = queue.poll_due(start + DELAY);
		assert_eq!(emitted.len(), 1);
		assert_eq!(emitted[0].target_node(), Some(NodeId(2)));
	}

	#[test]
	fn nodes_have_independent_timers() {
		let start = Instant::now();
		let mut queue = MoveDebouncer::new(DELAY);
		queue.schedule(NodeId(1), Position::default(), start);
		queue.schedule(NodeId(2), Position::default(), start + Duration::from_millis(200));

		assert_eq!(queue.next_deadline(), Some(start + DELAY));
		assert_eq!(queue.poll_due(start + DELAY).len(), 1);
		assert!(queue.is_pending(NodeId(2)));
		assert_eq!(queue.next_deadline(), Some(start + Duration::from_millis(500)));
	}
}
