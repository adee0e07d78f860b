//! Debugger overlay state.
//!
//! Each debugger step carries the new current node, its status, and the full
//! path executed so far. Applying a step never depends on earlier steps having
//! been seen, so a session that missed events or reconnected resynchronizes
//! from the next one.

use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use trellis_proto::{DebugStatus, NodeId};

/// Debug highlight of one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugMark {
	/// Not touched by the current run.
	#[default]
	None,
	/// Execution is here.
	Current,
	/// Execution passed through.
	Visited,
	/// Execution is waiting for user input here.
	WaitingInput,
	/// Execution ended here.
	Finished,
	/// Execution failed here.
	Error,
}

impl From<DebugStatus> for DebugMark {
	fn from(status: DebugStatus) -> Self {
		match status {
			DebugStatus::Current => Self::Current,
			DebugStatus::WaitingInput => Self::WaitingInput,
			DebugStatus::Finished => Self::Finished,
			DebugStatus::Error => Self::Error,
		}
	}
}

/// Per-node debug marks plus the orthogonal breakpoint set.
#[derive(Debug)]
pub struct DebugView {
	marks: FxHashMap<NodeId, DebugMark>,
	breakpoints: FxHashSet<NodeId>,
	current: Option<NodeId>,
	/// `waiting_input` nodes that execution left, with the instant they turn visited.
	held: Vec<(NodeId, Instant)>,
	hold: Duration,
}

impl DebugView {
	/// Creates an empty overlay. `hold` is how long a `waiting_input` mark
	/// survives after execution moves on.
	pub fn new(hold: Duration) -> Self {
		Self {
			marks: FxHashMap::default(),
			breakpoints: FxHashSet::default(),
			current: None,
			held: Vec::new(),
			hold,
		}
	}

	/// Mark of a node; unmarked nodes report [`DebugMark::None`].
	pub fn mark(&self, node: NodeId) -> DebugMark {
		self.marks.get(&node).copied().unwrap_or_default()
	}

	/// Node execution is currently at.
	pub fn current(&self) -> Option<NodeId> {
		self.current
	}

	/// Iterates marked nodes in unspecified order.
	pub fn marks(&self) -> impl Iterator<Item = (NodeId, DebugMark)> + '_ {
		self.marks.iter().map(|(node, mark)| (*node, *mark))
	}

	/// Applies one debugger step.
	pub fn highlight(&mut self, node: NodeId, status: DebugStatus, path: &[NodeId], now: Instant) {
		if let Some(previous) = self.current.take()
			&& previous != node
		{
			match self.mark(previous) {
				DebugMark::WaitingInput => self.held.push((previous, now + self.hold)),
				_ => {
					self.marks.insert(previous, DebugMark::Visited);
				}
			}
		}

		for &step in path {
			if step != node && self.mark(step) == DebugMark::None {
				self.marks.insert(step, DebugMark::Visited);
			}
		}

		self.held.retain(|(held, _)| *held != node);
		self.marks.insert(node, status.into());
		self.current = Some(node);
		tracing::trace!(%node, ?status, path = path.len(), "debug step");
	}

	/// Turns expired `waiting_input` holds into visited marks. Returns true if
	/// any mark changed.
	pub fn tick(&mut self, now: Instant) -> bool {
		let mut changed = false;
		let marks = &mut self.marks;
		self.held.retain(|&(node, deadline)| {
			if deadline > now {
				return true;
			}
			if let Some(mark) = marks.get_mut(&node)
				&& *mark == DebugMark::WaitingInput
			{
				*mark = DebugMark::Visited;
				changed = true;
			}
			false
		});
		changed
	}

	/// Earliest pending hold expiry.
	pub fn next_deadline(&self) -> Option<Instant> {
		self.held.iter().map(|(_, deadline)| *deadline).min()
	}

	/// Resets every mark. Breakpoints are kept.
	pub fn clear(&mut self) {
		self.marks.clear();
		self.held.clear();
		self.current = None;
	}

	/// Returns true if the node has a breakpoint.
	pub fn has_breakpoint(&self, node: NodeId) -> bool {
		self.breakpoints.contains(&node)
	}

	/// Iterates nodes carrying a breakpoint.
	pub fn breakpoints(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.breakpoints.iter().copied()
	}

	/// Flips the breakpoint on a node and returns the new state.
	pub fn toggle_breakpoint(&mut self, node: NodeId) -> bool {
		if self.breakpoints.remove(&node) {
			false
		} else {
			self.breakpoints.insert(node);
			true
		}
	}

	/// Drops marks and breakpoint of a removed node.
	pub fn forget(&mut self, node: NodeId) {
		self.marks.remove(&node);
		self.breakpoints.remove(&node);
		self.held.retain(|(held, _)| *held != node);
		if self.current == Some(node) {
			self.current = None;
		}
	}

	/// Keeps state only for nodes accepted by `live`.
	pub fn retain(&mut self, mut live: impl FnMut(NodeId) -> bool) {
		self.marks.retain(|node, _| live(*node));
		self.breakpoints.retain(|node| live(*node));
		self.held.retain(|(node, _)| live(*node));
		if let Some(current) = self.current
			&& !live(current)
		{
			self.current = None;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const HOLD: Duration = Duration::from_millis(600);

	fn ids(raw: &[u64]) -> Vec<NodeId> {
		raw.iter().copied().map(NodeId).collect()
	}

	#[test]
	fn full_path_resynchronizes_after_clear() {
		let now = Instant::now();
		let mut view = DebugView::new(HOLD);
		view.highlight(NodeId(9), DebugStatus::Current, &[], now);
		view.clear();

		view.highlight(NodeId(5), DebugStatus::Current, &ids(&[1, 2, 3, 4]), now);

		for node in ids(&[1, 2, 3, 4]) {
			assert_eq!(view.mark(node), DebugMark::Visited, "{node}");
		}
		assert_eq!(view.mark(NodeId(5)), DebugMark::Current);
		assert_eq!(view.mark(NodeId(9)), DebugMark::None);
	}

	#[test]
	fn previous_current_becomes_visited() {
		let now = Instant::now();
		let mut view = DebugView::new(HOLD);
		view.highlight(NodeId(1), DebugStatus::Current, &ids(&[1]), now);
		view.highlight(NodeId(2), DebugStatus::Finished, &ids(&[1, 2]), now);

		assert_eq!(view.mark(NodeId(1)), DebugMark::Visited);
		assert_eq!(view.mark(NodeId(2)), DebugMark::Finished);
		assert_eq!(view.current(), Some(NodeId(2)));
	}

	#[test]
	fn waiting_input_is_held_before_turning_visited() {
		let start = Instant::now();
		let mut view = DebugView::new(HOLD);
		view.highlight(NodeId(1), DebugStatus::WaitingInput, &[], start);
		view.highlight(NodeId(2), DebugStatus::Current, &ids(&[1]), start);

		assert_eq!(view.mark(NodeId(1)), DebugMark::WaitingInput);
		assert_eq!(view.next_deadline(), Some(start + HOLD));
		assert!(!view.tick(start + Duration::from_millis(599)));

		assert!(view.tick(start + HOLD));
		assert_eq!(view.mark(NodeId(1)), DebugMark::Visited);
		assert_eq!(view.next_deadline(), None);
	}

	#[test]
	fn clear_keeps_breakpoints() {
		let now = Instant::now();
		let mut view = DebugView::new(HOLD);
		assert!(view.toggle_breakpoint(NodeId(3)));
		view.highlight(NodeId(3), DebugStatus::Error, &[], now);

		view.clear();
		assert_eq!(view.mark(NodeId(3)), DebugMark::None);
		assert!(view.has_breakpoint(NodeId(3)));

		assert!(!view.toggle_breakpoint(NodeId(3)));
		assert!(!view.has_breakpoint(NodeId(3)));
	}

	#[test]
	fn forgotten_nodes_lose_breakpoints() {
		let mut view = DebugView::new(HOLD);
		view.toggle_breakpoint(NodeId(1));
		view.toggle_breakpoint(NodeId(2));

		view.forget(NodeId(1));
		view.retain(|node| node != NodeId(2));
		assert_eq!(view.breakpoints().count(), 0);
	}
}
