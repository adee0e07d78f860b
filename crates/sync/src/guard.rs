//! Scoped suppression of feedback while authoritative state is applied.
//!
//! A [`ScopeGuard`] is held for the duration of a reconciliation batch or a
//! bulk reload. Release happens in `Drop`, so early returns, `?` propagation
//! and unwinding panics all leave the session able to process later events.
//! Scopes nest; each kind keeps its own depth counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Which suppression scope is being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
	/// Server-driven changes are being applied to the mirror.
	RemoteApply,
	/// The whole mirror is being replaced from a snapshot.
	BulkReload,
	/// A node is being destroyed and recreated to change its sockets.
	Rebuild,
}

/// Who caused a mirror change, as seen by edit listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
	/// The local user, through a session edit method.
	Local,
	/// An inbound event from the server.
	Remote,
	/// A full snapshot reload.
	Reload,
	/// Detach and reattach steps of a structural rebuild.
	Rebuild,
}

/// Depth counters for the suppression scopes of one session.
#[derive(Debug, Clone, Default)]
pub struct Suppression {
	remote: Arc<AtomicUsize>,
	reload: Arc<AtomicUsize>,
	rebuild: Arc<AtomicUsize>,
}

impl Suppression {
	/// Creates counters with no scope held.
	pub fn new() -> Self {
		Self::default()
	}

	/// Enters a scope; it is left when the returned guard drops.
	pub fn enter(&self, kind: ScopeKind) -> ScopeGuard {
		let counter = match kind {
			ScopeKind::RemoteApply => &self.remote,
			ScopeKind::BulkReload => &self.reload,
			ScopeKind::Rebuild => &self.rebuild,
		};
		counter.fetch_add(1, Ordering::AcqRel);
		ScopeGuard {
			kind,
			counter: Arc::clone(counter),
		}
	}

	/// Returns true while any remote-apply scope is held.
	pub fn is_applying_remote(&self) -> bool {
		self.remote.load(Ordering::Acquire) > 0
	}

	/// Returns true while any bulk-reload scope is held.
	pub fn is_reloading(&self) -> bool {
		self.reload.load(Ordering::Acquire) > 0
	}

	/// Returns true while a structural rebuild is in progress.
	pub fn is_rebuilding(&self) -> bool {
		self.rebuild.load(Ordering::Acquire) > 0
	}

	/// Returns true while any scope is held. Local edit entry points do
	/// nothing in that state.
	pub fn is_suppressed(&self) -> bool {
		self.is_applying_remote() || self.is_reloading() || self.is_rebuilding()
	}

	/// Classifies a change made right now.
	pub fn origin(&self) -> ChangeOrigin {
		if self.is_reloading() {
			ChangeOrigin::Reload
		} else if self.is_applying_remote() {
			ChangeOrigin::Remote
		} else if self.is_rebuilding() {
			ChangeOrigin::Rebuild
		} else {
			ChangeOrigin::Local
		}
	}
}

/// Held suppression scope. Dropping it leaves the scope.
#[derive(Debug)]
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard {
	kind: ScopeKind,
	counter: Arc<AtomicUsize>,
}

impl ScopeGuard {
	/// Kind of the held scope.
	pub fn kind(&self) -> ScopeKind {
		self.kind
	}
}

impl Drop for ScopeGuard {
	fn drop(&mut self) {
		self.counter.fetch_sub(1, Ordering::AcqRel);
	}
}
