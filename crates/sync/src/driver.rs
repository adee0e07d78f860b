//! Async event loop owning one [`Session`].
//!
//! The driver is the only task that touches the session. It multiplexes
//! server broadcasts, local user commands, and the earliest session timer
//! (debounced moves, debug holds), and forwards every outbound mutation to the
//! transport channel. The clock is tokio's, so paused-time tests drive it.
//!
//! Outbound mutations wait in an in-order outbox and are flushed as channel
//! capacity frees up, so a slow transport never stalls reconciliation.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use trellis_proto::{ClientEvent, ConnectionId, Endpoint, Inbound, NodeId, NodeType, Position};

use crate::error::EditError;
use crate::session::{Session, SessionSnapshot};

/// A local user intent delivered to the driver.
#[derive(Debug)]
pub enum SessionCommand {
	/// Drag step for a node.
	Move {
		/// Dragged node.
		id: NodeId,
		/// Position under the pointer.
		position: Position,
	},
	/// Replace a node payload.
	UpdateNode {
		/// Edited node.
		id: NodeId,
		/// New payload.
		data: Value,
	},
	/// Delete a node.
	DeleteNode(NodeId),
	/// Copy a node.
	DuplicateNode(NodeId),
	/// Create a node.
	CreateNode {
		/// Kind of node.
		node_type: NodeType,
		/// Initial payload.
		data: Value,
		/// Drop position.
		position: Position,
	},
	/// Connect two sockets.
	Connect {
		/// Output side.
		source: Endpoint,
		/// Input side.
		target: Endpoint,
		/// Display label.
		label: Option<String>,
		/// Guard expression.
		condition: Option<String>,
	},
	/// Remove a connection.
	Disconnect(ConnectionId),
	/// Change connection metadata.
	UpdateConnection {
		/// Edited connection.
		id: ConnectionId,
		/// New label.
		label: Option<String>,
		/// New guard expression.
		condition: Option<String>,
	},
	/// Change a document metadata field.
	UpdateFlowMeta {
		/// Field name.
		field: String,
		/// New value.
		value: Value,
	},
	/// Start editing a node.
	RequestLock(NodeId),
	/// Stop editing a node.
	ReleaseLock(NodeId),
	/// Flip a breakpoint.
	ToggleBreakpoint(NodeId),
	/// Undo the last action.
	Undo,
	/// Redo the last undone action.
	Redo,
	/// Report the current session state.
	Snapshot(oneshot::Sender<SessionSnapshot>),
}

impl SessionCommand {
	/// Runs the command against a session and returns what must be sent.
	pub fn execute(self, session: &mut Session, now: std::time::Instant) -> Result<Option<ClientEvent>, EditError> {
		match self {
			Self::Move { id, position } => session.move_node(id, position, now).map(|()| None),
			Self::UpdateNode { id, data } => session.update_node_data(id, data),
			Self::DeleteNode(id) => session.delete_node(id),
			Self::DuplicateNode(id) => session.duplicate_node(id),
			Self::CreateNode {
				node_type,
				data,
				position,
			} => Ok(session.create_node(node_type, data, position)),
			Self::Connect {
				source,
				target,
				label,
				condition,
			} => session.connect(source, target, label, condition),
			Self::Disconnect(id) => session.disconnect(id),
			Self::UpdateConnection { id, label, condition } => session.update_connection(id, label, condition),
			Self::UpdateFlowMeta { field, value } => Ok(session.update_flow_meta(field, value)),
			Self::RequestLock(id) => session.request_lock(id),
			Self::ReleaseLock(id) => Ok(session.release_lock(id)),
			Self::ToggleBreakpoint(id) => session.toggle_breakpoint(id).map(Some),
			Self::Undo => session.undo(now),
			Self::Redo => session.redo(now),
			Self::Snapshot(reply) => {
				let _ = reply.send(session.snapshot());
				Ok(None)
			}
		}
	}
}

/// Why the driver loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
	/// The cancellation token fired.
	Cancelled,
	/// The server stream ended.
	InboundClosed,
	/// The transport stopped accepting outbound events.
	OutboundClosed,
}

/// Event loop for one session.
#[derive(Debug)]
pub struct SessionDriver {
	session: Session,
	inbound: mpsc::Receiver<Inbound>,
	commands: mpsc::Receiver<SessionCommand>,
	outbound: mpsc::Sender<ClientEvent>,
	cancel: CancellationToken,
}

impl SessionDriver {
	/// Wires a session to its channels.
	pub fn new(
		session: Session,
		inbound: mpsc::Receiver<Inbound>,
		commands: mpsc::Receiver<SessionCommand>,
		outbound: mpsc::Sender<ClientEvent>,
		cancel: CancellationToken,
	) -> Self {
		Self {
			session,
			inbound,
			commands,
			outbound,
			cancel,
		}
	}

	/// Runs until cancelled or a channel closes, then hands the session back.
	///
	/// A closed command channel is not fatal: the session keeps reconciling
	/// server state until the inbound stream ends.
	pub async fn run(self) -> (Session, DriverExit) {
		let Self {
			mut session,
			mut inbound,
			mut commands,
			outbound,
			cancel,
		} = self;
		let mut commands_open = true;
		let mut outbox: VecDeque<ClientEvent> = VecDeque::new();

		let exit = loop {
			let deadline = session.next_deadline();
			let wake = async move {
				match deadline {
					Some(at) => tokio::time::sleep_until(Instant::from_std(at)).await,
					None => std::future::pending::<()>().await,
				}
			};

			let sent = tokio::select! {
				biased;
				_ = cancel.cancelled() => break DriverExit::Cancelled,
				permit = outbound.reserve(), if !outbox.is_empty() => {
					let Ok(permit) = permit else {
						break DriverExit::OutboundClosed;
					};
					if let Some(event) = outbox.pop_front() {
						trace!(event = event.tag(), queued = outbox.len(), "outbound");
						permit.send(event);
					}
					Vec::new()
				}
				msg = inbound.recv() => {
					let Some(msg) = msg else {
						break DriverExit::InboundClosed;
					};
					let report = session.apply(msg, Instant::now().into_std());
					trace!(event = report.tag, history = ?report.history, "inbound applied");
					Vec::new()
				}
				cmd = commands.recv(), if commands_open => {
					match cmd {
						Some(cmd) => match cmd.execute(&mut session, Instant::now().into_std()) {
							Ok(event) => event.into_iter().collect(),
							Err(err) => {
								debug!(error = %err, "local edit refused");
								Vec::new()
							}
						},
						None => {
							commands_open = false;
							Vec::new()
						}
					}
				}
				() = wake => session.poll(Instant::now().into_std()),
			};

			outbox.extend(sent);
		};

		debug!(?exit, undelivered = outbox.len(), "session driver stopped");
		(session, exit)
	}
}
