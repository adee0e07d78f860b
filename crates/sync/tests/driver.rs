#![allow(unused_crate_dependencies)]

use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use trellis_proto::{
	ClientEvent, ConnectionId, ConnectionRecord, Endpoint, Inbound, NodeId, NodeRecord, NodeType, Position,
	ServerEvent, SessionId,
};
use trellis_sync::{DriverExit, Session, SessionCommand, SessionConfig, SessionDriver};

struct Harness {
	inbound: mpsc::Sender<Inbound>,
	commands: mpsc::Sender<SessionCommand>,
	outbound: mpsc::Receiver<ClientEvent>,
	cancel: CancellationToken,
	task: tokio::task::JoinHandle<(Session, DriverExit)>,
}

fn spawn_driver() -> Harness {
	spawn_driver_with_transport(16)
}

fn spawn_driver_with_transport(capacity: usize) -> Harness {
	let _ = tracing_subscriber::fmt::try_init();
	let (inbound_tx, inbound_rx) = mpsc::channel(16);
	let (command_tx, command_rx) = mpsc::channel(16);
	let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
	let cancel = CancellationToken::new();

	let session = Session::new(SessionConfig::for_session(SessionId(1)));
	let driver = SessionDriver::new(session, inbound_rx, command_rx, outbound_tx, cancel.clone());
	Harness {
		inbound: inbound_tx,
		commands: command_tx,
		outbound: outbound_rx,
		cancel,
		task: tokio::spawn(driver.run()),
	}
}

fn record(id: u64, node_type: NodeType) -> NodeRecord {
	NodeRecord {
		id: NodeId(id),
		node_type,
		data: Value::Null,
		position: Position::default(),
	}
}

async fn load_pair(harness: &Harness) {
	harness
		.inbound
		.send(Inbound::remote(ServerEvent::FlowUpdated {
			nodes: vec![record(1, NodeType::Start), record(2, NodeType::End)],
			connections: vec![ConnectionRecord {
				id: Some(ConnectionId(5)),
				source: Endpoint::new(NodeId(1), "out"),
				target: Endpoint::new(NodeId(2), "in"),
				label: None,
				condition: None,
			}],
		}))
		.await
		.unwrap();
}

fn drag(id: u64, x: f64) -> SessionCommand {
	SessionCommand::Move {
		id: NodeId(id),
		position: Position::new(x, 0.0),
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn drag_burst_sends_one_move_after_debounce() {
	let mut harness = spawn_driver();
	load_pair(&harness).await;
	for x in [1.0, 2.0, 3.0] {
		harness.commands.send(drag(2, x)).await.unwrap();
	}

	let early = timeout(Duration::from_millis(299), harness.outbound.recv()).await;
	assert!(early.is_err(), "move sent before the debounce elapsed");

	let sent = harness.outbound.recv().await.unwrap();
	assert_eq!(
		sent,
		ClientEvent::NodeMoved {
			id: NodeId(2),
			x: 3.0,
			y: 0.0,
		}
	);

	harness.cancel.cancel();
	let (_, exit) = harness.task.await.unwrap();
	assert_eq!(exit, DriverExit::Cancelled);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn delete_before_debounce_sends_no_move() {
	let mut harness = spawn_driver();
	load_pair(&harness).await;
	harness.commands.send(drag(2, 9.0)).await.unwrap();
	tokio::time::advance(Duration::from_millis(100)).await;
	harness.commands.send(SessionCommand::DeleteNode(NodeId(2))).await.unwrap();

	assert_eq!(
		harness.outbound.recv().await.unwrap(),
		ClientEvent::DeleteNode { id: NodeId(2) }
	);
	let late = timeout(Duration::from_secs(2), harness.outbound.recv()).await;
	assert!(late.is_err(), "cancelled move must not be sent");

	harness.cancel.cancel();
	harness.task.await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn refused_edit_sends_nothing() {
	let mut harness = spawn_driver();
	load_pair(&harness).await;
	harness
		.commands
		.send(SessionCommand::UpdateNode {
			id: NodeId(42),
			data: json!({}),
		})
		.await
		.unwrap();
	harness.commands.send(SessionCommand::Undo).await.unwrap();

	let nothing = timeout(Duration::from_secs(1), harness.outbound.recv()).await;
	assert!(nothing.is_err());

	harness.cancel.cancel();
	harness.task.await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn snapshot_reflects_applied_events() {
	let harness = spawn_driver();
	load_pair(&harness).await;
	harness
		.inbound
		.send(Inbound::remote(ServerEvent::ConnectionRemoved { id: ConnectionId(5) }))
		.await
		.unwrap();

	let (reply, snapshot) = oneshot::channel();
	harness.commands.send(SessionCommand::Snapshot(reply)).await.unwrap();
	let snapshot = snapshot.await.unwrap();
	assert_eq!(snapshot.nodes.len(), 2);
	assert!(snapshot.connections.is_empty());

	harness.cancel.cancel();
	harness.task.await.unwrap();
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn closing_inbound_returns_session() {
	let Harness {
		inbound,
		commands,
		outbound: _outbound,
		cancel: _cancel,
		task,
	} = spawn_driver();
	inbound
		.send(Inbound::remote(ServerEvent::NodeAdded {
			node: record(3, NodeType::Dialogue),
		}))
		.await
		.unwrap();
	drop(commands);
	drop(inbound);

	let (session, exit) = task.await.unwrap();
	assert_eq!(exit, DriverExit::InboundClosed);
	assert!(session.mirror().contains_node(NodeId(3)));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropped_transport_stops_driver() {
	let Harness {
		inbound: _inbound,
		commands,
		outbound,
		cancel: _cancel,
		task,
	} = spawn_driver();
	drop(outbound);
	commands
		.send(SessionCommand::CreateNode {
			node_type: NodeType::Action,
			data: Value::Null,
			position: Position::default(),
		})
		.await
		.unwrap();

	let (_, exit) = task.await.unwrap();
	assert_eq!(exit, DriverExit::OutboundClosed);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn full_transport_does_not_stall_reconciliation() {
	let mut harness = spawn_driver_with_transport(1);
	for title in ["a", "ab", "abc"] {
		harness
			.commands
			.send(SessionCommand::UpdateFlowMeta {
				field: "title".into(),
				value: json!(title),
			})
			.await
			.unwrap();
	}
	harness
		.inbound
		.send(Inbound::remote(ServerEvent::NodeAdded {
			node: record(4, NodeType::Dialogue),
		}))
		.await
		.unwrap();

	let (reply, snapshot) = oneshot::channel();
	harness.commands.send(SessionCommand::Snapshot(reply)).await.unwrap();
	let snapshot = timeout(Duration::from_secs(1), snapshot).await.unwrap().unwrap();
	assert_eq!(snapshot.nodes.len(), 1);
	assert_eq!(snapshot.meta["title"], json!("abc"));

	let mut titles = Vec::new();
	for _ in 0..3 {
		match harness.outbound.recv().await.unwrap() {
			ClientEvent::UpdateFlowMeta { value, .. } => titles.push(value),
			other => panic!("unexpected outbound {other:?}"),
		}
	}
	assert_eq!(titles, vec![json!("a"), json!("ab"), json!("abc")]);

	harness.cancel.cancel();
	harness.task.await.unwrap();
}
