use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use trellis_proto::{ConnectionId, ConnectionRecord, Endpoint, NodeId, NodeRecord, NodeType, Position};

use super::{ConnectionInsert, GraphMirror, MirrorChange, NodeInsert, NodeUpdate};
use crate::error::SyncError;
use crate::guard::{ChangeOrigin, ScopeKind, Suppression};
use crate::schema::FlowRenderer;

fn mirror() -> GraphMirror {
	GraphMirror::new(Arc::new(FlowRenderer), Suppression::new())
}

fn node(id: u64, node_type: NodeType, data: Value) -> NodeRecord {
	NodeRecord {
		id: NodeId(id),
		node_type,
		data,
		position: Position::new(id as f64 * 10.0, 0.0),
	}
}

fn link(id: Option<u64>, from: u64, out: &str, to: u64, label: Option<&str>) -> ConnectionRecord {
	ConnectionRecord {
		id: id.map(ConnectionId),
		source: Endpoint::new(NodeId(from), out),
		target: Endpoint::new(NodeId(to), "in"),
		label: label.map(str::to_string),
		condition: None,
	}
}

fn choices(ids: &[u64]) -> Value {
	json!({ "choices": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>() })
}

#[test]
fn duplicate_route_merges_metadata() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Start, Value::Null));
	mirror.add_node(node(2, NodeType::Dialogue, json!({ "text": "hi" })));

	let optimistic = mirror.add_connection(link(None, 1, "out", 2, Some("draft"))).unwrap();
	assert!(matches!(optimistic, ConnectionInsert::Inserted(_)));

	let echo = mirror.add_connection(link(Some(9), 1, "out", 2, Some("final"))).unwrap();
	assert_eq!(echo, ConnectionInsert::Merged(optimistic.key()));

	let again = mirror.add_connection(link(Some(9), 1, "out", 2, Some("final"))).unwrap();
	assert_eq!(again, ConnectionInsert::Merged(optimistic.key()));

	assert_eq!(mirror.connection_count(), 1);
	let stored = mirror.connection(optimistic.key()).unwrap();
	assert_eq!(stored.id, Some(ConnectionId(9)));
	assert_eq!(stored.label.as_deref(), Some("final"));
}

#[test]
fn removing_node_drops_touching_connections() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Start, Value::Null));
	mirror.add_node(node(2, NodeType::Dialogue, Value::Null));
	mirror.add_node(node(3, NodeType::End, Value::Null));
	mirror.add_connection(link(Some(1), 1, "out", 2, None)).unwrap();
	mirror.add_connection(link(Some(2), 2, "out", 3, None)).unwrap();

	let removed = mirror.remove_node(NodeId(2)).unwrap();
	assert_eq!(removed.connections.len(), 2);
	assert_eq!(mirror.connection_count(), 0);
	assert!(mirror.check_integrity().is_ok());

	assert!(mirror.remove_node(NodeId(2)).is_none(), "second removal is a no-op");
}

#[test]
fn duplicate_node_add_refreshes_in_place() {
	let mut mirror = mirror();
	assert_eq!(mirror.add_node(node(1, NodeType::Dialogue, json!({ "text": "a" }))), NodeInsert::Inserted);

	let mut again = node(1, NodeType::Dialogue, json!({ "text": "b" }));
	again.position = Position::new(5.0, 6.0);
	assert_eq!(mirror.add_node(again), NodeInsert::Refreshed);

	let stored = mirror.node(NodeId(1)).unwrap();
	assert_eq!(stored.record.data, json!({ "text": "b" }));
	assert_eq!(stored.record.position, Position::new(5.0, 6.0));
	assert_eq!(mirror.node_count(), 1);
}

#[test]
fn duplicate_node_add_with_new_type_rebuilds() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Start, Value::Null));
	mirror.add_node(node(2, NodeType::Dialogue, Value::Null));
	mirror.add_node(node(3, NodeType::End, Value::Null));
	mirror.add_connection(link(Some(10), 1, "out", 2, None)).unwrap();
	mirror.add_connection(link(Some(11), 2, "out", 3, None)).unwrap();
	mirror.drain_changes();

	assert_eq!(mirror.add_node(node(2, NodeType::Condition, Value::Null)), NodeInsert::Refreshed);

	let stored = mirror.node(NodeId(2)).unwrap();
	assert_eq!(stored.record.node_type, NodeType::Condition);
	assert!(stored.sockets.has_output("true"));
	assert!(!stored.sockets.has_output("out"));
	assert_eq!(mirror.connection_count(), 1, "only the incoming connection fits");
	assert!(mirror.check_integrity().is_ok());
	assert!(
		mirror
			.drain_changes()
			.iter()
			.any(|change| change.change == MirrorChange::NodeRebuilt(NodeId(2)))
	);
}

#[test]
fn connection_to_missing_socket_is_rejected() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Condition, Value::Null));
	mirror.add_node(node(2, NodeType::End, Value::Null));

	let err = mirror.add_connection(link(None, 1, "out", 2, None)).unwrap_err();
	assert_eq!(
		err,
		SyncError::UnknownSocket {
			node: NodeId(1),
			socket: "out".to_string(),
			direction: "output",
		}
	);

	let err = mirror.add_connection(link(None, 1, "true", 7, None)).unwrap_err();
	assert_eq!(err, SyncError::UnknownNode(NodeId(7)));
	assert_eq!(mirror.connection_count(), 0);
}

#[test]
fn rebuild_keeps_connections_on_surviving_sockets() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Start, Value::Null));
	mirror.add_node(node(2, NodeType::Choice, choices(&[1, 2])));
	mirror.add_node(node(3, NodeType::End, Value::Null));
	mirror.add_node(node(4, NodeType::End, Value::Null));
	let incoming = link(Some(10), 1, "out", 2, Some("enter"));
	let first = link(Some(11), 2, "choice_1", 3, Some("yes"));
	let second = link(Some(12), 2, "choice_2", 4, Some("no"));
	for record in [&incoming, &first, &second] {
		mirror.add_connection(record.clone()).unwrap();
	}
	let position = mirror.node(NodeId(2)).unwrap().record.position;

	let update = mirror.update_node_data(NodeId(2), choices(&[1, 2, 3])).unwrap();
	let NodeUpdate::Rebuilt(report) = update else {
		panic!("adding a choice must rebuild, got {update:?}");
	};
	assert_eq!(report.kept.len(), 3);
	assert!(report.dropped.is_empty());

	let rebuilt = mirror.node(NodeId(2)).unwrap();
	assert_eq!(rebuilt.record.position, position);
	assert!(rebuilt.sockets.has_output("choice_3"));

	let mut after: Vec<ConnectionRecord> = mirror.connections().map(|(_, r)| r.clone()).collect();
	after.sort_by_key(|r| r.id);
	assert_eq!(after, vec![incoming, first, second]);
}

#[test]
fn rebuild_drops_connection_on_vanished_socket() {
	let mut mirror = mirror();
	mirror.add_node(node(2, NodeType::Choice, choices(&[1, 2])));
	mirror.add_node(node(3, NodeType::End, Value::Null));
	mirror.add_node(node(4, NodeType::End, Value::Null));
	mirror.add_connection(link(Some(11), 2, "choice_1", 3, None)).unwrap();
	mirror.add_connection(link(Some(12), 2, "choice_2", 4, None)).unwrap();

	let report = mirror.rebuild_node(NodeId(2), choices(&[1])).unwrap();
	assert_eq!(report.kept.len(), 1);
	assert_eq!(report.dropped.len(), 1);
	assert_eq!(report.dropped[0].id, Some(ConnectionId(12)));
	assert!(mirror.check_integrity().is_ok());
}

#[test]
fn rebuild_never_reports_removal() {
	let mut mirror = mirror();
	mirror.add_node(node(2, NodeType::Choice, choices(&[1])));
	mirror.add_node(node(3, NodeType::End, Value::Null));
	mirror.add_connection(link(Some(11), 2, "choice_1", 3, None)).unwrap();
	mirror.drain_changes();

	mirror.update_node_data(NodeId(2), choices(&[1, 2])).unwrap();
	let changes = mirror.drain_changes();

	assert!(
		changes
			.iter()
			.all(|c| c.change != MirrorChange::NodeRemoved(NodeId(2)))
	);
	assert!(changes.iter().any(|c| c.change == MirrorChange::NodeRebuilt(NodeId(2))));
	assert!(changes.iter().all(|c| c.origin == ChangeOrigin::Rebuild));
}

#[test]
fn plain_payload_edit_refreshes_in_place() {
	let mut mirror = mirror();
	mirror.add_node(node(1, NodeType::Dialogue, json!({ "text": "a" })));
	assert_eq!(
		mirror.update_node_data(NodeId(1), json!({ "text": "b" })),
		Some(NodeUpdate::Refreshed)
	);
	assert_eq!(
		mirror.update_node_data(NodeId(1), json!({ "text": "b" })),
		Some(NodeUpdate::Unchanged)
	);
	assert_eq!(mirror.update_node_data(NodeId(9), json!({})), None);
}

#[test]
fn changes_carry_active_scope() {
	let suppression = Suppression::new();
	let mut mirror = GraphMirror::new(Arc::new(FlowRenderer), suppression.clone());
	mirror.add_node(node(1, NodeType::Start, Value::Null));
	{
		let _scope = suppression.enter(ScopeKind::RemoteApply);
		mirror.move_node(NodeId(1), Position::new(1.0, 1.0));
	}

	let origins: Vec<ChangeOrigin> = mirror.drain_changes().into_iter().map(|c| c.origin).collect();
	assert_eq!(origins, vec![ChangeOrigin::Local, ChangeOrigin::Remote]);
}

#[test]
fn load_skips_unattachable_connections() {
	let mut mirror = mirror();
	let errors = mirror.load(
		vec![
			node(1, NodeType::Start, Value::Null),
			node(2, NodeType::End, Value::Null),
		],
		vec![
			link(Some(1), 1, "out", 2, None),
			link(Some(1), 1, "out", 2, None),
			link(Some(2), 1, "out", 5, None),
		],
	);
	assert_eq!(
		errors,
		vec![
			SyncError::DuplicateConnection(ConnectionId(1)),
			SyncError::UnknownNode(NodeId(5)),
		]
	);
	assert_eq!(mirror.connection_count(), 1);
}
