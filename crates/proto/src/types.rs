//! Records shared by inbound and outbound events.
//!
//! Identifiers are numeric on the wire but also accepted as decimal strings,
//! since JSON object keys (the lock table) always arrive as strings.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

macro_rules! wire_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
		#[serde(transparent)]
		pub struct $name(pub u64);

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl<'de> Deserialize<'de> for $name {
			fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
				deserializer.deserialize_any(WireIdVisitor).map($name)
			}
		}
	};
}

struct WireIdVisitor;

impl Visitor<'_> for WireIdVisitor {
	type Value = u64;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("a non-negative integer id or its decimal string form")
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
		Ok(v)
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
		u64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
		v.trim()
			.parse()
			.map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
	}
}

wire_id!(
	/// Identifier of a node, unique within one flow document.
	NodeId
);

wire_id!(
	/// Server-assigned identifier of a connection.
	ConnectionId
);

wire_id!(
	/// Identity of one editor session connected to the flow server.
	SessionId
);

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
	/// Horizontal canvas coordinate.
	pub x: f64,
	/// Vertical canvas coordinate.
	pub y: f64,
}

impl Position {
	/// Creates a position from canvas coordinates.
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// Closed set of node kinds understood by the flow editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
	/// Entry point of a flow.
	Start,
	/// A line of dialogue spoken by a character.
	Dialogue,
	/// Player choice fanning out into one output per option.
	Choice,
	/// Boolean branch with `true` and `false` outputs.
	Condition,
	/// Side effect executed when the flow passes through.
	Action,
	/// Transfer to another node or flow.
	Jump,
	/// Terminal node.
	End,
}

/// Authoritative node record as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
	/// Node identifier.
	pub id: NodeId,
	/// Node kind.
	#[serde(rename = "type")]
	pub node_type: NodeType,
	/// Free-form kind-specific payload.
	#[serde(default)]
	pub data: Value,
	/// Canvas position.
	#[serde(default)]
	pub position: Position,
}

/// One end of a connection: a node and one of its named sockets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
	/// Node owning the socket.
	pub node: NodeId,
	/// Socket name on that node.
	pub socket: String,
}

impl Endpoint {
	/// Creates an endpoint.
	pub fn new(node: NodeId, socket: impl Into<String>) -> Self {
		Self {
			node,
			socket: socket.into(),
		}
	}
}

/// Connection between an output socket and an input socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
	/// Server-assigned id; absent on an optimistic local add.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<ConnectionId>,
	/// Output side.
	pub source: Endpoint,
	/// Input side.
	pub target: Endpoint,
	/// Display label.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	/// Guard expression evaluated when the flow traverses this edge.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub condition: Option<String>,
}

impl ConnectionRecord {
	/// Returns true if both records join the same pair of sockets.
	pub fn same_route(&self, other: &ConnectionRecord) -> bool {
		self.source == other.source && self.target == other.target
	}

	/// Returns true if either endpoint sits on `node`.
	pub fn touches(&self, node: NodeId) -> bool {
		self.source.node == node || self.target.node == node
	}
}

/// Collaborator currently holding an advisory lock on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
	/// Session holding the lock.
	pub session: SessionId,
	/// Display name of the collaborator.
	#[serde(default)]
	pub name: String,
	/// Indicator color, as a CSS color string.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
}

/// Status reported for the current node of a debug step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugStatus {
	/// Execution is positioned on the node.
	Current,
	/// Execution is paused awaiting player input.
	WaitingInput,
	/// Execution reached this node and completed.
	Finished,
	/// Execution failed on this node.
	Error,
}
