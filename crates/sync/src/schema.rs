//! Socket layout per node kind.
//!
//! The mirror never interprets node payloads itself. It asks a
//! [`NodeRenderer`] which sockets a node exposes, which is the information the
//! render layer produces when it draws the node. [`FlowRenderer`] is the
//! layout of the stock dialogue node set.

use serde_json::Value;
use smallvec::SmallVec;
use trellis_proto::NodeType;

/// Ordered socket names on one side of a node.
pub type SocketList = SmallVec<[String; 4]>;

/// Input and output sockets exposed by a rendered node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SocketSet {
	/// Sockets accepting incoming connections.
	pub inputs: SocketList,
	/// Sockets originating outgoing connections.
	pub outputs: SocketList,
}

impl SocketSet {
	/// Builds a socket set from name slices.
	pub fn new(inputs: &[&str], outputs: &[&str]) -> Self {
		Self {
			inputs: inputs.iter().map(|s| (*s).to_string()).collect(),
			outputs: outputs.iter().map(|s| (*s).to_string()).collect(),
		}
	}

	/// Returns true if an input socket with this name exists.
	pub fn has_input(&self, name: &str) -> bool {
		self.inputs.iter().any(|s| s == name)
	}

	/// Returns true if an output socket with this name exists.
	pub fn has_output(&self, name: &str) -> bool {
		self.outputs.iter().any(|s| s == name)
	}
}

/// Per-kind rendering collaborator consulted by the mirror.
pub trait NodeRenderer: Send + Sync {
	/// Performs a render pass for a node and reports the sockets it exposes.
	fn sockets(&self, node_type: NodeType, data: &Value) -> SocketSet;

	/// Returns true if replacing `old` with `new` changes the socket shape,
	/// which requires a structural rebuild instead of an in-place refresh.
	fn shape_changed(&self, node_type: NodeType, old: &Value, new: &Value) -> bool {
		self.sockets(node_type, old) != self.sockets(node_type, new)
	}
}

/// Socket layout of the built-in dialogue node kinds.
///
/// `choice` nodes expose one output per entry of `data.choices`; every other
/// kind has a fixed layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowRenderer;

impl FlowRenderer {
	fn choice_outputs(data: &Value) -> SocketList {
		let Some(choices) = data.get("choices").and_then(Value::as_array) else {
			return SocketList::new();
		};
		choices
			.iter()
			.enumerate()
			.map(|(index, choice)| match choice.get("id") {
				Some(Value::String(id)) => format!("choice_{id}"),
				Some(Value::Number(id)) => format!("choice_{id}"),
				_ => format!("choice_{index}"),
			})
			.collect()
	}
}

impl NodeRenderer for FlowRenderer {
	fn sockets(&self, node_type: NodeType, data: &Value) -> SocketSet {
		match node_type {
			NodeType::Start => SocketSet::new(&[], &["out"]),
			NodeType::End | NodeType::Jump => SocketSet::new(&["in"], &[]),
			NodeType::Dialogue | NodeType::Action => SocketSet::new(&["in"], &["out"]),
			NodeType::Condition => SocketSet::new(&["in"], &["true", "false"]),
			NodeType::Choice => SocketSet {
				inputs: SocketList::from_iter(["in".to_string()]),
				outputs: Self::choice_outputs(data),
			},
		}
	}

	fn shape_changed(&self, node_type: NodeType, old: &Value, new: &Value) -> bool {
		node_type == NodeType::Choice && Self::choice_outputs(old) != Self::choice_outputs(new)
	}
}
