//! Just enough JSON-RPC to route a request through the gate.

use serde_json::Value;

/// MCP handshake method; reachable without a token.
pub const INITIALIZE: &str = "initialize";

/// MCP tool invocation method; subject to per-tool scopes.
pub const TOOLS_CALL: &str = "tools/call";

/// The parts of a JSON-RPC body the gate cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RpcSummary {
    /// Methods in message order; responses and notifications without a
    /// method are skipped.
    pub methods: Vec<String>,
    /// `params.name` of every `tools/call` message.
    pub tool_calls: Vec<String>,
}

impl RpcSummary {
    /// Summarise a request body. Bodies that are not JSON-RPC yield an
    /// empty summary.
    pub fn parse(body: &[u8]) -> Self {
        let messages = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Array(messages)) => messages,
            Ok(message @ Value::Object(_)) => vec![message],
            _ => return Self::default(),
        };

        let mut summary = Self::default();
        for message in &messages {
            let Some(method) = message.get("method").and_then(Value::as_str) else {
                continue;
            };
            if method == TOOLS_CALL {
                // A call without a usable name is left for the RPC layer to
                // reject.
                if let Some(name) = message.pointer("/params/name").and_then(Value::as_str) {
                    summary.tool_calls.push(name.to_string());
                }
            }
            summary.methods.push(method.to_string());
        }
        summary
    }

    /// A lone `initialize` request.
    pub fn is_handshake(&self) -> bool {
        matches!(self.methods.as_slice(), [method] if method == INITIALIZE)
    }
}
