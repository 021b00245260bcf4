//! Line-oriented JSON event streams printed by agent CLIs.
//!
//! Claude (`--output-format stream-json` or `json`) and OpenCode
//! (`--format json`) both print one JSON object per line. A final
//! `{"type":"result", ...}` line carries the answer when present; otherwise
//! the text blocks seen along the way are used.

use serde::Deserialize;
use serde_json::Value;

use crate::util::truncate;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant {
        message: AssistantMessage,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename = "user")]
    User {},

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        session_id: Option<String>,
    },

    #[serde(rename = "system")]
    System {},

    /// OpenCode text part.
    #[serde(rename = "text")]
    Text {
        #[serde(default)]
        part: Part,
    },

    /// OpenCode tool invocation part.
    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        part: Part,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse {
        name: String,
        #[serde(default)]
        input: Value,
    },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub state: Option<Value>,
}

/// Accumulates what an agent printed.
#[derive(Debug, Default)]
pub struct Transcript {
    text: String,
    result: Option<String>,
    pub is_error: bool,
    pub session_id: Option<String>,
    pub tool_uses: usize,
}

impl Transcript {
    pub fn push_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str::<StreamEvent>(line) {
            Ok(StreamEvent::Assistant { message, session_id }) => {
                if session_id.is_some() {
                    self.session_id = session_id;
                }
                for block in message.content {
                    match block {
                        ContentBlock::ToolUse { name, input } => self.tool_use(&name, &input),
                        ContentBlock::Text { text } => self.push_text(&text),
                        ContentBlock::Other => {}
                    }
                }
            }
            Ok(StreamEvent::Result {
                subtype,
                result,
                is_error,
                session_id,
            }) => {
                if let Some(subtype) = subtype {
                    tracing::debug!(subtype = %subtype, is_error, "Agent result event");
                }
                self.result = result;
                self.is_error = is_error;
                if session_id.is_some() {
                    self.session_id = session_id;
                }
            }
            Ok(StreamEvent::Text { part }) => {
                if let Some(text) = part.text {
                    self.push_text(&text);
                }
            }
            Ok(StreamEvent::ToolUse { part }) => {
                if let Some(tool) = part.tool {
                    let input = part
                        .state
                        .as_ref()
                        .and_then(|s| s.get("input"))
                        .cloned()
                        .unwrap_or(Value::Null);
                    self.tool_use(&tool, &input);
                }
            }
            Ok(StreamEvent::User {} | StreamEvent::System {} | StreamEvent::Other) => {}
            // Not an event line, keep it as plain output.
            Err(_) => self.push_text(line),
        }
    }

    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
        self.text.push('\n');
    }

    fn tool_use(&mut self, name: &str, input: &Value) {
        self.tool_uses += 1;
        tracing::debug!(tool = %describe_tool_use(name, input), "Agent tool use");
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// The final result if one was reported, otherwise the accumulated text.
    pub fn output(&self) -> String {
        self.result
            .clone()
            .unwrap_or_else(|| self.text.trim_end().to_string())
    }
}

/// Human-readable description of a tool use, for debug logging.
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    let path = || {
        field("file_path")
            .or_else(|| field("filePath"))
            .map(shorten_path)
            .unwrap_or_else(|| "file".to_string())
    };
    match name.to_lowercase().as_str() {
        "read" => format!("Reading: {}", path()),
        "write" => format!("Creating: {}", path()),
        "edit" => format!("Editing: {}", path()),
        "bash" => format!("Running: {}", truncate(field("command").unwrap_or("command"), 40)),
        "glob" => format!("Searching: {}", field("pattern").unwrap_or("*")),
        "grep" => format!("Grep: {}", truncate(field("pattern").unwrap_or("pattern"), 30)),
        _ => name.to_string(),
    }
}

/// Keep only the last two path components.
fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}
