//! Debug adapter wire messages.
//!
//! Messages are decoded once at the transport boundary into
//! [`ProtocolMessage`]. Payloads stay as raw JSON until the multiplexer
//! needs a specific field, at which point the typed views below are
//! decoded on demand. Every typed view keeps unknown fields in a
//! flattened `extra` map so a rewrite never loses adapter-specific data.

use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;

/// Sequence number as carried on the wire.
pub type Seq = i64;

/// Breakpoint event reasons the multiplexer interprets.
pub mod reason {
    pub const NEW: &str = "new";
    pub const CHANGED: &str = "changed";
    pub const REMOVED: &str = "removed";
}

/// Payload error.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid arguments for '{command}': {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid body for '{name}': {source}")]
    InvalidBody {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single message in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolMessage {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl ProtocolMessage {
    /// Sequence number of the message.
    #[must_use]
    pub const fn seq(&self) -> Seq {
        match self {
            Self::Request(r) => r.seq,
            Self::Response(r) => r.seq,
            Self::Event(e) => e.seq,
        }
    }

    /// Overwrite the sequence number.
    pub const fn set_seq(&mut self, seq: Seq) {
        match self {
            Self::Request(r) => r.seq = seq,
            Self::Response(r) => r.seq = seq,
            Self::Event(e) => e.seq = seq,
        }
    }
}

impl From<Request> for ProtocolMessage {
    fn from(value: Request) -> Self {
        Self::Request(value)
    }
}

impl From<Response> for ProtocolMessage {
    fn from(value: Response) -> Self {
        Self::Response(value)
    }
}

impl From<Event> for ProtocolMessage {
    fn from(value: Event) -> Self {
        Self::Event(value)
    }
}

/// Commands the multiplexer has an opinion about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    Initialize,
    Attach,
    Launch,
    Disconnect,
    Terminate,
    ConfigurationDone,
    SetBreakpoints,
    Continue,
    Next,
    StepIn,
    StepOut,
    StackTrace,
    Other(String),
}

impl Command {
    #[must_use]
    pub fn parse(command: &str) -> Self {
        match command {
            "initialize" => Self::Initialize,
            "attach" => Self::Attach,
            "launch" => Self::Launch,
            "disconnect" => Self::Disconnect,
            "terminate" => Self::Terminate,
            "configurationDone" => Self::ConfigurationDone,
            "setBreakpoints" => Self::SetBreakpoints,
            "continue" => Self::Continue,
            "next" => Self::Next,
            "stepIn" => Self::StepIn,
            "stepOut" => Self::StepOut,
            "stackTrace" => Self::StackTrace,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Attach => "attach",
            Self::Launch => "launch",
            Self::Disconnect => "disconnect",
            Self::Terminate => "terminate",
            Self::ConfigurationDone => "configurationDone",
            Self::SetBreakpoints => "setBreakpoints",
            Self::Continue => "continue",
            Self::Next => "next",
            Self::StepIn => "stepIn",
            Self::StepOut => "stepOut",
            Self::StackTrace => "stackTrace",
            Self::Other(other) => other,
        }
    }

    /// Session lifecycle commands that collaborators answer locally.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Initialize
                | Self::Attach
                | Self::Disconnect
                | Self::Terminate
                | Self::ConfigurationDone
        )
    }

    /// Commands that resume the shared target.
    #[must_use]
    pub const fn is_resume(&self) -> bool {
        matches!(self, Self::Continue | Self::Next | Self::StepIn | Self::StepOut)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    #[must_use]
    pub fn new(seq: Seq, command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq,
            command: command.into(),
            arguments,
        }
    }

    /// Interpreted command.
    #[must_use]
    pub fn command(&self) -> Command {
        Command::parse(&self.command)
    }

    /// Decode the arguments into a typed view.
    ///
    /// Absent arguments decode as an empty object, so views whose fields
    /// are all optional still succeed.
    ///
    /// # Errors
    /// Returns error if the arguments do not match `T`.
    pub fn decode_arguments<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let value = self
            .arguments
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        serde_json::from_value(value).map_err(|source| ProtocolError::InvalidArguments {
            command: self.command.clone(),
            source,
        })
    }

    /// Replace the arguments with a typed view.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn set_arguments<T: Serialize>(&mut self, arguments: &T) -> Result<(), ProtocolError> {
        self.arguments = Some(serde_json::to_value(arguments)?);
        Ok(())
    }
}

/// Response message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: Seq,
    pub request_seq: Seq,
    pub success: bool,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Successful response to `request`.
    #[must_use]
    pub fn success(seq: Seq, request: &Request, body: Option<Value>) -> Self {
        Self {
            seq,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    #[must_use]
    pub fn command(&self) -> Command {
        Command::parse(&self.command)
    }

    /// Decode the body into a typed view. Absent bodies decode as `{}`.
    ///
    /// # Errors
    /// Returns error if the body does not match `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_body(&self.command, self.body.as_ref())
    }

    /// # Errors
    /// Returns error if serialization fails.
    pub fn set_body<T: Serialize>(&mut self, body: &T) -> Result<(), ProtocolError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(())
    }
}

/// Event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    /// Event awaiting a sequence number.
    #[must_use]
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body,
        }
    }

    /// `continued` event for `thread_id`.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn continued(
        thread_id: i64,
        all_threads_continued: Option<bool>,
    ) -> Result<Self, ProtocolError> {
        let body = ContinuedEventBody {
            thread_id,
            all_threads_continued,
        };
        Ok(Self::new("continued", Some(serde_json::to_value(body)?)))
    }

    #[must_use]
    pub fn terminated() -> Self {
        Self::new("terminated", None)
    }

    /// `breakpoint` event carrying `breakpoint`.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn breakpoint(reason: &str, breakpoint: Breakpoint) -> Result<Self, ProtocolError> {
        let body = BreakpointEventBody {
            reason: reason.to_string(),
            breakpoint,
            extra: Map::new(),
        };
        Ok(Self::new("breakpoint", Some(serde_json::to_value(body)?)))
    }

    #[must_use]
    pub fn is_breakpoint(&self) -> bool {
        self.event == "breakpoint"
    }

    /// # Errors
    /// Returns error if the body does not match `T`.
    pub fn decode_body<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_body(&self.event, self.body.as_ref())
    }

    /// # Errors
    /// Returns error if serialization fails.
    pub fn set_body<T: Serialize>(&mut self, body: &T) -> Result<(), ProtocolError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(())
    }
}

fn decode_body<T: DeserializeOwned>(name: &str, body: Option<&Value>) -> Result<T, ProtocolError> {
    let value = body.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidBody {
        name: name.to_string(),
        source,
    })
}

/// A source file reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Source {
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            name: None,
            path: Some(path.into()),
            extra: Map::new(),
        }
    }
}

/// Breakpoint as requested by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SourceBreakpoint {
    #[must_use]
    pub fn at(line: i64, column: Option<i64>) -> Self {
        Self {
            line,
            column,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakpoints: Option<Vec<SourceBreakpoint>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Breakpoint as confirmed by the adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Breakpoint {
    #[must_use]
    pub fn source_path(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.path.as_deref())
    }

    /// Whether both describe the same breakpoint.
    ///
    /// Adapter ids are authoritative; breakpoints without an id fall
    /// back to their location.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                self.source_path() == other.source_path()
                    && self.line == other.line
                    && self.column == other.column
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsResponseBody {
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Stack frame; only the source is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceResponseBody {
    #[serde(default)]
    pub stack_frames: Vec<StackFrame>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments shared by `continue`, `next`, `stepIn` and `stepOut`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeArguments {
    pub thread_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointEventBody {
    pub reason: String,
    pub breakpoint: Breakpoint,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuedEventBody {
    pub thread_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_threads_continued: Option<bool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_tagging() {
        let raw = json!({
            "seq": 3,
            "type": "request",
            "command": "setBreakpoints",
            "arguments": { "source": { "path": "/w/main.c" }, "breakpoints": [{ "line": 4 }] }
        });
        let msg: ProtocolMessage = serde_json::from_value(raw).unwrap();
        let ProtocolMessage::Request(req) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(req.seq, 3);
        assert_eq!(req.command(), Command::SetBreakpoints);

        let args: SetBreakpointsArguments = req.decode_arguments().unwrap();
        assert_eq!(args.source.path.as_deref(), Some("/w/main.c"));
        assert_eq!(args.breakpoints.unwrap()[0].line, 4);
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let raw = json!({
            "source": { "path": "/w/a.c", "sourceReference": 0 },
            "breakpoints": [{ "line": 1, "condition": "x > 1" }],
            "sourceModified": false
        });
        let args: SetBreakpointsArguments = serde_json::from_value(raw).unwrap();
        let back = serde_json::to_value(&args).unwrap();
        assert_eq!(back["sourceModified"], json!(false));
        assert_eq!(back["source"]["sourceReference"], json!(0));
        assert_eq!(back["breakpoints"][0]["condition"], json!("x > 1"));
    }

    #[test]
    fn test_missing_required_arguments() {
        let req = Request::new(1, "setBreakpoints", None);
        let err = req.decode_arguments::<SetBreakpointsArguments>().unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidArguments { .. }));

        let disconnect = Request::new(2, "disconnect", None);
        let args: DisconnectArguments = disconnect.decode_arguments().unwrap();
        assert_eq!(args.restart, None);
    }

    #[test]
    fn test_command_classification() {
        assert!(Command::parse("configurationDone").is_lifecycle());
        assert!(!Command::parse("launch").is_lifecycle());
        assert!(Command::parse("stepOut").is_resume());
        assert_eq!(Command::parse("evaluate"), Command::Other("evaluate".into()));
        assert_eq!(Command::parse("evaluate").as_str(), "evaluate");
    }

    #[test]
    fn test_breakpoint_identity() {
        let a = Breakpoint {
            id: Some(1),
            line: Some(3),
            ..Default::default()
        };
        let b = Breakpoint {
            id: Some(1),
            line: Some(9),
            ..Default::default()
        };
        let c = Breakpoint {
            line: Some(3),
            ..Default::default()
        };
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(c.same_as(&c.clone()));
    }
}
