//! DAP protocol messages.
//!
//! A bridging adapter reads and writes every kind of message on both of its
//! connections, so one [`Message`] type serves both directions. Bodies and
//! arguments stay untyped JSON: commands the adapter does not understand are
//! relayed without loss.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sequence number of a message on one connection
pub type Seq = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

impl Message {
    pub fn seq(&self) -> Seq {
        match self {
            Message::Request(r) => r.seq,
            Message::Response(r) => r.seq,
            Message::Event(e) => e.seq,
        }
    }

    /// Replace the sequence number, as the writer of a connection does.
    pub fn with_seq(mut self, seq: Seq) -> Self {
        match &mut self {
            Message::Request(r) => r.seq = seq,
            Message::Response(r) => r.seq = seq,
            Message::Event(e) => e.seq = seq,
        }
        self
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Message::Request(r) => format!("request {} ({})", r.command, r.seq),
            Message::Response(r) => format!(
                "response {} to {} ({})",
                r.command,
                r.request_seq,
                if r.success { "ok" } else { "failed" }
            ),
            Message::Event(e) => format!("event {}", e.event),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: Seq,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl Request {
    pub fn new(command: impl Into<String>, arguments: Option<Value>) -> Self {
        Self {
            seq: 0,
            command: command.into(),
            arguments,
        }
    }

    /// An argument by name, if present.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.as_ref().and_then(|a| a.get(name))
    }
}

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
    /// A successful response to `request`.
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body,
        }
    }

    /// A failed response to `request` carrying `message`.
    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            seq: 0,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            body: Some(serde_json::json!({
                "error": { "id": 1, "format": message.clone(), "showUser": false }
            })),
            message: Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(event: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            event: event.into(),
            body,
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

impl From<Event> for Message {
    fn from(e: Event) -> Self {
        Message::Event(e)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_keeps_snake_case_request_seq() {
        let msg: Message = serde_json::from_value(json!({
            "seq": 4,
            "type": "response",
            "request_seq": 2,
            "success": true,
            "command": "stackTrace",
            "body": {"stackFrames": []}
        }))
        .unwrap();
        let Message::Response(r) = &msg else {
            panic!("expected response, got {msg:?}");
        };
        assert_eq!(r.request_seq, 2);

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["request_seq"], json!(2));
        assert_eq!(back["type"], json!("response"));
    }

    #[test]
    fn request_without_arguments() {
        let msg: Message = serde_json::from_value(json!({
            "seq": 1, "type": "request", "command": "threads"
        }))
        .unwrap();
        assert!(matches!(&msg, Message::Request(r) if r.arguments.is_none()));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"seq": 1, "type": "request", "command": "threads"})
        );
    }

    #[test]
    fn error_response_carries_message() {
        let request = Request {
            seq: 9,
            ..Request::new("source", Some(json!({"sourceReference": 0})))
        };
        let response = Response::error(&request, "Source unavailable");
        assert!(!response.success);
        assert_eq!(response.request_seq, 9);
        assert_eq!(response.message.as_deref(), Some("Source unavailable"));
        assert_eq!(
            response.body.unwrap()["error"]["format"],
            json!("Source unavailable")
        );
    }

    #[test]
    fn with_seq_rewrites_any_kind() {
        let msg = Message::from(Event::new("stopped", None)).with_seq(12);
        assert_eq!(msg.seq(), 12);
        assert_eq!(msg.describe(), "event stopped");
    }
}
