//! Request/response data model
//!
//! Messages are headers plus an optional body; the wire encoding is owned by
//! the transport collaborator, never by this crate. A request gains its
//! stream identifier at dispatch time (`TaggedRequest`) and every decoded
//! inbound message carries the extracted identifier back (`InboundMessage`).

use std::borrow::Cow;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::stream::StreamId;

/// Ordered list of header name/value pairs.
///
/// Insertion order is preserved; lookup scans by exact name and returns the
/// first match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a header pair
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value recorded under `name`, if any
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An application-level request, not yet tagged with a stream identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create an empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// The peer's response for one exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Response {
    /// Create an empty response
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Body decoded as UTF-8, if a body is present.
    ///
    /// Lossy when the peer sent invalid UTF-8.
    pub fn body_utf8(&self) -> Option<Cow<'_, str>> {
        self.body.as_ref().map(|b| String::from_utf8_lossy(b))
    }
}

/// A request paired with its allocated stream identifier, ready for the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedRequest {
    pub stream_id: StreamId,
    pub request: Request,
}

/// A decoded inbound message as the transport's delivery path hands it over.
///
/// `stream_id` is `None` when no identifier could be extracted from the
/// message metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub stream_id: Option<StreamId>,
    pub response: Response,
}

impl InboundMessage {
    /// A message carrying its stream identifier
    pub fn tagged(stream_id: StreamId, response: Response) -> Self {
        Self {
            stream_id: Some(stream_id),
            response,
        }
    }

    /// A message whose identifier could not be extracted
    pub fn untagged(response: Response) -> Self {
        Self {
            stream_id: None,
            response,
        }
    }
}
