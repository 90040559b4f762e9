//! JSON-RPC request ID of requests the client sends.

/// Numeric id of an outgoing request.
///
/// The client generates its own ids, so numbers are enough. Ids of requests
/// a server sends to the client are kept as raw JSON instead, since servers
/// may use strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(i64);

impl RequestId {
    #[inline]
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// The numeric "id" of a message, if any.
    pub fn from_json(message: &serde_json::Value) -> Option<Self> {
        message.get("id")?.as_i64().map(Self)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
