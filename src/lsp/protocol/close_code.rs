//! Socket close codes and how they are interpreted.

use std::fmt;

/// Code reported when a server socket closes.
///
/// Follows the WebSocket numbering, which stdio transports reuse to report
/// process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

/// What a closure means for future connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Orderly shutdown
    Normal,
    /// The server refuses this kind of document; do not dial it again
    Unsupported,
    /// Anything else; a later attempt may succeed
    Transient,
}

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    pub fn kind(self) -> CloseKind {
        match self {
            CloseCode::NORMAL => CloseKind::Normal,
            CloseCode::NO_STATUS => CloseKind::Unsupported,
            _ => CloseKind::Transient,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
