/// State of a connection to one language server.
///
/// - Initializing: socket open, initialize request sent, awaiting response
/// - Ready: initialize/initialized handshake complete, can accept requests
/// - Failed: the server rejected initialize or answered garbage
/// - Closing: graceful shutdown in progress (shutdown/exit handshake)
/// - Closed: socket closed (terminal state)
///
/// State transitions:
/// - Initializing -> Ready (on successful init)
/// - Initializing -> Failed (on rejected init)
/// - Initializing | Ready | Failed -> Closing (on close request)
/// - any state -> Closed (socket closed, or close completed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initializing,
    Ready,
    Failed,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Initializing, Ready)
                | (Initializing, Failed)
                | (Initializing | Ready | Failed, Closing)
                | (Initializing | Ready | Failed | Closing, Closed)
        )
    }

    /// No further messages can be exchanged.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}
