/// Lifecycle of the adapter bound to one document widget.
///
/// State transitions:
/// - Uninitialized -> VirtualDocumentBuilt (first rebuild)
/// - VirtualDocumentBuilt -> Connecting (connections requested)
/// - Connecting -> Connected (every language got a connection)
/// - Connecting | Connected -> VirtualDocumentBuilt (a connect failed, retried later)
/// - any state but Disposed -> Disposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    VirtualDocumentBuilt,
    Connecting,
    Connected,
    Disposed,
}

impl AdapterState {
    pub fn can_transition_to(self, next: AdapterState) -> bool {
        use AdapterState::*;
        matches!(
            (self, next),
            (Uninitialized, VirtualDocumentBuilt)
                | (VirtualDocumentBuilt, Connecting)
                | (Connecting, Connected)
                | (Connecting | Connected, VirtualDocumentBuilt)
                | (Uninitialized | VirtualDocumentBuilt | Connecting | Connected, Disposed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::AdapterState::*;
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Uninitialized, VirtualDocumentBuilt, true)]
    #[case(VirtualDocumentBuilt, Connecting, true)]
    #[case(Connecting, Connected, true)]
    #[case(Connecting, VirtualDocumentBuilt, true)]
    #[case(Connected, VirtualDocumentBuilt, true)]
    #[case(Uninitialized, Disposed, true)]
    #[case(Connected, Disposed, true)]
    #[case(Uninitialized, Connected, false)]
    #[case(VirtualDocumentBuilt, Connected, false)]
    #[case(Disposed, Uninitialized, false)]
    #[case(Disposed, Disposed, false)]
    fn transitions(#[case] from: AdapterState, #[case] to: AdapterState, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }
}
