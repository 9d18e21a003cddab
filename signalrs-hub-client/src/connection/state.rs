use std::fmt::Display;

/// Lifecycle of a connection. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    Connecting,
    Connected,
    Stopped,
}

/// What the delegate has been told about the current start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenOutcome {
    /// Nothing yet
    Pending,
    Opened,
    FailedToOpen,
    Closed,
}

/// Terminal event owed to the delegate once the connection stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopEvent {
    FailToOpen,
    Close,
}

impl OpenOutcome {
    /// Moves to the terminal outcome, returning the event to deliver if one is still owed.
    pub(crate) fn finish(&mut self) -> Option<StopEvent> {
        match self {
            OpenOutcome::Pending => {
                *self = OpenOutcome::FailedToOpen;
                Some(StopEvent::FailToOpen)
            }
            OpenOutcome::Opened => {
                *self = OpenOutcome::Closed;
                Some(StopEvent::Close)
            }
            OpenOutcome::FailedToOpen | OpenOutcome::Closed => None,
        }
    }
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Initial => "initial",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Stopped => "stopped",
        };

        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_event_is_owed_once() {
        let mut outcome = OpenOutcome::Pending;

        assert_eq!(Some(StopEvent::FailToOpen), outcome.finish());
        assert_eq!(None, outcome.finish());
        assert_eq!(OpenOutcome::FailedToOpen, outcome);
    }

    #[test]
    fn opened_connection_owes_close() {
        let mut outcome = OpenOutcome::Opened;

        assert_eq!(Some(StopEvent::Close), outcome.finish());
        assert_eq!(None, outcome.finish());
    }
}
