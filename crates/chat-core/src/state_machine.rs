use crate::{
    error::ChatError,
    types::{ChatEvent, ConnectionState},
};

/// Inputs that drive the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTransition {
    /// A connect was requested.
    Connect,
    /// A connection attempt failed and another one will follow.
    AttemptFailed,
    /// The handshake completed and the server assigned a connection id.
    Opened,
    /// An open channel dropped without being asked to.
    TransportLost,
    /// A logout acknowledgement was requested.
    Logout,
    /// The channel was closed on purpose.
    Closed,
    /// The retry budget was exhausted.
    GaveUp,
}

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
        }
    }
}

impl ConnectionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether outbound events may be written to the channel.
    pub fn accepts_outbound(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn apply(
        &mut self,
        transition: ConnectionTransition,
    ) -> Result<Vec<ChatEvent>, ChatError> {
        use ConnectionState::*;
        use ConnectionTransition as T;

        match transition {
            T::Connect => match self.state {
                Idle | Disconnected => self.move_to(Connecting),
                Connecting | Connected | Reconnecting => Ok(Vec::new()),
                LoggingOut => Err(ChatError::invalid_state(self.state, "connect")),
            },
            T::AttemptFailed => match self.state {
                Connecting => self.move_to(Reconnecting),
                Reconnecting => Ok(Vec::new()),
                _ => Err(ChatError::invalid_state(self.state, "attempt_failed")),
            },
            T::Opened => self.transition_from_any_of(&[Connecting, Reconnecting], Connected, "opened"),
            T::TransportLost => {
                self.transition_from_any_of(&[Connected], Reconnecting, "transport_lost")
            }
            T::Logout => self.transition_from_any_of(&[Connected], LoggingOut, "logout"),
            T::Closed => match self.state {
                Idle | Disconnected => Ok(Vec::new()),
                _ => self.move_to(Disconnected),
            },
            T::GaveUp => {
                self.transition_from_any_of(&[Connecting, Reconnecting], Disconnected, "gave_up")
            }
        }
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[ConnectionState],
        next: ConnectionState,
        action: &str,
    ) -> Result<Vec<ChatEvent>, ChatError> {
        if !expected.contains(&self.state) {
            return Err(ChatError::invalid_state(self.state, action));
        }
        self.move_to(next)
    }

    fn move_to(&mut self, next: ConnectionState) -> Result<Vec<ChatEvent>, ChatError> {
        self.state = next;
        Ok(vec![ChatEvent::StateChanged { state: next }])
    }
}
