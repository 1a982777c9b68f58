//! Plumbing between a frontend and the chat runtime task.
//!
//! Frontends queue [`ChatCommand`]s (join a peer, send a message, log out)
//! into a bounded queue drained by the single runtime task. The runtime
//! publishes every observable change as a [`ChatEvent`] on a broadcast
//! channel, so a terminal view and a test can watch the same session.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::types::{ChatCommand, ChatEvent};

/// Events as seen by one frontend subscriber.
///
/// A subscriber that falls more than `event_buffer` events behind gets
/// `RecvError::Lagged` and resumes from the oldest retained event.
pub type EventStream = broadcast::Receiver<ChatEvent>;

#[derive(Debug, Error)]
pub enum ChatChannelError {
    /// The runtime task is gone; the command is handed back undelivered.
    #[error("chat runtime has stopped; command not delivered")]
    RuntimeStopped(Box<ChatCommand>),
}

/// Command queue and event fan-out shared by the runtime and its handles.
#[derive(Clone, Debug)]
pub struct ChatChannels {
    command_tx: mpsc::Sender<ChatCommand>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl ChatChannels {
    /// Build the pair and hand back the receiver the runtime task drains.
    ///
    /// Zero-sized buffers are raised to one.
    pub fn new(command_buffer: usize, event_buffer: usize) -> (Self, mpsc::Receiver<ChatCommand>) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));

        (
            Self {
                command_tx,
                event_tx,
            },
            command_rx,
        )
    }

    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Queue one command, waiting while the runtime is behind.
    pub async fn send_command(&self, command: ChatCommand) -> Result<(), ChatChannelError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|rejected| ChatChannelError::RuntimeStopped(Box::new(rejected.0)))
    }

    /// Publish to every current subscriber. Events nobody listens for are
    /// dropped; a frontend subscribes before it sends its first command.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.event_tx.send(event);
    }
}
