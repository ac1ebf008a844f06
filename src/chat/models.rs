//! The conversation history for a chat session.
use tokio::sync::mpsc;

use crate::openai::Message;

/// Append-only list of messages in conversation order. The whole
/// transcript is replayed to the API on every turn.
///
/// Anything rendering the conversation can `subscribe` to be told
/// about each message as it is appended.
#[derive(Default)]
pub struct Transcript {
    messages: Vec<Message>,
    subscribers: Vec<mpsc::UnboundedSender<Message>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            subscribers: Vec::new(),
        }
    }

    pub fn append(&mut self, msg: Message) {
        // Drop subscribers that hung up
        self.subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
        self.messages.push(msg);
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.messages.iter()
    }
}
