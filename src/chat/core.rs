use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};

use super::models::Transcript;
use crate::core::ConnectionConfig;
use crate::openai::{
    ClientOptions, CompletionClient, CompletionError, CompletionResult, Message, OpenAiClient,
    Role,
};

/// A finished request after its messages were appended to the
/// transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub request_id: u64,
    pub messages: Vec<Message>,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting { in_flight: usize },
}

struct Finished {
    request_id: u64,
    result: CompletionResult,
}

/// A chat with an OpenAI compatible API.
///
/// The session is the only thing that writes to the transcript.
/// Requests run on tasks tracked by a `JoinSet` and their results
/// are applied when the owner calls `next_completion`. A task that
/// dies (e.g. a panicking client) still ends in one system message.
/// Nothing stops a second `send` before the first one finishes, in
/// which case results are applied in the order the requests
/// complete.
///
/// Use `Session::builder()` to construct a `Session`.
pub struct Session {
    client: Arc<dyn CompletionClient>,
    config: ConnectionConfig,
    transcript: Transcript,
    tasks: JoinSet<Finished>,
    // Task id to request id, for tasks that fail to finish
    requests: HashMap<task::Id, u64>,
    next_request_id: u64,
}

impl Session {
    pub fn builder(config: ConnectionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Appends the user's message and starts a completion for the
    /// whole transcript. Must be called from within a tokio runtime.
    pub fn send(&mut self, text: &str) -> u64 {
        self.transcript.append(Message::new(Role::User, text));

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let messages = self.transcript.snapshot();
        let config = self.config.clone();
        let client = Arc::clone(&self.client);
        tracing::debug!("Starting request {} with {} messages", request_id, messages.len());

        let handle = self.tasks.spawn(async move {
            let result = client.complete(&messages, &config).await;
            Finished { request_id, result }
        });
        self.requests.insert(handle.id(), request_id);

        request_id
    }

    /// Waits for the next request to finish and appends its messages
    /// to the transcript. Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        let Finished { request_id, result } = match self.tasks.join_next_with_id().await? {
            Ok((id, finished)) => {
                self.requests.remove(&id);
                finished
            }
            Err(err) => {
                tracing::warn!("Completion task failed: {}", err);
                let request_id = self.requests.remove(&err.id()).unwrap_or_default();
                Finished {
                    request_id,
                    result: CompletionResult::Failed(CompletionError::Transport {
                        message: err.to_string(),
                    }),
                }
            }
        };

        let failed = result.is_failed();
        let messages = result.into_messages();
        for m in messages.iter() {
            self.transcript.append(m.clone());
        }
        tracing::debug!(
            "Request {} finished with {} new messages",
            request_id,
            messages.len()
        );

        Some(Completion {
            request_id,
            messages,
            failed,
        })
    }

    /// Runs the next turn in the chat and waits for the response.
    pub async fn send_and_wait(&mut self, text: &str) -> Result<Completion, Error> {
        self.send(text);
        self.next_completion()
            .await
            .ok_or(anyhow!("No completion in flight"))
    }

    pub fn state(&self) -> SessionState {
        match self.tasks.len() {
            0 => SessionState::Idle,
            n => SessionState::Requesting { in_flight: n },
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Message> {
        self.transcript.subscribe()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Applies to requests started after this call.
    pub fn set_config(&mut self, config: ConnectionConfig) {
        self.config = config;
    }
}

pub struct SessionBuilder {
    config: ConnectionConfig,
    client: Option<Arc<dyn CompletionClient>>,
    transcript: Transcript,
}

impl SessionBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
            transcript: Transcript::new(),
        }
    }

    /// Defaults to an `OpenAiClient` with 30 second timeouts.
    pub fn build(self) -> Result<Session, Error> {
        let client = match self.client {
            Some(client) => client,
            None => Arc::new(OpenAiClient::new(ClientOptions::default())?),
        };

        Ok(Session {
            client,
            config: self.config,
            transcript: self.transcript,
            tasks: JoinSet::new(),
            requests: HashMap::new(),
            next_request_id: 0,
        })
    }

    pub fn client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn transcript(mut self, messages: Vec<Message>) -> Self {
        self.transcript = Transcript::new_with_messages(messages);
        self
    }
}
