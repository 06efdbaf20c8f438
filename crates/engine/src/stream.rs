//! Streaming replies with deferred turn recording.

use contextweave_core::error::{Error, ProviderError, Result};
use contextweave_core::memory::MemoryStore;
use contextweave_core::message::{ConversationId, Message};
use contextweave_core::provider::StreamChunk;
use futures::Stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    /// The final chunk has been handed out; recording happens on the next poll
    Ending,
    Recorded,
    Failed,
}

/// A model reply arriving as text increments.
///
/// The turn (prompt messages plus the full reply) is appended to memory
/// only once the stream has been drained to its end, either by polling
/// [`next_delta`](Self::next_delta) until it returns `None` or by calling
/// [`finalize`](Self::finalize). Dropping the stream early, or a provider
/// error mid-stream, records nothing. A finished stream cannot be restarted.
pub struct TurnStream {
    receiver: mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
    store: Arc<dyn MemoryStore>,
    conversation_id: ConversationId,
    turn: Vec<Message>,
    reply: String,
    state: StreamState,
}

impl TurnStream {
    pub(crate) fn new(
        receiver: mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        store: Arc<dyn MemoryStore>,
        conversation_id: ConversationId,
        turn: Vec<Message>,
    ) -> Self {
        Self {
            receiver,
            store,
            conversation_id,
            turn,
            reply: String::new(),
            state: StreamState::Streaming,
        }
    }

    /// The reply text received so far.
    pub fn text(&self) -> &str {
        &self.reply
    }

    /// Whether the turn has been written to memory.
    pub fn is_recorded(&self) -> bool {
        self.state == StreamState::Recorded
    }

    /// The next text increment, or `None` once the stream is over.
    ///
    /// Reaching the end records the turn; a recording failure is returned
    /// as the last item.
    pub async fn next_delta(&mut self) -> Option<Result<String>> {
        loop {
            match self.state {
                StreamState::Recorded | StreamState::Failed => return None,
                StreamState::Ending => return self.record().await.err().map(Err),
                StreamState::Streaming => {}
            }

            match self.receiver.recv().await {
                Some(Ok(chunk)) => {
                    if chunk.done {
                        self.state = StreamState::Ending;
                    }
                    match chunk.content {
                        Some(delta) if !delta.is_empty() => {
                            self.reply.push_str(&delta);
                            return Some(Ok(delta));
                        }
                        _ => continue,
                    }
                }
                Some(Err(e)) => {
                    warn!(conversation = %self.conversation_id, error = %e, "Stream failed, turn not recorded");
                    self.state = StreamState::Failed;
                    return Some(Err(Error::Provider(e)));
                }
                None => self.state = StreamState::Ending,
            }
        }
    }

    /// Drain the rest of the stream, record the turn, and return the reply.
    pub async fn finalize(mut self) -> Result<Message> {
        while let Some(delta) = self.next_delta().await {
            delta?;
        }
        match self.state {
            StreamState::Recorded => Ok(Message::assistant(self.reply)),
            _ => Err(Error::Provider(ProviderError::StreamInterrupted(
                "stream already failed".into(),
            ))),
        }
    }

    /// Adapt into a [`Stream`] of text increments.
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_delta().await.map(|item| (item, stream))
        })
    }

    async fn record(&mut self) -> Result<()> {
        let mut messages = std::mem::take(&mut self.turn);
        messages.push(Message::assistant(self.reply.clone()));
        match self.store.append_all(&self.conversation_id, messages).await {
            Ok(records) => {
                self.state = StreamState::Recorded;
                debug!(conversation = %self.conversation_id, recorded = records.len(), "Recorded streamed turn");
                Ok(())
            }
            Err(e) => {
                self.state = StreamState::Failed;
                Err(e.into())
            }
        }
    }
}
