//! HTTP client for the reasoning service.
//!
//! [`TransportClient`] owns the session token, the retry policy for
//! request/response calls, and the stream→non-stream fallback for
//! `/chat/stream`.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;
use crate::error::{AgentError, Result};
use crate::transport::retry::RetryPolicy;
use crate::transport::streaming::{LineBuffer, LineEvent, parse_line};
use crate::transport::types::{
    ChatReply, ChatRequestBody, ChatResponseBody, Mode, Session, StreamFragment,
};

/// Lazily evaluated sequence of streamed fragments.
pub type FragmentStream = BoxStream<'static, Result<StreamFragment>>;

/// Raw body chunks of an open stream.
type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Client for the `/chat` family of endpoints.
///
/// Cheap to clone; clones share the session token and connection pools.
#[derive(Debug, Clone)]
pub struct TransportClient {
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    retry: RetryPolicy,
    http: reqwest::Client,
    /// `/chat/stream` only.  No total deadline; a stream may run as long as
    /// the service keeps sending, but each read must arrive within the
    /// request timeout.
    http_stream: reqwest::Client,
}

impl TransportClient {
    /// Create a client and mint its session token.
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AgentError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        let http_stream = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .build()
            .map_err(|e| AgentError::Config {
                reason: format!("failed to build streaming HTTP client: {e}"),
            })?;

        let session = Session::new(config.default_mode);
        info!(session_id = %session.id, base_url = %config.base_url, "transport client ready");

        Ok(Self {
            retry: RetryPolicy::from_config(&config),
            session: Arc::new(session),
            config,
            http,
            http_stream,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Request / response
    // -----------------------------------------------------------------------

    /// Send one turn and wait for the full reply, retrying transient failures.
    pub async fn send_turn(&self, message: &str, mode: Mode) -> Result<ChatReply> {
        let body = ChatRequestBody::new(message, &self.session, mode);
        self.retry
            .run("chat", || self.post_chat(&body, None))
            .await
    }

    /// Send one turn in the "precise" register used for planning and
    /// classification: code mode and the shorter planner timeout.
    pub async fn send_turn_precise(&self, message: &str) -> Result<ChatReply> {
        let body = ChatRequestBody::new(message, &self.session, Mode::Code);
        let timeout = Some(self.config.planner_timeout());
        self.retry
            .run("chat_precise", || self.post_chat(&body, timeout))
            .await
    }

    /// A single `/chat` attempt.
    async fn post_chat(
        &self,
        body: &ChatRequestBody,
        timeout: Option<std::time::Duration>,
    ) -> Result<ChatReply> {
        let url = self.config.endpoint("/chat");
        debug!(url = %url, mode = %body.mode, session_id = %body.session_id, "sending chat request");

        let mut request = self.http.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(AgentError::Request {
                status: Some(status.as_u16()),
                reason: format!("service returned {status}: {}", truncate(&text, 200)),
            });
        }

        let parsed: ChatResponseBody =
            serde_json::from_str(&text).map_err(|e| AgentError::Protocol {
                reason: format!("invalid /chat response: {e}"),
            })?;

        if let Some(usage) = parsed.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat usage"
            );
        }

        Ok(parsed.into())
    }

    // -----------------------------------------------------------------------
    // Streaming
    // -----------------------------------------------------------------------

    /// Stream one turn as fragments.
    ///
    /// Nothing is sent until the stream is first polled.  If the connection
    /// cannot be opened, or the body fails before any fragment was produced,
    /// the turn is sent through [`send_turn`](Self::send_turn) instead and
    /// its full text is yielded as a single terminal fragment.  `cancel` is
    /// checked before every fragment is handed out; once it fires the stream
    /// simply ends.
    pub fn stream_turn(
        &self,
        message: &str,
        mode: Mode,
        cancel: CancellationToken,
    ) -> FragmentStream {
        let cursor = StreamCursor {
            client: self.clone(),
            message: message.to_owned(),
            mode,
            cancel,
            phase: Phase::Opening,
            pending: VecDeque::new(),
            yielded: 0,
        };
        futures::stream::unfold(cursor, StreamCursor::advance).boxed()
    }

    /// Open `/chat/stream` and hand back its body as raw chunks.
    async fn open_stream(&self, message: &str, mode: Mode) -> Result<ByteStream> {
        let url = self.config.endpoint("/chat/stream");
        let body = ChatRequestBody::new(message, &self.session, mode);
        debug!(url = %url, mode = %mode, "opening chat stream");

        let resp = self
            .http_stream
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Request {
                status: Some(status.as_u16()),
                reason: format!("stream returned {status}: {}", truncate(&text, 200)),
            });
        }

        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(AgentError::from))
            .boxed())
    }

    // -----------------------------------------------------------------------
    // Pass-through endpoints
    // -----------------------------------------------------------------------

    /// `GET /health`.
    pub async fn health(&self) -> Result<Value> {
        self.get_json("/health", &[]).await
    }

    /// `GET /chat/sessions`.
    pub async fn list_sessions(&self) -> Result<Value> {
        self.get_json("/chat/sessions", &[]).await
    }

    /// `GET /chat/sessions/:id`.
    pub async fn get_session(&self, id: &str) -> Result<Value> {
        self.get_json(&format!("/chat/sessions/{id}"), &[]).await
    }

    /// `DELETE /chat/sessions/:id`.
    pub async fn delete_session(&self, id: &str) -> Result<Value> {
        let url = self.config.endpoint(&format!("/chat/sessions/{id}"));
        debug!(url = %url, "DELETE");
        let resp = self.http.delete(&url).send().await?;
        read_json(resp).await
    }

    /// `GET /knowledge/search?q=`.
    pub async fn knowledge_search(&self, query: &str) -> Result<Value> {
        self.get_json("/knowledge/search", &[("q", query)]).await
    }

    /// `GET /knowledge/domains`.
    pub async fn knowledge_domains(&self) -> Result<Value> {
        self.get_json("/knowledge/domains", &[]).await
    }

    /// `GET /knowledge/stats`.
    pub async fn knowledge_stats(&self) -> Result<Value> {
        self.get_json("/knowledge/stats", &[]).await
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.config.endpoint(path);
        debug!(url = %url, "GET");
        let resp = self.http.get(&url).query(query).send().await?;
        read_json(resp).await
    }
}

async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        return Err(AgentError::Request {
            status: Some(status.as_u16()),
            reason: format!("service returned {status}: {}", truncate(&text, 200)),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| AgentError::Protocol {
        reason: format!("invalid JSON body: {e}"),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Stream state machine
// ---------------------------------------------------------------------------

enum Phase {
    Opening,
    Reading { body: ByteStream, lines: LineBuffer },
    Finished,
}

/// State threaded through [`futures::stream::unfold`].
struct StreamCursor {
    client: TransportClient,
    message: String,
    mode: Mode,
    cancel: CancellationToken,
    phase: Phase,
    pending: VecDeque<StreamFragment>,
    yielded: usize,
}

impl StreamCursor {
    async fn advance(mut self) -> Option<(Result<StreamFragment>, Self)> {
        loop {
            if self.cancel.is_cancelled() {
                debug!(yielded = self.yielded, "stream cancelled");
                return None;
            }

            if let Some(fragment) = self.pending.pop_front() {
                self.yielded += 1;
                return Some((Ok(fragment), self));
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Finished => return None,

                Phase::Opening => {
                    match self.client.open_stream(&self.message, self.mode).await {
                        Ok(body) => {
                            self.phase = Phase::Reading {
                                body,
                                lines: LineBuffer::new(),
                            };
                        }
                        Err(e) => {
                            warn!(error = %e, "stream unavailable, falling back to /chat");
                            return self.fall_back().await;
                        }
                    }
                }

                Phase::Reading { mut body, mut lines } => match body.next().await {
                    Some(Ok(chunk)) => {
                        let ended = self.absorb(lines.push(&chunk));
                        if !ended {
                            self.phase = Phase::Reading { body, lines };
                        }
                    }
                    Some(Err(e)) => {
                        if self.yielded == 0 && self.pending.is_empty() {
                            warn!(error = %e, "stream failed before first fragment, falling back to /chat");
                            return self.fall_back().await;
                        }
                        warn!(error = %e, yielded = self.yielded, "stream broke mid-reply");
                        return Some((
                            Err(AgentError::Transport {
                                attempts: 1,
                                reason: e.to_string(),
                            }),
                            self,
                        ));
                    }
                    None => {
                        if let Some(tail) = lines.finish() {
                            self.absorb(vec![tail]);
                        }
                    }
                },
            }
        }
    }

    /// Queue fragments from complete lines.  Returns `true` once the stream
    /// has signalled its end.
    fn absorb(&mut self, lines: Vec<String>) -> bool {
        for line in lines {
            match parse_line(&line) {
                LineEvent::Ignore => {}
                LineEvent::End => {
                    trace!("stream end marker");
                    return true;
                }
                LineEvent::Record { chunk, done } => {
                    if let Some(text) = chunk.filter(|c| !c.is_empty()) {
                        self.pending.push_back(StreamFragment::new(text, done));
                    }
                    if done {
                        return true;
                    }
                }
                LineEvent::Malformed { reason } => {
                    warn!(reason = %reason, line = %truncate(&line, 120), "skipping malformed stream line");
                }
            }
        }
        false
    }

    /// Replace the stream with one `/chat` call yielding a single fragment.
    async fn fall_back(mut self) -> Option<(Result<StreamFragment>, Self)> {
        self.phase = Phase::Finished;
        self.pending.clear();

        let result = self.client.send_turn(&self.message, self.mode).await;
        if self.cancel.is_cancelled() {
            return None;
        }

        match result {
            Ok(reply) => {
                self.yielded += 1;
                Some((Ok(StreamFragment::new(reply.text, true)), self))
            }
            Err(e) => Some((Err(e), self)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> Arc<ClientConfig> {
        Arc::new(ClientConfig {
            base_url: "http://127.0.0.1:9".into(),
            max_attempts: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            ..ClientConfig::default()
        })
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = Arc::new(ClientConfig {
            base_url: "nope".into(),
            ..ClientConfig::default()
        });
        assert!(TransportClient::new(config).is_err());
    }

    #[test]
    fn session_token_is_stable_across_clones() {
        let client = TransportClient::new(unreachable_config()).unwrap();
        let clone = client.clone();
        assert_eq!(client.session().id, clone.session().id);
        assert_eq!(client.session().mode, Mode::General);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("hi", 5), "hi");
    }

    #[tokio::test]
    async fn cancelled_stream_yields_nothing_and_sends_nothing() {
        let client = TransportClient::new(unreachable_config()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let fragments: Vec<_> = client
            .stream_turn("hello", Mode::General, cancel)
            .collect()
            .await;
        assert!(fragments.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_surfaces_one_transport_error() {
        let client = TransportClient::new(unreachable_config()).unwrap();
        let items: Vec<_> = client
            .stream_turn("hello", Mode::General, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(AgentError::Transport { .. })));
    }
}
