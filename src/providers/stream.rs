//! Incremental decoding of Server-Sent-Events response bodies.
//!
//! Both provider families stream `data: <json>` lines; they only differ in
//! where the text and reasoning deltas live inside each JSON payload, which is
//! what a [`DeltaParser`] extracts.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::error::ShuperError;

/// Result text reported for a reply the user stopped.
pub const STOPPED_BY_USER: &str = "[Stopped by user]";

const DONE_SENTINEL: &str = "[DONE]";

/// One decoded increment of a streamed reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
}

impl StreamDelta {
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.reasoning.as_deref().is_none_or(str::is_empty)
    }
}

/// Extracts the delta carried by one `data:` JSON payload.
pub type DeltaParser = fn(&Value) -> StreamDelta;

/// Callback receiving the accumulated reply after every non-empty delta.
pub type UpdateFn<'a> = dyn FnMut(&StreamAccumulator) + Send + 'a;

/// Running totals for one in-flight reply.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamAccumulator {
    pub text: String,
    pub reasoning: String,
}

impl StreamAccumulator {
    /// Appends a delta; returns whether anything changed.
    pub fn apply(&mut self, delta: &StreamDelta) -> bool {
        let mut changed = false;
        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            self.text.push_str(content);
            changed = true;
        }
        if let Some(reasoning) = delta.reasoning.as_deref().filter(|r| !r.is_empty()) {
            self.reasoning.push_str(reasoning);
            changed = true;
        }
        changed
    }

    pub fn reasoning(&self) -> Option<&str> {
        Some(self.reasoning.as_str()).filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(StreamAccumulator),
    /// The cancellation token fired; `partial` holds what arrived before it.
    Cancelled { partial: StreamAccumulator },
}

impl StreamOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamOutcome::Cancelled { .. })
    }

    /// Final reply text; cancelled replies collapse to [`STOPPED_BY_USER`].
    pub fn text(&self) -> &str {
        match self {
            StreamOutcome::Completed(acc) => &acc.text,
            StreamOutcome::Cancelled { .. } => STOPPED_BY_USER,
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        match self {
            StreamOutcome::Completed(acc) => acc.reasoning(),
            StreamOutcome::Cancelled { partial } => partial.reasoning(),
        }
    }
}

/// Line-buffered SSE decoder. Bytes are buffered until a newline so that
/// payloads (and multi-byte characters) split across reads decode intact.
pub struct SseDecoder {
    buffer: Vec<u8>,
    parser: DeltaParser,
    done: bool,
}

impl SseDecoder {
    pub fn new(parser: DeltaParser) -> Self {
        Self {
            buffer: Vec::new(),
            parser,
            done: false,
        }
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes a chunk and returns the deltas of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamDelta> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut deltas = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut deltas);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        deltas
    }

    /// Flushes a trailing line left without a newline at end of body.
    pub fn finish(&mut self) -> Vec<StreamDelta> {
        let mut deltas = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut deltas);
        }
        deltas
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<StreamDelta>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_SENTINEL {
            self.done = true;
            return;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(json) => {
                let delta = (self.parser)(&json);
                if !delta.is_empty() {
                    out.push(delta);
                }
            }
            Err(e) => {
                let err = ShuperError::StreamMalformed(e.to_string());
                tracing::debug!("Skipping stream line: {}", err);
            }
        }
    }
}

/// Reads an SSE body to completion, cancellation, or transport error.
///
/// Cancellation is observed before every read and between deltas, and a
/// cancelled decode never invokes `on_update` again.
pub async fn decode_sse<S, E>(
    body: S,
    parser: DeltaParser,
    cancel: &CancellationToken,
    on_update: &mut UpdateFn<'_>,
) -> Result<StreamOutcome, ShuperError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ShuperError>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::new(parser);
    let mut acc = StreamAccumulator::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Stream cancelled after {} chars", acc.text.len());
                return Ok(StreamOutcome::Cancelled { partial: acc });
            }
            item = body.next() => item,
        };

        let body_ended = next.is_none();
        let deltas = match next {
            Some(Ok(chunk)) => decoder.feed(&chunk),
            Some(Err(e)) => return Err(e.into()),
            None => decoder.finish(),
        };

        for delta in deltas {
            if cancel.is_cancelled() {
                return Ok(StreamOutcome::Cancelled { partial: acc });
            }
            if acc.apply(&delta) {
                on_update(&acc);
            }
        }

        if body_ended || decoder.is_done() {
            break;
        }
    }

    Ok(StreamOutcome::Completed(acc))
}

/// `choices[0].delta.{content, reasoning | reasoning_content}`
pub fn openai_delta_parser(json: &Value) -> StreamDelta {
    let delta = &json["choices"][0]["delta"];
    let text = |key: &str| delta.get(key).and_then(Value::as_str).map(str::to_string);

    StreamDelta {
        content: text("content"),
        reasoning: text("reasoning").or_else(|| text("reasoning_content")),
    }
}

/// `candidates[0].content.parts[*]`, where parts flagged `thought` are reasoning.
pub fn gemini_delta_parser(json: &Value) -> StreamDelta {
    let mut delta = StreamDelta::default();
    let Some(parts) = json["candidates"][0]["content"]["parts"].as_array() else {
        return delta;
    };

    for part in parts {
        let Some(text) = part.get("text").and_then(Value::as_str) else {
            continue;
        };
        let slot = if part.get("thought").and_then(Value::as_bool).unwrap_or(false) {
            &mut delta.reasoning
        } else {
            &mut delta.content
        };
        slot.get_or_insert_with(String::new).push_str(text);
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn openai_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    fn sample_body() -> String {
        let mut body = String::new();
        body.push_str(": keep-alive\n\n");
        body.push_str(&openai_line("Hel"));
        body.push_str("data: {\"choices\":[{\"delta\":{\"reasoning\":\"thinking…\"}}]}\n\n");
        body.push_str(&openai_line("lo, wörld"));
        body.push_str("data: {not json}\n\n");
        body.push_str(&openai_line("!"));
        body.push_str("data: [DONE]\n\n");
        body.push_str(&openai_line(" ignored"));
        body
    }

    async fn decode_chunks(chunks: Vec<Vec<u8>>) -> (StreamOutcome, usize) {
        let body = stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<Bytes, ShuperError>(Bytes::from(c))),
        );
        let cancel = CancellationToken::new();
        let mut updates = 0;
        let outcome = decode_sse(body, openai_delta_parser, &cancel, &mut |_| updates += 1)
            .await
            .unwrap();
        (outcome, updates)
    }

    #[tokio::test]
    async fn decodes_contiguous_body() {
        let (outcome, updates) = decode_chunks(vec![sample_body().into_bytes()]).await;
        let StreamOutcome::Completed(acc) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(acc.text, "Hello, wörld!");
        assert_eq!(acc.reasoning, "thinking…");
        assert_eq!(updates, 4);
    }

    #[tokio::test]
    async fn chunk_boundaries_do_not_change_result() {
        let bytes = sample_body().into_bytes();
        let (whole, _) = decode_chunks(vec![bytes.clone()]).await;

        for size in [1, 2, 3, 5, 7, 13, 64] {
            let chunks = bytes.chunks(size).map(<[u8]>::to_vec).collect();
            let (split, _) = decode_chunks(chunks).await;
            assert_eq!(split, whole, "chunk size {}", size);
        }
    }

    #[tokio::test]
    async fn done_sentinel_stops_consumption() {
        let body = format!("{}data: [DONE]\n{}", openai_line("a"), openai_line("b"));
        let (outcome, _) = decode_chunks(vec![body.into_bytes()]).await;
        assert_eq!(outcome.text(), "a");
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let body = format!(
            "{}data: {{\"choices\": [\n{}",
            openai_line("one "),
            openai_line("two")
        );
        let (outcome, updates) = decode_chunks(vec![body.into_bytes()]).await;
        assert_eq!(outcome.text(), "one two");
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_flushed() {
        let body = openai_line("tail").trim_end().to_string();
        let (outcome, _) = decode_chunks(vec![body.into_bytes()]).await;
        assert_eq!(outcome.text(), "tail");
    }

    #[tokio::test]
    async fn cancel_after_first_chunk_stops_updates() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, ShuperError>>();
        tx.unbounded_send(Ok(Bytes::from(openai_line("first")))).unwrap();
        tx.unbounded_send(Ok(Bytes::from(openai_line("second")))).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut seen = Vec::new();
        let outcome = decode_sse(rx, openai_delta_parser, &cancel, &mut |acc| {
            seen.push(acc.text.clone());
            trigger.cancel();
        })
        .await
        .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.text(), STOPPED_BY_USER);
        assert_eq!(seen, vec!["first".to_string()]);
        drop(tx);
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_next_chunk() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, ShuperError>>();
        tx.unbounded_send(Ok(Bytes::from(openai_line("partial")))).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = decode_sse(rx, openai_delta_parser, &cancel, &mut |_| {})
            .await
            .unwrap();
        match outcome {
            StreamOutcome::Cancelled { partial } => assert_eq!(partial.text, "partial"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        drop(tx);
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let body = stream::iter(vec![
            Ok(Bytes::from(openai_line("x"))),
            Err(ShuperError::TransportBlocked("reset".into())),
        ]);
        let cancel = CancellationToken::new();
        let err = decode_sse(body, openai_delta_parser, &cancel, &mut |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ShuperError::TransportBlocked(_)));
    }

    #[test]
    fn reasoning_content_alias_is_read() {
        let json = serde_json::json!({"choices": [{"delta": {"reasoning_content": "hmm"}}]});
        let delta = openai_delta_parser(&json);
        assert_eq!(delta.reasoning.as_deref(), Some("hmm"));
        assert!(delta.content.is_none());
    }

    #[test]
    fn gemini_thought_parts_become_reasoning() {
        let json = serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "plan", "thought": true},
                {"text": "Hi "},
                {"text": "there"}
            ]}}]
        });
        let delta = gemini_delta_parser(&json);
        assert_eq!(delta.content.as_deref(), Some("Hi there"));
        assert_eq!(delta.reasoning.as_deref(), Some("plan"));

        assert!(gemini_delta_parser(&serde_json::json!({"usageMetadata": {}})).is_empty());
    }
}
