use crate::{
    config::ModelScopeConfig,
    error::{Result, ZImageError},
    models::{ApiErrorInfo, ChatCompletionRequest, ChatMessage, ChatRole, ModelInfo, CHAT_MODELS},
    transport::{HttpRequest, HttpResponse, HttpTransport, ResponseBody},
};
use futures::StreamExt;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use super::stream::{extract_content, parse_event_line, LineDecoder};

const CHAT_PATH: &str = "v1/chat/completions";

#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn HttpTransport>,
    config: ModelScopeConfig,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn HttpTransport>, config: ModelScopeConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ModelScopeConfig {
        &self.config
    }

    pub fn supported_models() -> &'static [ModelInfo] {
        CHAT_MODELS
    }

    /// Buffered completion: one request, one reply.
    pub async fn ask(&self, transcript: &[ChatMessage], model: Option<&str>) -> Result<String> {
        let request = self.build_request(transcript, model, false)?;
        let response = Self::check_status(self.transport.send(request).await?).await?;
        let body = response.into_bytes().await?;
        Self::reply_from_body(&body)
    }

    /// Streamed completion. `on_fragment` sees each piece of text in arrival
    /// order and the concatenation of those pieces is returned.
    ///
    /// Cancelling `cancel` drops the in-flight request and fails the call with
    /// `Cancelled`; no fragment is delivered after that point. Text already
    /// handed to `on_fragment` is the caller's to keep or discard.
    pub async fn ask_streaming<F>(
        &self,
        transcript: &[ChatMessage],
        model: Option<&str>,
        mut on_fragment: F,
        cancel: &CancellationToken,
    ) -> Result<String>
    where
        F: FnMut(&str) + Send,
    {
        if cancel.is_cancelled() {
            return Err(ZImageError::Cancelled);
        }
        let request = self.build_request(transcript, model, true)?;

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Chat request cancelled before response");
                return Err(ZImageError::Cancelled);
            }
            response = self.transport.send(request) => response?,
        };
        let response = Self::check_status(response).await?;

        let mut stream = match response.body {
            ResponseBody::Stream(stream) => stream,
            ResponseBody::Complete(body) => {
                log::debug!("Chat response was not streamed, delivering it whole");
                let reply = Self::reply_from_body(&body)?;
                if cancel.is_cancelled() {
                    return Err(ZImageError::Cancelled);
                }
                on_fragment(&reply);
                return Ok(reply);
            }
        };

        let mut decoder = LineDecoder::new();
        let mut reply = String::new();
        let mut fragments = 0usize;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("Chat stream cancelled after {} fragment(s)", fragments);
                    return Err(ZImageError::Cancelled);
                }
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                break;
            };
            let chunk = chunk.map_err(|e| {
                log::error!("Chat stream broke after {} fragment(s): {}", fragments, e);
                e
            })?;

            for line in decoder.push(&chunk) {
                fragments += deliver(&line, cancel, &mut reply, &mut on_fragment)?;
            }
        }
        if let Some(line) = decoder.finish() {
            fragments += deliver(&line, cancel, &mut reply, &mut on_fragment)?;
        }

        log::debug!(
            "Chat stream finished: {} fragment(s), {} chars",
            fragments,
            reply.chars().count()
        );
        Ok(reply)
    }

    /// Pull-based form of `ask_streaming`. The stream yields each fragment and
    /// ends after the last one, or with a single `Err`. Dropping it cancels the
    /// request.
    pub fn fragment_stream(
        &self,
        transcript: Vec<ChatMessage>,
        model: Option<String>,
        cancel: CancellationToken,
    ) -> UnboundedReceiverStream<Result<String>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.clone();
        let token = cancel.child_token();

        tokio::spawn(async move {
            let sink = tx.clone();
            let abort = token.clone();
            let request = client.ask_streaming(
                &transcript,
                model.as_deref(),
                move |fragment| {
                    if sink.send(Ok(fragment.to_string())).is_err() {
                        abort.cancel();
                    }
                },
                &token,
            );

            // The receiver may go away while the upstream is silent, so watch
            // for it instead of waiting for the next send to fail.
            let result = tokio::select! {
                result = request => result,
                _ = tx.closed() => {
                    log::debug!("Fragment stream dropped, abandoning chat request");
                    token.cancel();
                    return;
                }
            };
            if let Err(e) = result {
                let _ = tx.send(Err(e));
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    fn build_request(
        &self,
        transcript: &[ChatMessage],
        model: Option<&str>,
        stream: bool,
    ) -> Result<HttpRequest> {
        if transcript.is_empty() {
            return Err(ZImageError::InvalidRequest("transcript must not be empty".into()));
        }
        let api_key = self.config.api_key()?;
        let model = model.unwrap_or(self.config.chat_model.as_str());

        let system = ChatMessage::system(self.config.system_prompt.as_str());
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        if transcript[0].role != ChatRole::System {
            messages.push(&system);
        }
        messages.extend(transcript.iter());

        let body = ChatCompletionRequest {
            model,
            messages,
            stream,
            max_tokens: stream.then_some(self.config.max_chat_tokens),
        };

        log::info!(
            "Sending chat request with model: {} ({} messages, stream: {})",
            model,
            body.messages.len(),
            stream
        );

        Ok(
            HttpRequest::post_json(self.config.endpoint(CHAT_PATH), &serde_json::to_value(&body)?)?
                .bearer(api_key)
                .streaming(stream),
        )
    }

    async fn check_status(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status;
        let body = response.into_bytes().await.unwrap_or_default();
        let info = ApiErrorInfo::from_response(status, &body);
        log::error!("{}", info);
        Err(ZImageError::ChatRequestFailed(info))
    }

    fn reply_from_body(body: &[u8]) -> Result<String> {
        let content = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|json| extract_content(&json, "message").map(str::to_string))
            .filter(|content| !content.is_empty());
        content.ok_or_else(|| ZImageError::ProtocolError("empty response content".into()))
    }
}

/// Hands the text of one event line to the caller. Returns how many
/// fragments were delivered (0 or 1).
fn deliver<F>(
    line: &str,
    cancel: &CancellationToken,
    reply: &mut String,
    on_fragment: &mut F,
) -> Result<usize>
where
    F: FnMut(&str),
{
    let Some(piece) = parse_event_line(line) else {
        return Ok(0);
    };
    if cancel.is_cancelled() {
        return Err(ZImageError::Cancelled);
    }
    on_fragment(&piece);
    reply.push_str(&piece);
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ByteStream;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Flips the shared flag once the response stream holding it is dropped.
    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    enum Scripted {
        Chunks(Vec<Vec<u8>>),
        /// Yields the chunks, then never finishes.
        ChunksThenHang(Vec<Vec<u8>>),
        Whole(u16, String),
    }

    struct ScriptedTransport {
        script: Mutex<Option<Scripted>>,
        bodies: Mutex<Vec<serde_json::Value>>,
        released: Arc<AtomicBool>,
    }

    impl ScriptedTransport {
        fn new(script: Scripted) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(Some(script)),
                bodies: Mutex::new(Vec::new()),
                released: Arc::new(AtomicBool::new(false)),
            })
        }

        fn last_body(&self) -> serde_json::Value {
            self.bodies.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            let body: serde_json::Value =
                serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
            self.bodies.lock().unwrap().push(body);

            let script = self.script.lock().unwrap().take().unwrap();
            let (status, body) = match script {
                Scripted::Chunks(chunks) => {
                    let stream: ByteStream = Box::pin(stream::iter(chunks.into_iter().map(Ok)));
                    (200, ResponseBody::Stream(stream))
                }
                Scripted::ChunksThenHang(chunks) => {
                    let guard = ReleaseFlag(self.released.clone());
                    let stream: ByteStream = Box::pin(
                        stream::iter(chunks.into_iter().map(Ok))
                            .chain(stream::pending())
                            .map(move |chunk| {
                                let _held = &guard;
                                chunk
                            }),
                    );
                    (200, ResponseBody::Stream(stream))
                }
                Scripted::Whole(status, body) => (status, ResponseBody::Complete(body.into_bytes())),
            };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body,
            })
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> ChatClient {
        let config = ModelScopeConfig::new()
            .with_api_key("ms-test")
            .with_system_prompt("be brief");
        ChatClient::new(transport, config)
    }

    fn delta_line(text: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": text}}]})
        )
    }

    /// Concatenates the lines and cuts them into `size`-byte reads.
    fn split_every(lines: &[String], size: usize) -> Vec<Vec<u8>> {
        lines.concat().as_bytes().chunks(size).map(<[u8]>::to_vec).collect()
    }

    #[tokio::test]
    async fn test_streamed_fragments_in_order() {
        let lines = vec![
            delta_line("He"),
            delta_line("llo"),
            "data: [DONE]\n".to_string(),
        ];
        let transport = ScriptedTransport::new(Scripted::Chunks(split_every(&lines, 1024)));
        let client = client(transport.clone());

        let mut seen = Vec::new();
        let reply = client
            .ask_streaming(
                &[ChatMessage::user("hi")],
                None,
                |f| seen.push(f.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["He", "llo"]);
        assert_eq!(reply, "Hello");

        let body = transport.last_body();
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["model"], "deepseek-ai/DeepSeek-V3.2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_any_read_split_reassembles_text() {
        let lines = vec![
            delta_line("天气"),
            "\r\n".to_string(),
            delta_line("很好 ☀️"),
            delta_line(", thanks"),
        ];
        for size in 1..12 {
            let transport = ScriptedTransport::new(Scripted::Chunks(split_every(&lines, size)));
            let mut joined = String::new();
            let reply = client(transport)
                .ask_streaming(
                    &[ChatMessage::user("weather?")],
                    None,
                    |f| joined.push_str(f),
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(reply, "天气很好 ☀️, thanks", "read size {}", size);
            assert_eq!(joined, reply);
        }
    }

    #[tokio::test]
    async fn test_malformed_line_is_skipped_and_tail_flushed() {
        let lines = vec![
            delta_line("a"),
            "data: {\"choices\": [\n".to_string(),
            ": keep-alive\n".to_string(),
            delta_line("b"),
            // No trailing newline on the last event.
            delta_line("c").trim_end().to_string(),
        ];
        let transport = ScriptedTransport::new(Scripted::Chunks(split_every(&lines, 7)));
        let reply = client(transport)
            .ask_streaming(&[ChatMessage::user("x")], None, |_| {}, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply, "abc");
    }

    #[tokio::test]
    async fn test_existing_system_message_is_kept() {
        let transport = ScriptedTransport::new(Scripted::Whole(
            200,
            r#"{"choices":[{"message":{"content":"ok"}}]}"#.to_string(),
        ));
        let client = client(transport.clone());
        let transcript = [ChatMessage::system("custom"), ChatMessage::user("hi")];

        let reply = client.ask(&transcript, Some("Qwen/Qwen3-235B-A22B-Instruct-2507")).await.unwrap();
        assert_eq!(reply, "ok");

        let body = transport.last_body();
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["model"], "Qwen/Qwen3-235B-A22B-Instruct-2507");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["content"], "custom");
    }

    #[tokio::test]
    async fn test_unstreamed_body_is_one_fragment() {
        let transport = ScriptedTransport::new(Scripted::Whole(
            200,
            r#"{"choices":[{"message":{"content":"whole reply"}}]}"#.to_string(),
        ));
        let mut seen = Vec::new();
        let reply = client(transport)
            .ask_streaming(
                &[ChatMessage::user("hi")],
                None,
                |f| seen.push(f.to_string()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(seen, vec!["whole reply"]);
        assert_eq!(reply, "whole reply");
    }

    #[tokio::test]
    async fn test_empty_buffered_reply() {
        let transport = ScriptedTransport::new(Scripted::Whole(
            200,
            r#"{"choices":[{"message":{"content":""}}]}"#.to_string(),
        ));
        let err = client(transport)
            .ask(&[ChatMessage::user("hi")], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ZImageError::ProtocolError(ref m) if m == "empty response content"));
    }

    #[tokio::test]
    async fn test_error_body_is_classified() {
        let transport = ScriptedTransport::new(Scripted::Whole(
            429,
            r#"{"error":{"code":"Throttling","type":"rate_limit","message":"slow down"},"request_id":"req-7"}"#
                .to_string(),
        ));
        let err = client(transport)
            .ask_streaming(&[ChatMessage::user("hi")], None, |_| {}, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Chat error 429 [Throttling] (rate_limit): slow down | req: req-7"
        );
        assert_eq!(err.status(), Some(429));
    }

    #[tokio::test]
    async fn test_cancel_from_callback_stops_delivery() {
        // Both fragments arrive in a single read.
        let lines = vec![delta_line("He"), delta_line("llo")];
        let transport = ScriptedTransport::new(Scripted::ChunksThenHang(split_every(&lines, 4096)));
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        let err = client(transport)
            .ask_streaming(
                &[ChatMessage::user("hi")],
                None,
                |f| {
                    seen.push(f.to_string());
                    cancel.cancel();
                },
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(seen, vec!["He"]);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_bytes() {
        let transport =
            ScriptedTransport::new(Scripted::ChunksThenHang(split_every(&[delta_line("He")], 64)));
        let client = client(transport);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut seen = Vec::new();
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.ask_streaming(&[ChatMessage::user("hi")], None, |f| seen.push(f.to_string()), &cancel),
        )
        .await
        .expect("cancellation should end the call");
        assert!(matches!(result, Err(ZImageError::Cancelled)));
        assert_eq!(seen, vec!["He"]);
    }

    #[tokio::test]
    async fn test_fragment_stream() {
        let lines = vec![delta_line("He"), delta_line("llo"), "data: [DONE]\n".to_string()];
        let transport = ScriptedTransport::new(Scripted::Chunks(split_every(&lines, 5)));
        let stream = client(transport).fragment_stream(
            vec![ChatMessage::user("hi")],
            None,
            CancellationToken::new(),
        );
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;
        assert_eq!(fragments, vec!["He", "llo"]);
    }

    #[tokio::test]
    async fn test_empty_transcript_rejected() {
        let transport = ScriptedTransport::new(Scripted::Chunks(Vec::new()));
        let err = client(transport).ask(&[], None).await.unwrap_err();
        assert!(matches!(err, ZImageError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_dropping_fragment_stream_releases_request() {
        let transport =
            ScriptedTransport::new(Scripted::ChunksThenHang(split_every(&[delta_line("He")], 64)));
        let released = transport.released.clone();
        let mut stream = client(transport).fragment_stream(
            vec![ChatMessage::user("hi")],
            None,
            CancellationToken::new(),
        );

        let first = stream.next().await;
        assert!(matches!(first, Some(Ok(ref piece)) if piece == "He"));
        assert!(!released.load(Ordering::SeqCst));

        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !released.load(Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("response stream should be released after the consumer drops");
    }
}
