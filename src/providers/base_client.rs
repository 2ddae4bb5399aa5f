use crate::core::error::ChatError;
use crate::providers::StreamEvent;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Turns the `data:` payloads of a server-sent event stream into events.
pub trait SseDecoder: Send + 'static {
    fn decode(&mut self, data: &str) -> Result<Vec<StreamEvent>, ChatError>;

    /// Called once the body ends, to flush anything still buffered.
    fn finish(&mut self) -> Result<Vec<StreamEvent>, ChatError> {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth_header: Option<(String, String)>,
    extra_headers: HashMap<String, String>,
}

impl HttpClient {
    pub fn new(
        base_url: String,
        auth_header: Option<(String, String)>,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
            extra_headers: extra_headers.unwrap_or_default(),
        }
    }

    pub async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
    ) -> Result<Response, ChatError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "POST");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some((name, value)) = &self.auth_header {
            request = request.header(name, value);
        }
        for (key, value) in &self.extra_headers {
            request = request.header(key, value);
        }

        let response = request.json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api(format!("{}: {}", status, body.trim())));
        }
        Ok(response)
    }

    /// Decodes a streaming response body. Lines split across network chunks
    /// are reassembled before they reach the decoder.
    pub fn stream_events<D: SseDecoder>(
        response: Response,
        decoder: D,
    ) -> BoxStream<'static, Result<StreamEvent, ChatError>> {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from))
            .boxed();
        decode_sse(body, decoder)
    }
}

struct SseState<D> {
    body: BoxStream<'static, Result<Vec<u8>, ChatError>>,
    buffer: Vec<u8>,
    decoder: D,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl<D: SseDecoder> SseState<D> {
    fn feed_line(&mut self, line: &str) -> Result<(), ChatError> {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            trace!(data, "sse data");
            let events = self.decoder.decode(data.trim())?;
            self.pending.extend(events);
        }
        Ok(())
    }

    fn feed_complete_lines(&mut self) -> Result<(), ChatError> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.feed_line(&line)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ChatError> {
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).into_owned();
            self.feed_line(&rest)?;
        }
        let events = self.decoder.finish()?;
        self.pending.extend(events);
        Ok(())
    }
}

pub(crate) fn decode_sse<D: SseDecoder>(
    body: BoxStream<'static, Result<Vec<u8>, ChatError>>,
    decoder: D,
) -> BoxStream<'static, Result<StreamEvent, ChatError>> {
    let state = SseState {
        body,
        buffer: Vec::new(),
        decoder,
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }

            let step = match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    state.feed_complete_lines()
                }
                Some(Err(e)) => Err(e),
                None => {
                    state.done = true;
                    state.finish()
                }
            };
            if let Err(e) = step {
                state.done = true;
                state.pending.clear();
                return Some((Err(e), state));
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Emits each data payload verbatim as a text event.
    struct Echo;

    impl SseDecoder for Echo {
        fn decode(&mut self, data: &str) -> Result<Vec<StreamEvent>, ChatError> {
            if data == "boom" {
                return Err(ChatError::Api("boom".to_string()));
            }
            Ok(vec![StreamEvent::Text(data.to_string())])
        }

        fn finish(&mut self) -> Result<Vec<StreamEvent>, ChatError> {
            Ok(vec![StreamEvent::Text("<end>".to_string())])
        }
    }

    fn body(chunks: &[&str]) -> BoxStream<'static, Result<Vec<u8>, ChatError>> {
        let chunks: Vec<Result<Vec<u8>, ChatError>> =
            chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect();
        stream::iter(chunks).boxed()
    }

    async fn collect(stream: BoxStream<'static, Result<StreamEvent, ChatError>>) -> Vec<String> {
        stream
            .map(|event| match event {
                Ok(StreamEvent::Text(text)) => text,
                Ok(other) => format!("{other:?}"),
                Err(e) => format!("error: {e}"),
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let stream = decode_sse(
            body(&["event: x\ndata: hel", "lo\r\n\ndata: wor", "ld\n", "data: tail"]),
            Echo,
        );
        assert_eq!(collect(stream).await, vec!["hello", "world", "tail", "<end>"]);
    }

    #[tokio::test]
    async fn multibyte_characters_survive_chunk_boundaries() {
        let bytes = "data: héllo\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        let chunks: Vec<Result<Vec<u8>, ChatError>> = vec![Ok(a.to_vec()), Ok(b.to_vec())];
        let stream = decode_sse(stream::iter(chunks).boxed(), Echo);
        assert_eq!(collect(stream).await, vec!["héllo", "<end>"]);
    }

    #[tokio::test]
    async fn decoder_errors_end_the_stream() {
        let stream = decode_sse(body(&["data: a\ndata: boom\ndata: c\n"]), Echo);
        assert_eq!(collect(stream).await, vec!["a", "error: API error: boom"]);
    }
}
