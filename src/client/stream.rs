use std::pin::Pin;

use async_openai::types::CreateChatCompletionStreamResponse;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::Value;

use crate::{ApiError, PrysmError};

pub type ChatCompletionStream = Pin<
    Box<dyn Stream<Item = Result<CreateChatCompletionStreamResponse, PrysmError>> + Send>,
>;

const DONE: &str = "[DONE]";

/// Splits a server-sent event body into the data of each event, stopping at
/// `data: [DONE]`.
///
/// An event's `data:` lines are joined with `\n` and yielded when the blank
/// line ending the event arrives.
pub(crate) fn sse_data<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, PrysmError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<PrysmError>,
{
    async_stream::stream! {
        let mut chunks = Box::pin(chunks);
        let mut buffer: Vec<u8> = Vec::new();
        let mut event = EventData::default();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(chunk.as_ref()),
                Err(err) => {
                    yield Err(err.into());
                    return;
                }
            }

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                match event.feed(&line) {
                    Some(data) if data == DONE => return,
                    Some(data) => yield Ok(data),
                    None => {}
                }
            }
        }

        // The body may end without the blank line closing the last event
        match event.feed(&buffer).or_else(|| event.finish()) {
            Some(data) if data == DONE => {}
            Some(data) => yield Ok(data),
            None => {}
        }
    }
}

/// The `data:` lines of the event being read.
#[derive(Debug, Default)]
struct EventData {
    lines: Vec<String>,
}

impl EventData {
    /// Takes one line; returns the event's data when the line ends it.
    fn feed(&mut self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return self.finish();
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.lines.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        None
    }

    fn finish(&mut self) -> Option<String> {
        let data = self.lines.join("\n");
        self.lines.clear();
        (!data.is_empty()).then_some(data)
    }
}

/// Decodes chat completion chunks from a server-sent event body.
pub(crate) fn chat_completion_chunks<S, B, E>(chunks: S) -> ChatCompletionStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<PrysmError> + Send + 'static,
{
    let stream = sse_data(chunks).map(
        |data| -> Result<CreateChatCompletionStreamResponse, PrysmError> {
            let value: Value = serde_json::from_str(&data?)?;
            if value.get("error").is_some() {
                let body = value.to_string();
                return Err(PrysmError::Api(ApiError::from_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    body.as_bytes(),
                )));
            }
            Ok(serde_json::from_value(value)?)
        },
    );
    Box::pin(stream)
}
