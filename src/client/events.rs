use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use log::debug;
use reqwest::header::ACCEPT;
use tokio::time::Instant;

use super::core::{authorized_get, ApiClient};
use crate::auth::Token;
use crate::error::{ExtractError, Result};
use crate::resource::ResourcePath;

/// A stream that stays silent this long is considered finished.
pub const EVENT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

impl ApiClient {
    /// Subscribes to a server-sent event stream and records up to `max_events`
    /// events as `event:<type>\ndata:<payload>\n\n` blocks.
    ///
    /// Reading stops after `max_events` events, when the server closes the
    /// stream, or when no event arrives for [`EVENT_IDLE_TIMEOUT`]. All three
    /// are normal completions.
    pub async fn get_event_stream(
        &self,
        token: &Token,
        path: &ResourcePath,
        max_events: usize,
    ) -> Result<Vec<u8>> {
        self.read_event_stream(token, path, max_events, EVENT_IDLE_TIMEOUT)
            .await
    }

    pub(crate) async fn read_event_stream(
        &self,
        token: &Token,
        path: &ResourcePath,
        max_events: usize,
        idle_timeout: Duration,
    ) -> Result<Vec<u8>> {
        if max_events == 0 {
            return Ok(Vec::new());
        }

        let url = self.url(path.as_str());
        let response = self
            .transport()
            .open_stream(&url, |client| {
                authorized_get(client, &url, token).header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
            })
            .await?;

        collect_events(&url, response.bytes_stream(), max_events, idle_timeout).await
    }
}

#[derive(Debug, PartialEq, Eq)]
struct ServerEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` parser; chunks may split lines anywhere.
#[derive(Default)]
struct EventParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl EventParser {
    fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            if let Some(event) = self.process_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<ServerEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let event = self.event.take();
        if event.is_none() && self.data.is_empty() {
            return None;
        }

        let data = std::mem::take(&mut self.data).join("\n");
        Some(ServerEvent {
            event: event.unwrap_or_default(),
            data,
        })
    }
}

async fn collect_events<S, B, E>(
    url: &str,
    stream: S,
    max_events: usize,
    idle_timeout: Duration,
) -> Result<Vec<u8>>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut parser = EventParser::default();
    let mut output = Vec::new();
    let mut received = 0;

    // only complete events push the deadline; comments and partial lines do not
    let mut deadline = Instant::now() + idle_timeout;

    while received < max_events {
        let chunk = match tokio::time::timeout_at(deadline, stream.next()).await {
            Err(_) => {
                debug!("No event from {url} within {}ms, closing stream", idle_timeout.as_millis());
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                return Err(ExtractError::Transport {
                    url: url.to_string(),
                    message: format!("event stream broke off: {e}"),
                })
            }
            Ok(Some(Ok(chunk))) => chunk,
        };

        for event in parser.feed(chunk.as_ref()) {
            if received == max_events {
                break;
            }
            output.extend_from_slice(format!("event:{}\n", event.event).as_bytes());
            output.extend_from_slice(b"data:");
            output.extend_from_slice(event.data.as_bytes());
            output.extend_from_slice(b"\n\n");
            received += 1;
            deadline = Instant::now() + idle_timeout;
        }
    }

    debug!("Recorded {received} events from {url}");
    Ok(output)
}
