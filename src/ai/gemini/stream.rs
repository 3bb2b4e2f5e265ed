//! Incremental decoder for `streamGenerateContent` bodies.
//!
//! Gemini streams one top-level JSON array and only closes it when the
//! response is complete. Each chunk is appended to a text buffer and the
//! buffer is re-parsed with a synthetic closing `]`, so every element that has
//! finished arriving becomes visible before the stream ends.

use super::types::GenerateContentResponse;
use crate::Result;
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};

/// Merged, possibly partial view of the response seen so far.
///
/// Fields only ever get replaced by newer values, never removed, so each
/// snapshot knows at least what the previous one knew. Gemini streams text
/// as deltas, so the first-candidate text of every merged element is also
/// kept in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot {
    fields: Map<String, Value>,
    #[serde(skip)]
    text: String,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Text of every merged element, concatenated.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// `promptFeedback.blockReason`, if the service set one.
    pub fn block_reason(&self) -> Option<&str> {
        self.fields
            .get("promptFeedback")?
            .get("blockReason")?
            .as_str()
    }

    pub fn to_response(&self) -> Result<GenerateContentResponse> {
        Ok(serde_json::from_value(Value::Object(self.fields.clone()))?)
    }

    fn merge(&mut self, fragment: Map<String, Value>) {
        if let Some(text) = first_candidate_text(&fragment) {
            self.text.push_str(text);
        }

        for (key, value) in fragment {
            if value.is_null() {
                continue;
            }
            self.fields.insert(key, value);
        }
    }
}

fn first_candidate_text(fragment: &Map<String, Value>) -> Option<&str> {
    fragment
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text")?.as_str())
}

/// Carries the bytes of a code point split across chunk boundaries.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for the rest.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    elements_seen: usize,
    snapshot: Option<Snapshot>,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk. Returns the merged snapshot when the chunk
    /// completed at least one new array element.
    ///
    /// Every element completed by the chunk is merged, oldest first, so the
    /// newest one wins on shared fields.
    pub fn push(&mut self, chunk: &[u8]) -> Option<&Snapshot> {
        self.utf8.decode(chunk, &mut self.buffer);

        let fragments = self.parse_new_elements();
        if fragments.is_empty() {
            return None;
        }

        let snapshot = self.snapshot.get_or_insert_with(Snapshot::default);
        for fragment in fragments {
            snapshot.merge(fragment);
        }
        Some(&*snapshot)
    }

    fn parse_new_elements(&mut self) -> Vec<Map<String, Value>> {
        // A finished element is usually followed by its separator before the
        // next one starts, which would make `[{..},]` invalid.
        let trimmed = self
            .buffer
            .trim_end()
            .trim_end_matches(',')
            .trim_end();

        let mut closed = String::with_capacity(trimmed.len() + 1);
        closed.push_str(trimmed);
        closed.push(']');

        let elements: Vec<Value> = match serde_json::from_str(&closed) {
            Ok(elements) => elements,
            // The server closed the array itself.
            Err(_) if trimmed.ends_with(']') => match serde_json::from_str(trimmed) {
                Ok(elements) => elements,
                Err(e) => {
                    tracing::trace!("Closed stream body does not parse: {}", e);
                    return Vec::new();
                }
            },
            Err(e) => {
                tracing::trace!("Awaiting more stream data: {}", e);
                return Vec::new();
            }
        };

        if elements.len() <= self.elements_seen {
            return Vec::new();
        }
        let seen = std::mem::replace(&mut self.elements_seen, elements.len());

        elements
            .into_iter()
            .skip(seen)
            .filter_map(|element| match element {
                Value::Object(fragment) => Some(fragment),
                other => {
                    tracing::debug!("Ignoring non-object stream element: {}", other);
                    None
                }
            })
            .collect()
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// Everything decoded so far.
    pub fn buffered_text(&self) -> &str {
        &self.buffer
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        self.snapshot
    }
}

/// Drive a [`StreamDecoder`] over `chunks`, handing each snapshot to
/// `on_snapshot` before the next chunk is read.
///
/// An error from `on_snapshot` or from the stream stops reading and is
/// returned as is. `Ok(None)` means the stream ended without a single
/// successful parse.
pub async fn decode_stream<S, F>(mut chunks: S, mut on_snapshot: F) -> Result<Option<Snapshot>>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
    F: FnMut(&Snapshot) -> Result<()>,
{
    let mut decoder = StreamDecoder::new();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if let Some(snapshot) = decoder.push(&chunk) {
            on_snapshot(snapshot)?;
        }
    }

    Ok(decoder.into_snapshot())
}
