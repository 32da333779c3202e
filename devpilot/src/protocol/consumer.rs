//! Incremental consumer for deploy and lifecycle streams
//!
//! Chunk boundaries carry no meaning: bytes are buffered until a newline and
//! only complete lines are interpreted, so a control line split across chunks
//! (even inside a multi-byte character) is still recognized.

use crate::protocol::{DeployStatus, Marker};

/// Something the consumer recognized in the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerEvent {
    /// Ordinary log text
    Line(String),

    /// A completion protocol control line
    Marker(Marker),
}

/// What the completion protocol reported so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOutcome {
    pub status: Option<DeployStatus>,
    pub project_id: Option<String>,
    pub redirect_url: Option<String>,
}

impl DeployOutcome {
    /// URL to navigate to once the deploy succeeded and both identifiers arrived
    pub fn redirect(&self) -> Option<&str> {
        match (&self.status, &self.project_id, &self.redirect_url) {
            (Some(DeployStatus::Success), Some(_), Some(url)) => Some(url),
            _ => None,
        }
    }

    fn record(&mut self, marker: &Marker) {
        match marker {
            Marker::Status(status) => self.status = Some(*status),
            Marker::ProjectId(id) => self.project_id = Some(id.clone()),
            Marker::RedirectUrl(url) => self.redirect_url = Some(url.clone()),
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamConsumer {
    pending: Vec<u8>,
    outcome: DeployOutcome,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns the complete lines it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ConsumerEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            events.push(self.interpret(&line[..line.len() - 1]));
        }
        events
    }

    /// End of stream: interpret whatever partial line is left
    pub fn finish(&mut self) -> Vec<ConsumerEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.pending);
        vec![self.interpret(&rest)]
    }

    pub fn outcome(&self) -> &DeployOutcome {
        &self.outcome
    }

    fn interpret(&mut self, raw: &[u8]) -> ConsumerEvent {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\r');
        match Marker::parse_line(text) {
            Some(marker) => {
                self.outcome.record(&marker);
                ConsumerEvent::Marker(marker)
            }
            None => ConsumerEvent::Line(text.to_string()),
        }
    }
}
