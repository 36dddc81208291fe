//! Incremental event-by-event parsing.
//!
//! [`ReplayStream`] drives the state machine one tracker event at a
//! time, merging message events in by gameloop, and yields each event
//! together with the side effects it produced. The batch entry point
//! is built on top of this iterator, so both paths observe identical
//! state transitions.

use std::collections::VecDeque;

use crate::error::Result;
use crate::protocol::events::{MessageEvent, TrackerEvent};
use crate::protocol::{Protocol, TrackerCursor};
use crate::replay::state::{MatchState, StreamPayload};

/// One step of an incremental parse.
#[derive(Debug, Clone)]
pub struct StreamItem {
    /// The tracker event that was applied.
    pub event: TrackerEvent,
    /// Side effects it produced, in order. Chat attributed to earlier
    /// gameloops is folded into the step that caught up past it.
    pub payloads: Vec<StreamPayload>,
}

/// Iterator that parses a match incrementally.
///
/// Yields `Err` once at the first malformed tracker record and then
/// fuses; the state accumulated up to that point remains accessible.
#[derive(Debug)]
pub struct ReplayStream {
    protocol: Protocol,
    tracker: Vec<u8>,
    cursor: TrackerCursor,
    messages: VecDeque<MessageEvent>,
    state: MatchState,
    done: bool,
}

impl ReplayStream {
    /// Builds a stream over decoded archive entries and a resolved
    /// initial state.
    #[must_use]
    pub fn new(
        protocol: Protocol,
        tracker: Vec<u8>,
        messages: Vec<MessageEvent>,
        state: MatchState,
    ) -> Self {
        ReplayStream {
            protocol,
            tracker,
            cursor: TrackerCursor::default(),
            messages: messages.into(),
            state,
            done: false,
        }
    }

    /// The state accumulated so far.
    #[must_use]
    pub fn state(&self) -> &MatchState {
        &self.state
    }

    /// Consumes the stream, returning the accumulated state.
    #[must_use]
    pub fn into_state(self) -> MatchState {
        self.state
    }

    /// Applies message events due at or before the given gameloop.
    fn drain_messages(&mut self, up_to: u32, payloads: &mut Vec<StreamPayload>) {
        while self
            .messages
            .front()
            .is_some_and(|m| m.gameloop <= up_to)
        {
            if let Some(message) = self.messages.pop_front() {
                payloads.extend(self.state.apply_message(&message));
            }
        }
    }
}

impl Iterator for ReplayStream {
    type Item = Result<StreamItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(next) = self
            .protocol
            .next_tracker_event(&self.tracker, &mut self.cursor)
        else {
            // flush chat trailing the last tracker event
            self.done = true;
            let mut payloads = Vec::new();
            self.drain_messages(u32::MAX, &mut payloads);
            return None;
        };
        let event = match next {
            Ok(event) => event,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let mut payloads = Vec::new();
        self.drain_messages(event.gameloop, &mut payloads);
        payloads.extend(self.state.apply_tracker(&event));
        Some(Ok(StreamItem { event, payloads }))
    }
}
