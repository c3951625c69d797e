//! Event bus routing helpers.

use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId};

/// Stream handed to subscribers: replayed envelopes first, then live traffic.
///
/// A lagging subscriber sees a [`BroadcastStreamRecvError`] in place of the
/// envelopes it missed.
pub type EventStream =
    Pin<Box<dyn Stream<Item = Result<EventEnvelope, BroadcastStreamRecvError>> + Send>>;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    ring: Arc<Mutex<Ring>>,
}

struct Ring {
    envelopes: VecDeque<EventEnvelope>,
    capacity: usize,
    next_id: EventId,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("replay_capacity", &self.lock_ring().capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Construct a bus with a custom replay capacity.
    ///
    /// A zero capacity is bumped to one; `tokio::broadcast` rejects empty channels.
    #[must_use]
    pub fn with_capacity(replay_capacity: usize) -> Self {
        let capacity = replay_capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ring: Arc::new(Mutex::new(Ring {
                envelopes: VecDeque::with_capacity(capacity),
                capacity,
                next_id: 1,
            })),
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Subscribe to the bus.
    ///
    /// With `last_event_id`, buffered envelopes newer than it are yielded
    /// first; live envelopes already covered by that backlog are skipped.
    #[must_use]
    pub fn subscribe(&self, last_event_id: Option<EventId>) -> EventStream {
        // Subscribe before reading the ring so nothing falls between the two.
        let live = BroadcastStream::new(self.sender.subscribe());
        let Some(last) = last_event_id else {
            return Box::pin(live);
        };
        let backlog = self.backlog_since(last);
        let cutoff = backlog.last().map_or(last, |env| env.id);
        let live = live.filter(move |item| !matches!(item, Ok(env) if env.id <= cutoff));
        Box::pin(tokio_stream::iter(backlog.into_iter().map(Ok)).chain(live))
    }

    /// Publish a new event to all subscribers and return its id.
    ///
    /// Publishing never fails; with no subscribers the event only lands in
    /// the replay ring.
    pub fn publish(&self, event: Event) -> EventId {
        let mut ring = self.lock_ring();
        let id = ring.next_id;
        ring.next_id = ring.next_id.saturating_add(1);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };
        if ring.envelopes.len() == ring.capacity {
            ring.envelopes.pop_front();
        }
        ring.envelopes.push_back(envelope.clone());
        // Sending under the ring lock keeps live delivery in id order.
        let _ = self.sender.send(envelope);
        id
    }

    /// Last event id observed in the replay buffer.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.lock_ring().envelopes.back().map(|env| env.id)
    }

    /// Collect a backlog of events emitted after the specified id.
    #[must_use]
    pub fn backlog_since(&self, id: EventId) -> Vec<EventEnvelope> {
        self.lock_ring()
            .envelopes
            .iter()
            .filter(|env| env.id > id)
            .cloned()
            .collect()
    }

    /// Buffered events scoped to one file manager, oldest first.
    #[must_use]
    pub fn backlog_for(&self, manager_id: Uuid) -> Vec<EventEnvelope> {
        self.lock_ring()
            .envelopes
            .iter()
            .filter(|env| env.event.manager_id() == Some(manager_id))
            .cloned()
            .collect()
    }

    fn lock_ring(&self) -> MutexGuard<'_, Ring> {
        self.ring
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
