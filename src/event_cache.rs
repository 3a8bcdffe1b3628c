//! Cache of the "now" event per service, fed by present/following EIT sections.
//!
//! The update policy below is a deliberately reproduced quirk rather than a
//! silent fix: a slot found already occupied for a service only has its
//! name/genre refreshed when the new
//! event's `running_status` is [`RUNNING_STATUS_RUNNING`], but the very
//! first event seen for a service is stored unconditionally, regardless of
//! its `running_status`. Two services arriving in different orders can
//! therefore end up with differently-stale names for events that never
//! actually ran. This is intentional — see DESIGN.md.

use crate::si::{EitEventInfo, RUNNING_STATUS_RUNNING};

const GENRE_PRESENT_MARKER: &str = "\u{2022}";

/// Cached "now" event information for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCacheEntry {
    /// Service this entry belongs to; `0` marks an empty slot
    pub service_id: u16,
    /// Event identifier from the most recently applied EIT event
    pub event_id: u16,
    /// Event name, from the short event descriptor
    pub event_name: String,
    /// Genre marker; non-empty when the source event carried a content descriptor
    pub genre: String,
    /// running_status of the most recently applied EIT event
    pub running_status: u8,
}

/// Per-service event name/genre cache, keyed by DVB service_id.
///
/// A fixed-capacity array sized to the acquired PAT's `service_count`, not a
/// map: slots never shrink except on full tear-down, a slot whose
/// `service_id == 0` is empty, and a cache with no free slot for a newly seen
/// service silently drops that update rather than growing.
#[derive(Debug, Default)]
pub struct EventCache {
    entries: Vec<EventCacheEntry>,
}

impl EventCache {
    /// Creates a cache with one empty slot per PAT service entry (including
    /// the NIT slot, which is simply never looked up by a real channel).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![EventCacheEntry::default(); capacity],
        }
    }

    /// Applies one decoded EIT event to the cache for `service_id`.
    pub fn update(&mut self, service_id: u16, event: &EitEventInfo) {
        if service_id == 0 {
            return;
        }

        let genre = if event.has_genre {
            GENRE_PRESENT_MARKER.to_string()
        } else {
            String::new()
        };
        let name = event
            .short_event_descriptor
            .as_ref()
            .map(|d| d.event_name.clone())
            .unwrap_or_default();

        if let Some(existing) = self.entries.iter_mut().find(|e| e.service_id == service_id) {
            existing.event_id = event.event_id;
            existing.running_status = event.running_status;
            if event.running_status == RUNNING_STATUS_RUNNING {
                existing.event_name = name;
                existing.genre = genre;
            }
        } else if let Some(slot) = self.entries.iter_mut().find(|e| e.service_id == 0) {
            *slot = EventCacheEntry {
                service_id,
                event_id: event.event_id,
                event_name: name,
                genre,
                running_status: event.running_status,
            };
        } else {
            log::debug!("event cache full ({} slots), dropping update for service {service_id}", self.entries.len());
            return;
        }

        log::debug!("event cache updated: service={} running_status={}", service_id, event.running_status);
    }

    /// Looks up the cached "now" event for a service, if any.
    pub fn lookup(&self, service_id: u16) -> Option<&EventCacheEntry> {
        self.entries.iter().find(|e| e.service_id == service_id)
    }

    /// Number of services currently tracked.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.service_id != 0).count()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of slots the cache was sized with.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }
}
