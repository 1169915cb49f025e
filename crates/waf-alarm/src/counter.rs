// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch-scoped tally of client sightings.
//!
//! A [`WindowedCounter`] lives for exactly one streaming batch. The first sighting of a
//! client only registers it with a count of zero; every later sighting in the same batch
//! bumps the count. A stream threshold of 5 therefore needs 6 sightings.

use crate::event::Event;
use crate::store::AlarmStatus;
use fnv::FnvBuildHasher;
use hashbrown::HashMap;

#[derive(Debug, Clone)]
pub struct CounterEntry {
    pub count: u32,
    pub status: AlarmStatus,
    /// Oldest sighting seen so far; it becomes the alarm payload.
    pub earliest: Event,
}

#[derive(Debug)]
pub struct WindowedCounter {
    entries: HashMap<String, CounterEntry, FnvBuildHasher>,
}

impl Default for WindowedCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowedCounter {
    pub fn new() -> Self {
        Self {
            entries: HashMap::with_hasher(FnvBuildHasher::default()),
        }
    }

    /// Registers `event.client_ip` with a zero count. Returns `false` if it was already known.
    pub fn register_first_sighting(&mut self, event: &Event) -> bool {
        if self.entries.contains_key(&event.client_ip) {
            return false;
        }
        self.entries.insert(
            event.client_ip.clone(),
            CounterEntry {
                count: 0,
                status: AlarmStatus::Unalarmed,
                earliest: event.clone(),
            },
        );
        true
    }

    /// Bumps the count of an already registered client and returns the new count.
    /// Unknown clients are left alone and yield `None`.
    pub fn increment_on_repeat_sighting(&mut self, event: &Event) -> Option<u32> {
        let entry = self.entries.get_mut(&event.client_ip)?;
        entry.count = entry.count.saturating_add(1);
        if event.timestamp < entry.earliest.timestamp {
            entry.earliest = event.clone();
        }
        Some(entry.count)
    }

    /// Returns whether the client had already been seen in this batch.
    pub fn observe(&mut self, event: &Event) -> bool {
        if self.register_first_sighting(event) {
            return false;
        }
        self.increment_on_repeat_sighting(event);
        true
    }

    pub fn count(&self, client_ip: &str) -> u32 {
        self.entries.get(client_ip).map_or(0, |e| e.count)
    }

    pub fn status(&self, client_ip: &str) -> AlarmStatus {
        self.entries
            .get(client_ip)
            .map_or(AlarmStatus::Unalarmed, |e| e.status)
    }

    pub fn mark_alarmed(&mut self, client_ip: &str) {
        if let Some(entry) = self.entries.get_mut(client_ip) {
            entry.status = AlarmStatus::Alarmed;
        }
    }

    pub fn get(&self, client_ip: &str) -> Option<&CounterEntry> {
        self.entries.get(client_ip)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
