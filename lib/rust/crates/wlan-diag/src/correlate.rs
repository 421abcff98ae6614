// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Alignment of register changes and protocol events on the monitor clock.

use {
    crate::{register::RegisterDiffEntry, timeline::ProtocolEvent},
    log::{info, warn},
    serde::Serialize,
    std::time::Duration,
    wlan_capture::{ClockOffset, Timestamp},
};

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrelationConfig {
    /// Largest distance between the first item of a record and any other item of it.
    pub window: Duration,
    /// Added to register diff timestamps to move them onto the monitor clock.
    pub clock_offset: ClockOffset,
}

impl CorrelationConfig {
    pub fn new(clock_offset: ClockOffset) -> Self {
        CorrelationConfig { window: DEFAULT_WINDOW, clock_offset }
    }

    pub fn with_window(self, window: Duration) -> Self {
        CorrelationConfig { window, ..self }
    }
}

/// Register changes and protocol events that happened within one window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CorrelationRecord {
    /// Monitor-clock time of the first item.
    pub timestamp: Timestamp,
    /// Diffs with their timestamps already moved onto the monitor clock.
    pub register_diffs: Vec<RegisterDiffEntry>,
    pub protocol_events: Vec<ProtocolEvent>,
}

enum Item<'a> {
    Diff(RegisterDiffEntry),
    Event(&'a ProtocolEvent),
}

fn sorted<T: Clone, F: Fn(&T) -> Timestamp>(items: &[T], key: F, what: &str) -> Vec<T> {
    let mut items = items.to_vec();
    if items.windows(2).any(|w| key(&w[1]) < key(&w[0])) {
        warn!("{} are not in time order, sorting them", what);
        items.sort_by_key(|item| key(item));
    }
    items
}

/// Merges both timelines and groups them into records. Never fails: unsorted input is sorted.
pub fn correlate(
    diffs: &[RegisterDiffEntry],
    events: &[ProtocolEvent],
    config: &CorrelationConfig,
) -> Vec<CorrelationRecord> {
    let diffs: Vec<RegisterDiffEntry> = sorted(diffs, |d| d.timestamp, "register diffs")
        .into_iter()
        .map(|mut d| {
            d.timestamp = d.timestamp.offset_by(config.clock_offset);
            d
        })
        .collect();
    let events = sorted(events, |e| e.timestamp, "protocol events");
    let (diff_count, event_count) = (diffs.len(), events.len());

    let mut records: Vec<CorrelationRecord> = vec![];
    let mut diffs = diffs.into_iter().peekable();
    let mut events = events.iter().peekable();
    loop {
        // Register diffs go first when timestamps are equal.
        let item = match (diffs.peek(), events.peek()) {
            (Some(d), Some(e)) if d.timestamp <= e.timestamp => diffs.next().map(Item::Diff),
            (_, Some(_)) => events.next().map(Item::Event),
            (Some(_), None) => diffs.next().map(Item::Diff),
            (None, None) => None,
        };
        let item = match item {
            Some(item) => item,
            None => break,
        };
        let timestamp = match &item {
            Item::Diff(d) => d.timestamp,
            Item::Event(e) => e.timestamp,
        };
        let fits = records
            .last()
            .map_or(false, |r| timestamp.distance(r.timestamp) <= config.window);
        if !fits {
            records.push(CorrelationRecord {
                timestamp,
                register_diffs: vec![],
                protocol_events: vec![],
            });
        }
        if let Some(record) = records.last_mut() {
            match item {
                Item::Diff(d) => record.register_diffs.push(d),
                Item::Event(e) => record.protocol_events.push(e.clone()),
            }
        }
    }
    info!(
        "{} correlation records from {} register diffs and {} protocol events",
        records.len(),
        diff_count,
        event_count
    );
    records
}
