// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    super::{RegisterDefinition, RegisterMap, RegisterSnapshot},
    crate::error::DiffError,
    log::info,
    serde::Serialize,
    std::collections::{BTreeMap, BTreeSet},
    wlan_capture::Timestamp,
};

/// Name of the pseudo-field holding the bits no defined field covers.
pub const UNKNOWN_FIELD_NAME: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub name: String,
    pub mask: u32,
    /// Field values, shifted down to bit 0.
    pub before: Option<u32>,
    pub after: Option<u32>,
}

/// A register whose value differs between two consecutive snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisterDiffEntry {
    /// Capture time of the later snapshot.
    pub timestamp: Timestamp,
    /// Index of the earlier snapshot within the compared series.
    pub pair: usize,
    pub section: &'static str,
    pub address: u32,
    pub name: String,
    pub bit_width: u32,
    pub previous_value: Option<u32>,
    pub new_value: Option<u32>,
    pub changed_fields: Vec<FieldChange>,
    pub hint: Option<String>,
    pub known: bool,
}

pub struct RegisterDiffer<'a> {
    map: &'a RegisterMap,
}

impl<'a> RegisterDiffer<'a> {
    pub fn new(map: &'a RegisterMap) -> Self {
        RegisterDiffer { map }
    }

    /// Diffs every pair of adjacent snapshots. Entries are grouped by pair, ascending by address
    /// within a pair.
    pub fn diff(&self, snapshots: &[RegisterSnapshot]) -> Result<Vec<RegisterDiffEntry>, DiffError> {
        if snapshots.len() < 2 {
            return Err(DiffError::NotEnoughSnapshots(snapshots.len()));
        }
        for snapshot in snapshots {
            self.check_section(snapshot)?;
        }
        for pair in snapshots.windows(2) {
            if pair[1].capture_time < pair[0].capture_time {
                return Err(DiffError::OutOfOrder {
                    earlier: pair[0].source.clone(),
                    earlier_time: pair[0].capture_time,
                    later: pair[1].source.clone(),
                    later_time: pair[1].capture_time,
                });
            }
        }
        let entries: Vec<_> = snapshots
            .windows(2)
            .enumerate()
            .flat_map(|(i, pair)| self.diff_unchecked(&pair[0], &pair[1], i))
            .collect();
        info!(
            "{} register changes across {} {} snapshots",
            entries.len(),
            snapshots.len(),
            self.map.section().name
        );
        Ok(entries)
    }

    /// Diffs an explicitly selected pair. `pair` is recorded in the entries.
    pub fn diff_pair(
        &self,
        earlier: &RegisterSnapshot,
        later: &RegisterSnapshot,
        pair: usize,
    ) -> Result<Vec<RegisterDiffEntry>, DiffError> {
        self.check_section(earlier)?;
        self.check_section(later)?;
        if later.capture_time < earlier.capture_time {
            return Err(DiffError::OutOfOrder {
                earlier: earlier.source.clone(),
                earlier_time: earlier.capture_time,
                later: later.source.clone(),
                later_time: later.capture_time,
            });
        }
        Ok(self.diff_unchecked(earlier, later, pair))
    }

    fn check_section(&self, snapshot: &RegisterSnapshot) -> Result<(), DiffError> {
        let expected = self.map.section().name;
        if snapshot.section.name != expected {
            return Err(DiffError::SectionMismatch {
                source_name: snapshot.source.clone(),
                expected,
                found: snapshot.section.name,
            });
        }
        Ok(())
    }

    fn diff_unchecked(
        &self,
        earlier: &RegisterSnapshot,
        later: &RegisterSnapshot,
        pair: usize,
    ) -> Vec<RegisterDiffEntry> {
        let addresses: BTreeSet<u32> =
            earlier.values().keys().chain(later.values().keys()).copied().collect();

        // Changed registers keyed by base address, so that entries come out in address order.
        let mut changed: BTreeMap<u32, RegisterDefinition> = BTreeMap::new();
        for address in addresses {
            if earlier.get(address) == later.get(address) {
                continue;
            }
            if changed.values().next_back().map_or(false, |r| r.covers(address)) {
                continue;
            }
            let register = self.map.resolve(address);
            changed.insert(register.address(), register);
        }

        changed
            .into_iter()
            .filter_map(|(address, register)| {
                let previous_value = earlier.register_value(&register);
                let new_value = later.register_value(&register);
                if previous_value == new_value {
                    return None;
                }
                Some(RegisterDiffEntry {
                    timestamp: later.capture_time,
                    pair,
                    section: self.map.section().name,
                    address,
                    name: register.name(),
                    bit_width: register.bit_width(),
                    previous_value,
                    new_value,
                    changed_fields: changed_fields(&register, previous_value, new_value),
                    hint: register.hint().map(str::to_string),
                    known: register.is_known(),
                })
            })
            .collect()
    }
}

fn changed_fields(
    register: &RegisterDefinition,
    before: Option<u32>,
    after: Option<u32>,
) -> Vec<FieldChange> {
    let mut changes: Vec<FieldChange> = register
        .fields()
        .iter()
        .filter_map(|field| {
            let before = before.map(|v| field.extract(v));
            let after = after.map(|v| field.extract(v));
            if before == after {
                None
            } else {
                Some(FieldChange { name: field.name.clone(), mask: field.mask(), before, after })
            }
        })
        .collect();

    if !register.fields().is_empty() {
        let mask = register.unclaimed_mask();
        let before = before.map(|v| v & mask);
        let after = after.map(|v| v & mask);
        if mask != 0 && before != after {
            changes.push(FieldChange { name: UNKNOWN_FIELD_NAME.to_string(), mask, before, after });
        }
    }
    changes
}
