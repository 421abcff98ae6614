// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Plain-text and JSON renderings of diagnostic results.

use {
    crate::{
        correlate::CorrelationRecord,
        register::{FieldChange, RegisterDiffEntry},
        timeline::ProtocolTimeline,
    },
    serde::Serialize,
    std::fmt,
};

pub fn to_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(value)
}

fn hex(value: Option<u32>, nibbles: usize) -> String {
    match value {
        Some(value) => format!("0x{:0width$X}", value, width = nibbles),
        None => "-".to_string(),
    }
}

fn nibbles(bit_width: u32) -> usize {
    ((bit_width + 3) / 4) as usize
}

fn register_mask(bit_width: u32) -> u32 {
    ((1u64 << bit_width) - 1) as u32
}

/// Writes rows as an org-mode table, the first row being the header.
fn write_org_table(f: &mut fmt::Formatter<'_>, rows: &[Vec<String>]) -> fmt::Result {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().filter_map(|r| r.get(c)).map(String::len).max().unwrap_or(0))
        .collect();
    for (i, row) in rows.iter().enumerate() {
        write!(f, "|")?;
        for (c, width) in widths.iter().enumerate() {
            let cell = row.get(c).map(String::as_str).unwrap_or("");
            write!(f, " {:<width$} |", cell, width = width)?;
        }
        writeln!(f)?;
        if i == 0 {
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
            writeln!(f, "|{}|", rule.join("+"))?;
        }
    }
    Ok(())
}

/// Register changes of one section, one row per register followed by its changed fields.
pub struct RegisterDiffTable<'a> {
    pub section: &'a str,
    pub entries: &'a [RegisterDiffEntry],
}

impl RegisterDiffTable<'_> {
    fn field_row(entry: &RegisterDiffEntry, field: &FieldChange) -> Vec<String> {
        let width = if field.name == crate::register::UNKNOWN_FIELD_NAME {
            nibbles(entry.bit_width)
        } else {
            nibbles(32 - field.mask.leading_zeros() - field.mask.trailing_zeros())
        };
        vec![
            String::new(),
            String::new(),
            field.name.clone(),
            format!("0x{:X}", field.mask),
            hex(field.before, width),
            hex(field.after, width),
            String::new(),
        ]
    }
}

impl fmt::Display for RegisterDiffTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Register value delta analysis for {} registers", self.section)?;
        if self.entries.is_empty() {
            return writeln!(f, "Dumps do not differ");
        }
        let mut rows = vec![vec![
            "**Time**".to_string(),
            "**Address**".to_string(),
            "**Name**".to_string(),
            "Mask".to_string(),
            "**Before**".to_string(),
            "**After**".to_string(),
            "**Hint**".to_string(),
        ]];
        for entry in self.entries {
            let width = nibbles(entry.bit_width);
            rows.push(vec![
                entry.timestamp.to_string(),
                format!("0x{:X}", entry.address),
                entry.name.clone(),
                format!("0x{:X}", register_mask(entry.bit_width)),
                hex(entry.previous_value, width),
                hex(entry.new_value, width),
                entry.hint.clone().unwrap_or_default(),
            ]);
            for field in &entry.changed_fields {
                rows.push(Self::field_row(entry, field));
            }
        }
        write_org_table(f, &rows)
    }
}

pub struct TimelineListing<'a>(pub &'a ProtocolTimeline);

impl fmt::Display for TimelineListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for event in &self.0.events {
            writeln!(f, "{} {:<22} {}", event.timestamp, event.kind.to_string(), event.detail)?;
        }
        writeln!(
            f,
            "final state: {}, frames of other stations: {}",
            self.0.final_state, self.0.ignored_frames
        )
    }
}

pub struct CorrelationListing<'a>(pub &'a [CorrelationRecord]);

impl fmt::Display for CorrelationListing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.0.iter().enumerate() {
            writeln!(f, "== #{} at {}", i, record.timestamp)?;
            for diff in &record.register_diffs {
                let width = nibbles(diff.bit_width);
                write!(
                    f,
                    "   {} {} 0x{:X} {}: {} -> {}",
                    diff.timestamp,
                    diff.section,
                    diff.address,
                    diff.name,
                    hex(diff.previous_value, width),
                    hex(diff.new_value, width)
                )?;
                match &diff.hint {
                    Some(hint) => writeln!(f, " ({})", hint)?,
                    None => writeln!(f)?,
                }
            }
            for event in &record.protocol_events {
                writeln!(f, "   {} {} {}", event.timestamp, event.kind, event.detail)?;
            }
        }
        Ok(())
    }
}
