// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        config::DiagnosticConfig,
        correlate::{correlate, CorrelationRecord},
        register::{
            group_by_section, load_all_sections, RegisterDiffEntry, RegisterDiffer,
            RegisterSnapshot,
        },
        stats::CaptureStatistics,
        timeline::{build_timeline, ProtocolTimeline},
    },
    anyhow::{format_err, Context as _, Error},
    log::{info, warn},
    serde::Serialize,
    wlan_capture::{decode_indexed_capture, merge_frames, Timestamp},
};

/// A register dump and the time it was taken, on the device clock.
#[derive(Clone, Debug)]
pub struct DumpInput {
    pub name: String,
    pub content: String,
    pub capture_time: Timestamp,
}

#[derive(Clone, Debug)]
pub struct CaptureInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SectionDiff {
    pub section: &'static str,
    /// Names of the compared dumps, in capture-time order.
    pub snapshots: Vec<String>,
    pub entries: Vec<RegisterDiffEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub register_diffs: Vec<SectionDiff>,
    pub timeline: ProtocolTimeline,
    pub statistics: CaptureStatistics,
    pub correlation: Vec<CorrelationRecord>,
    /// Inputs that were left out or partially decoded.
    pub warnings: Vec<String>,
}

impl DiagnosticReport {
    /// Register diffs of all sections, ordered by time.
    pub fn all_register_diffs(&self) -> Vec<RegisterDiffEntry> {
        let mut entries: Vec<_> =
            self.register_diffs.iter().flat_map(|s| s.entries.iter().cloned()).collect();
        entries.sort_by_key(|e| e.timestamp);
        entries
    }
}

pub struct DiagnosticSession {
    config: DiagnosticConfig,
}

impl DiagnosticSession {
    pub fn new(config: DiagnosticConfig) -> Self {
        DiagnosticSession { config }
    }

    pub fn config(&self) -> &DiagnosticConfig {
        &self.config
    }

    /// Diffs the dumps against the maps loaded from `header`, builds the protocol timeline of
    /// the captures and correlates both.
    pub fn run(
        &self,
        header: &str,
        dumps: &[DumpInput],
        captures: &[CaptureInput],
    ) -> Result<DiagnosticReport, Error> {
        let mut warnings = vec![];
        let maps = load_all_sections(header, &self.config.map_options())
            .context("failed to load register header")?;

        let mut snapshots = vec![];
        for dump in dumps {
            match RegisterSnapshot::parse(&dump.name, &dump.content, dump.capture_time) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!("excluding register dump: {}", e);
                    warnings.push(format!("excluded register dump: {}", e));
                }
            }
        }

        let mut register_diffs = vec![];
        for (section, series) in group_by_section(snapshots) {
            if series.len() < 2 {
                warn!("only {} dump of section {}, nothing to compare", series.len(), section);
                warnings.push(format!("section {}: fewer than two dumps", section));
                continue;
            }
            let map = maps
                .get(section)
                .ok_or_else(|| format_err!("no register map for section {}", section))?;
            let entries = RegisterDiffer::new(map)
                .diff(&series)
                .with_context(|| format!("failed to diff {} dumps", section))?;
            register_diffs.push(SectionDiff {
                section,
                snapshots: series.iter().map(|s| s.source.clone()).collect(),
                entries,
            });
        }

        let mut per_capture = vec![];
        let mut first_failure = None;
        for (index, capture) in captures.iter().enumerate() {
            match decode_indexed_capture(index, &capture.bytes) {
                Ok(decoded) => {
                    for warning in &decoded.warnings {
                        warnings.push(format!(
                            "{}: skipped record {} at offset {}: {}",
                            capture.name, warning.record, warning.offset, warning.error
                        ));
                    }
                    per_capture.push(decoded.frames);
                }
                Err(e) => {
                    warn!("excluding capture {}: {}", capture.name, e);
                    warnings.push(format!("excluded capture {}: {}", capture.name, e));
                    first_failure.get_or_insert((capture.name.as_str(), e));
                }
            }
        }
        if per_capture.is_empty() {
            if let Some((name, e)) = first_failure {
                return Err(Error::new(e).context(format!("failed to decode capture {}", name)));
            }
        }
        let frames = merge_frames(per_capture);

        let timeline = build_timeline(&frames, &self.config.timeline_config());
        let statistics =
            CaptureStatistics::compute(&frames, self.config.ap, self.config.station);

        let mut all_diffs: Vec<RegisterDiffEntry> =
            register_diffs.iter().flat_map(|s: &SectionDiff| s.entries.iter().cloned()).collect();
        all_diffs.sort_by_key(|e| e.timestamp);
        let correlation =
            correlate(&all_diffs, &timeline.events, &self.config.correlation_config());

        info!(
            "{} register changes, {} protocol events, {} correlation records, {} warnings",
            all_diffs.len(),
            timeline.events.len(),
            correlation.len(),
            warnings.len()
        );
        Ok(DiagnosticReport { register_diffs, timeline, statistics, correlation, warnings })
    }
}
