// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Correlates register dumps of a Wi-Fi driver with the 802.11 protocol events seen over the
//! air by a monitoring radio.

pub mod config;
pub mod correlate;
pub mod error;
pub mod register;
pub mod report;
pub mod session;
pub mod stats;
pub mod timeline;

pub use {
    config::DiagnosticConfig,
    correlate::{correlate, CorrelationConfig, CorrelationRecord},
    error::{ConfigError, DiffError, DumpParseError, MapParseError},
    session::{CaptureInput, DiagnosticReport, DiagnosticSession, DumpInput},
    timeline::{build_timeline, EventKind, ProtocolEvent, ProtocolTimeline, TimelineConfig},
    wlan_capture::{ClockOffset, MacAddr, Timestamp},
};
