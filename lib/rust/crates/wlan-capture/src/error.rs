// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{mac::MacParseError, radiotap::RadiotapError},
    std::fmt,
    thiserror::Error,
};

#[derive(Debug, Error, PartialEq)]
pub enum CaptureParseError {
    #[error("capture is {0} bytes, shorter than a pcap global header")]
    TruncatedGlobalHeader(usize),
    #[error("unsupported capture container, magic {0:#010x}")]
    UnsupportedContainer(u32),
    #[error("unsupported pcap version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("unsupported link type {0}")]
    UnsupportedLinkType(u32),
    #[error("record {record} at offset {offset}: {kind}")]
    Record { record: usize, offset: usize, kind: RecordError },
    #[error("no frames decoded from {records} records, {} warnings", warnings.len())]
    NoFrames { records: usize, warnings: Vec<DecodeWarning> },
    #[error("capture {capture}: {source}")]
    InCapture { capture: usize, source: Box<CaptureParseError> },
}

/// Reason a single capture record was not turned into a frame.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("truncated record header, {available} bytes left")]
    TruncatedHeader { available: usize },
    #[error("record length {length} exceeds the {limit} byte limit")]
    Oversized { length: usize, limit: usize },
    #[error("record claims {length} bytes, {available} available")]
    Truncated { length: usize, available: usize },
    #[error("radiotap: {0}")]
    Radiotap(#[from] RadiotapError),
    #[error("802.11 header: {0}")]
    Mac(#[from] MacParseError),
    #[error("frame check sequence failed")]
    BadFcs,
}

/// A record that was skipped while the rest of the capture decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodeWarning {
    pub capture: usize,
    pub record: usize,
    pub offset: usize,
    pub error: RecordError,
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capture {} record {} at offset {}: {}",
            self.capture, self.record, self.offset, self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_error_context() {
        let err = CaptureParseError::Record {
            record: 3,
            offset: 120,
            kind: RecordError::Mac(MacParseError::UnsupportedFrameType(3)),
        };
        assert_eq!(
            "record 3 at offset 120: 802.11 header: unsupported frame type 3",
            err.to_string()
        );
    }

    #[test]
    fn no_frames_counts_warnings() {
        let warning =
            DecodeWarning { capture: 0, record: 0, offset: 24, error: RecordError::BadFcs };
        let err = CaptureParseError::NoFrames { records: 1, warnings: vec![warning] };
        assert_eq!("no frames decoded from 1 records, 1 warnings", err.to_string());
    }
}
