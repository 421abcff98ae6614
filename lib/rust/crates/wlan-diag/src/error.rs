// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {thiserror::Error, wlan_capture::Timestamp};

/// The register header could not be turned into a register map.
#[derive(Debug, Error, PartialEq)]
pub enum MapParseError {
    #[error("line {line}: register {name} reuses address {address:#06x} of {existing}")]
    DuplicateAddress { line: usize, address: u32, name: String, existing: String },
    #[error("line {line}: invalid address {text:?} for register {name}")]
    InvalidAddress { line: usize, name: String, text: String },
    #[error("line {line}: malformed field {name}: {reason}")]
    MalformedField { line: usize, name: String, reason: String },
    #[error(
        "line {line}: field {field} (bits {bit_offset}..{}) exceeds the {register_bits} bits of \
         register {register}",
        bit_offset + bit_width
    )]
    FieldOutOfRange {
        line: usize,
        field: String,
        register: String,
        bit_offset: u32,
        bit_width: u32,
        register_bits: u32,
    },
    #[error("line {line}: field {field} overlaps field {existing} of register {register}")]
    OverlappingField { line: usize, field: String, existing: String, register: String },
}

/// A register dump could not be parsed. Only the dump concerned is lost.
#[derive(Debug, Error, PartialEq)]
pub enum DumpParseError {
    #[error("{source_name}: dump is empty")]
    Empty { source_name: String },
    #[error("{source_name}:{line}: expected a section header, found {text:?}")]
    InvalidHeader { source_name: String, line: usize, text: String },
    #[error("{source_name}:{line}: unknown register section {section:?}")]
    UnknownSection { source_name: String, line: usize, section: String },
    #[error("{source_name}:{line}: malformed line {text:?}")]
    MalformedLine { source_name: String, line: usize, text: String },
    #[error("{source_name}:{line}: value {value:?} exceeds 32 bits")]
    ValueTooWide { source_name: String, line: usize, value: String },
    #[error("{source_name}:{line}: address {address:#06x} outside of section {section}")]
    AddressOutOfRange { source_name: String, line: usize, address: u64, section: &'static str },
}

/// Snapshots cannot be compared.
#[derive(Debug, Error, PartialEq)]
pub enum DiffError {
    #[error("at least two snapshots are needed, got {0}")]
    NotEnoughSnapshots(usize),
    #[error("snapshot {source_name} is from section {found}, expected {expected}")]
    SectionMismatch { source_name: String, expected: &'static str, found: &'static str },
    #[error("snapshot {later} taken at {later_time} precedes {earlier} taken at {earlier_time}")]
    OutOfOrder {
        earlier: String,
        earlier_time: Timestamp,
        later: String,
        later_time: Timestamp,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
