// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoding of 802.11 monitor-mode captures into an ordered sequence of frame metadata.

pub mod buffer_reader;
pub mod eapol;
mod error;
mod frame;
pub mod mac;
pub mod pcap;
pub mod radiotap;
pub mod test_utils;
mod time;

pub use {
    error::{CaptureParseError, DecodeWarning, RecordError},
    frame::{
        decode_capture, decode_captures, decode_frame, decode_indexed_capture, merge_frames,
        DecodedCapture, Frame, FrameBody, FrameId, FrameType, RateInfo,
    },
    mac::MacAddr,
    time::{ClockOffset, Timestamp},
};
