// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Classic libpcap container. pcapng is not supported.

use {
    crate::{
        error::{CaptureParseError, RecordError},
        time::Timestamp,
    },
    byteorder::{BigEndian, ByteOrder, LittleEndian},
    num_derive::FromPrimitive,
    num_traits::FromPrimitive,
};

pub const PCAP_MAGIC_MICROS: u32 = 0xA1B2_C3D4;
pub const PCAP_MAGIC_NANOS: u32 = 0xA1B2_3C4D;
pub const PCAPNG_MAGIC: u32 = 0x0A0D_0D0A;
pub const PCAP_VERSION_MAJOR: u16 = 2;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Records longer than this are taken as a sign of lost framing.
pub const MAX_RECORD_LEN: usize = 256 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
pub enum LinkType {
    Ieee80211 = 105,
    Ieee80211Radiotap = 127,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GlobalHeader {
    pub big_endian: bool,
    pub nanosecond_resolution: bool,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl GlobalHeader {
    pub fn parse(bytes: &[u8]) -> Result<GlobalHeader, CaptureParseError> {
        let header = bytes
            .get(..GLOBAL_HEADER_LEN)
            .ok_or(CaptureParseError::TruncatedGlobalHeader(bytes.len()))?;
        let magic = LittleEndian::read_u32(&header[0..4]);
        let (big_endian, nanosecond_resolution) = match magic {
            PCAP_MAGIC_MICROS => (false, false),
            PCAP_MAGIC_NANOS => (false, true),
            m if m.swap_bytes() == PCAP_MAGIC_MICROS => (true, false),
            m if m.swap_bytes() == PCAP_MAGIC_NANOS => (true, true),
            m => return Err(CaptureParseError::UnsupportedContainer(m)),
        };
        let u16_at = |i: usize| {
            if big_endian {
                BigEndian::read_u16(&header[i..i + 2])
            } else {
                LittleEndian::read_u16(&header[i..i + 2])
            }
        };
        let u32_at = |i: usize| {
            if big_endian {
                BigEndian::read_u32(&header[i..i + 4])
            } else {
                LittleEndian::read_u32(&header[i..i + 4])
            }
        };
        let (major, minor) = (u16_at(4), u16_at(6));
        if major != PCAP_VERSION_MAJOR {
            return Err(CaptureParseError::UnsupportedVersion { major, minor });
        }
        // The upper bits of the link type field carry FCS information.
        let raw_link_type = u32_at(20) & 0x0FFF_FFFF;
        let link_type = LinkType::from_u32(raw_link_type)
            .ok_or(CaptureParseError::UnsupportedLinkType(raw_link_type))?;
        Ok(GlobalHeader { big_endian, nanosecond_resolution, snaplen: u32_at(16), link_type })
    }

    fn read_u32(&self, bytes: &[u8]) -> u32 {
        if self.big_endian {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record<'a> {
    pub index: usize,
    pub offset: usize,
    pub timestamp: Timestamp,
    pub orig_len: u32,
    pub data: &'a [u8],
}

/// Iterates over the records of a capture. A framing error is yielded once and ends the
/// iteration, since the position of the next record is unknown after it.
#[derive(Debug)]
pub struct Reader<'a> {
    header: GlobalHeader,
    bytes: &'a [u8],
    offset: usize,
    index: usize,
    done: bool,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, CaptureParseError> {
        let header = GlobalHeader::parse(bytes)?;
        Ok(Reader { header, bytes, offset: GLOBAL_HEADER_LEN, index: 0, done: false })
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.header
    }

    /// Number of records yielded so far, including a failed one.
    pub fn records_read(&self) -> usize {
        self.index
    }

    fn fail(&mut self, kind: RecordError) -> Option<Result<Record<'a>, CaptureParseError>> {
        self.done = true;
        let err = CaptureParseError::Record { record: self.index, offset: self.offset, kind };
        self.index += 1;
        Some(Err(err))
    }
}

impl<'a> Iterator for Reader<'a> {
    type Item = Result<Record<'a>, CaptureParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.bytes.len() {
            return None;
        }
        let available = self.bytes.len() - self.offset;
        let record_header = match self.bytes.get(self.offset..self.offset + RECORD_HEADER_LEN) {
            Some(header) => header,
            None => return self.fail(RecordError::TruncatedHeader { available }),
        };
        let ts_sec = self.header.read_u32(&record_header[0..4]) as i64;
        let ts_frac = self.header.read_u32(&record_header[4..8]) as i64;
        let incl_len = self.header.read_u32(&record_header[8..12]) as usize;
        let orig_len = self.header.read_u32(&record_header[12..16]);
        if incl_len > MAX_RECORD_LEN {
            return self.fail(RecordError::Oversized { length: incl_len, limit: MAX_RECORD_LEN });
        }
        let data_start = self.offset + RECORD_HEADER_LEN;
        let data = match self.bytes.get(data_start..data_start + incl_len) {
            Some(data) => data,
            None => {
                return self.fail(RecordError::Truncated {
                    length: incl_len,
                    available: available - RECORD_HEADER_LEN,
                })
            }
        };
        let timestamp = if self.header.nanosecond_resolution {
            Timestamp::from_nanos(ts_sec * 1_000_000_000 + ts_frac)
        } else {
            Timestamp::from_nanos(ts_sec * 1_000_000_000 + ts_frac * 1_000)
        };
        let record = Record { index: self.index, offset: self.offset, timestamp, orig_len, data };
        self.offset = data_start + incl_len;
        self.index += 1;
        Some(Ok(record))
    }
}
