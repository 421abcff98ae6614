// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Sequential reader over a borrowed byte slice. Every read returns `None` instead of
/// panicking when not enough bytes are left, in which case the reader is not advanced.
#[derive(Debug)]
pub struct BufferReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> BufferReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        BufferReader { bytes, offset: 0 }
    }

    pub fn peek_bytes(&self, len: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(len)?;
        self.bytes.get(self.offset..end)
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.peek_bytes(len)?;
        self.offset += len;
        Some(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Option<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Advances to the next offset that is a multiple of `align`, counted from the start of
    /// the underlying buffer.
    pub fn align_to(&mut self, align: usize) -> Option<()> {
        let padding = match self.offset % align {
            0 => 0,
            rem => align - rem,
        };
        self.skip(padding)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|b| b as i8)
    }

    pub fn read_le_u16(&mut self) -> Option<u16> {
        self.read_bytes(2).map(LittleEndian::read_u16)
    }

    pub fn read_le_u32(&mut self) -> Option<u32> {
        self.read_bytes(4).map(LittleEndian::read_u32)
    }

    pub fn read_le_u64(&mut self) -> Option<u64> {
        self.read_bytes(8).map(LittleEndian::read_u64)
    }

    pub fn read_be_u16(&mut self) -> Option<u16> {
        self.read_bytes(2).map(BigEndian::read_u16)
    }

    pub fn read_be_u64(&mut self) -> Option<u64> {
        self.read_bytes(8).map(BigEndian::read_u64)
    }

    pub fn bytes_read(&self) -> usize {
        self.offset
    }

    pub fn bytes_remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn into_remaining(self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}
