// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Builders for synthetic captures and frames.

use crate::{
    frame::{Frame, FrameBody, FrameId, FrameType, RateInfo},
    mac::{self, MacAddr},
    pcap::{self, LinkType},
    radiotap::PhyRate,
    time::Timestamp,
};

pub const AP_ADDR: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
pub const STA_ADDR: MacAddr = MacAddr([0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
pub const OTHER_STA_ADDR: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

/// Writes a little-endian, microsecond resolution pcap file.
pub struct PcapWriter {
    bytes: Vec<u8>,
}

impl PcapWriter {
    pub fn new(link_type: LinkType) -> Self {
        let mut bytes = Vec::with_capacity(pcap::GLOBAL_HEADER_LEN);
        bytes.extend_from_slice(&pcap::PCAP_MAGIC_MICROS.to_le_bytes());
        bytes.extend_from_slice(&pcap::PCAP_VERSION_MAJOR.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]); // thiszone, sigfigs
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&(link_type as u32).to_le_bytes());
        PcapWriter { bytes }
    }

    pub fn push_record(&mut self, timestamp: Timestamp, data: &[u8]) -> &mut Self {
        let nanos = timestamp.into_nanos();
        let secs = nanos.div_euclid(1_000_000_000) as u32;
        let micros = (nanos.rem_euclid(1_000_000_000) / 1_000) as u32;
        self.bytes.extend_from_slice(&secs.to_le_bytes());
        self.bytes.extend_from_slice(&micros.to_le_bytes());
        self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A radiotap header carrying flags, channel and signal, plus the field matching `rate`.
/// The flags field is always at offset 8.
pub fn radiotap_header(
    rate: Option<PhyRate>,
    channel_mhz: u16,
    signal_dbm: i8,
    fcs_at_end: bool,
) -> Vec<u8> {
    let mut present: u32 = (1 << 1) | (1 << 3) | (1 << 5);
    let mut bytes = vec![0u8; 8];
    bytes.push(if fcs_at_end { 0x10 } else { 0 });
    if let Some(PhyRate::Legacy { rate_500kbps }) = rate {
        present |= 1 << 2;
        bytes.push(rate_500kbps);
    }
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes.extend_from_slice(&channel_mhz.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.push(signal_dbm as u8);
    match rate {
        Some(PhyRate::Ht { mcs }) => {
            present |= 1 << 19;
            bytes.extend_from_slice(&[0x02, 0, mcs]);
        }
        Some(PhyRate::Vht { mcs, nss }) => {
            present |= 1 << 21;
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            bytes.extend_from_slice(&[0, 0, 0, 0, (mcs << 4) | nss, 0, 0, 0, 0, 0, 0, 0]);
        }
        _ => (),
    }
    let len = bytes.len() as u16;
    bytes[2..4].copy_from_slice(&len.to_le_bytes());
    bytes[4..8].copy_from_slice(&present.to_le_bytes());
    bytes
}

pub fn mgmt_frame(
    subtype: u16,
    addr1: MacAddr,
    addr2: MacAddr,
    addr3: MacAddr,
    seq: u16,
    body: &[u8],
) -> Vec<u8> {
    let fc = (mac::FRAME_TYPE_MGMT << 2) | (subtype << 4);
    let mut bytes = vec![];
    bytes.extend_from_slice(&fc.to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&addr1.0);
    bytes.extend_from_slice(&addr2.0);
    bytes.extend_from_slice(&addr3.0);
    bytes.extend_from_slice(&(seq << 4).to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// A non-QoS data frame. Frames to `AP_ADDR` are sent to the DS, frames from `AP_ADDR` come
/// from the DS.
pub fn data_frame(
    transmitter: MacAddr,
    receiver: MacAddr,
    seq: u16,
    retry: bool,
    body: &[u8],
) -> Vec<u8> {
    let to_ds = receiver == AP_ADDR;
    let from_ds = transmitter == AP_ADDR;
    let addr3 = match (to_ds, from_ds) {
        (true, false) => receiver,
        (false, true) => transmitter,
        _ => AP_ADDR,
    };
    let fc = (mac::FRAME_TYPE_DATA << 2)
        | ((to_ds as u16) << 8)
        | ((from_ds as u16) << 9)
        | ((retry as u16) << 11);
    let mut bytes = vec![];
    bytes.extend_from_slice(&fc.to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&receiver.0);
    bytes.extend_from_slice(&transmitter.0);
    bytes.extend_from_slice(&addr3.0);
    bytes.extend_from_slice(&(seq << 4).to_le_bytes());
    bytes.extend_from_slice(body);
    bytes
}

/// Open system authentication body.
pub fn auth_body(transaction: u16, status: u16) -> Vec<u8> {
    let mut bytes = vec![0, 0];
    bytes.extend_from_slice(&transaction.to_le_bytes());
    bytes.extend_from_slice(&status.to_le_bytes());
    bytes
}

pub fn assoc_resp_body(status: u16, aid: u16) -> Vec<u8> {
    let mut bytes = vec![0x01, 0x00]; // capabilities: ESS
    bytes.extend_from_slice(&status.to_le_bytes());
    bytes.extend_from_slice(&(aid | 0xC000).to_le_bytes());
    bytes
}

pub fn reason_body(reason_code: u16) -> Vec<u8> {
    reason_code.to_le_bytes().to_vec()
}

#[rustfmt::skip]
pub fn eapol_key_body(key_info: u16) -> Vec<u8> {
    let mut bytes = vec![
        // LLC header:
        0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E,
        // EAPOL header:
        0x02, 0x03, 0x00, 0x5f,
        // Key descriptor type:
        0x02,
    ];
    bytes.extend_from_slice(&key_info.to_be_bytes());
    bytes.extend_from_slice(&[0x00, 0x10]);
    bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
    bytes
}

/// Builds decoded frames directly, for tests of consumers of the frame sequence.
pub struct FrameBuilder(Frame);

impl FrameBuilder {
    fn new(frame_type: FrameType, subtype: u16, transmitter: MacAddr, receiver: MacAddr) -> Self {
        FrameBuilder(Frame {
            id: FrameId { capture: 0, record: 0 },
            timestamp: Timestamp::default(),
            frame_type,
            subtype,
            source: Some(transmitter),
            destination: receiver,
            transmitter: Some(transmitter),
            receiver,
            bssid: None,
            sequence_number: Some(0),
            retry: false,
            protected: false,
            amsdu: false,
            tid: None,
            rate_info: None,
            body: FrameBody::Opaque,
        })
    }

    pub fn mgmt(subtype: u16, transmitter: MacAddr, receiver: MacAddr) -> Self {
        Self::new(FrameType::Management, subtype, transmitter, receiver)
    }

    pub fn data(transmitter: MacAddr, receiver: MacAddr) -> Self {
        Self::new(FrameType::Data, 0, transmitter, receiver)
    }

    pub fn ctrl(subtype: u16, receiver: MacAddr) -> Self {
        let mut builder = Self::new(FrameType::Control, subtype, receiver, receiver);
        builder.0.source = None;
        builder.0.transmitter = None;
        builder.0.sequence_number = None;
        builder
    }

    pub fn id(mut self, id: FrameId) -> Self {
        self.0.id = id;
        self
    }

    pub fn record(mut self, record: usize) -> Self {
        self.0.id.record = record;
        self
    }

    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.0.timestamp = timestamp;
        self
    }

    pub fn at_millis(self, millis: i64) -> Self {
        self.at(Timestamp::from_millis(millis))
    }

    pub fn seq(mut self, seq: u16) -> Self {
        self.0.sequence_number = Some(seq);
        self
    }

    pub fn retry(mut self) -> Self {
        self.0.retry = true;
        self
    }

    pub fn protected(mut self) -> Self {
        self.0.protected = true;
        self
    }

    pub fn amsdu(mut self) -> Self {
        self.0.amsdu = true;
        self
    }

    /// Makes the frame a QoS data frame of traffic identifier `tid`.
    pub fn tid(mut self, tid: u16) -> Self {
        self.0.subtype |= mac::BITMASK_QOS;
        self.0.tid = Some(tid);
        self
    }

    pub fn body(mut self, body: FrameBody) -> Self {
        self.0.body = body;
        self
    }

    pub fn rate(mut self, phy_rate: PhyRate) -> Self {
        self.0.rate_info.get_or_insert_with(RateInfo::default).phy_rate = Some(phy_rate);
        self
    }

    pub fn channel(mut self, channel_mhz: u16) -> Self {
        self.0.rate_info.get_or_insert_with(RateInfo::default).channel_mhz = Some(channel_mhz);
        self
    }

    pub fn build(self) -> Frame {
        self.0
    }
}
