// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::buffer_reader::BufferReader,
    bitfield::bitfield,
    serde::{Deserialize, Serialize},
    std::{convert::TryFrom, fmt, str::FromStr},
    thiserror::Error,
};

// IEEE Std 802.11-2016, 9.2.4.1.3
pub const FRAME_TYPE_MGMT: u16 = 0;
pub const FRAME_TYPE_CTRL: u16 = 1;
pub const FRAME_TYPE_DATA: u16 = 2;
pub const FRAME_TYPE_EXT: u16 = 3;

// Management subtypes.
pub const MGMT_SUBTYPE_ASSOC_REQ: u16 = 0x00;
pub const MGMT_SUBTYPE_ASSOC_RESP: u16 = 0x01;
pub const MGMT_SUBTYPE_REASSOC_REQ: u16 = 0x02;
pub const MGMT_SUBTYPE_REASSOC_RESP: u16 = 0x03;
pub const MGMT_SUBTYPE_PROBE_REQ: u16 = 0x04;
pub const MGMT_SUBTYPE_PROBE_RESP: u16 = 0x05;
pub const MGMT_SUBTYPE_TIMING_AD: u16 = 0x06;
pub const MGMT_SUBTYPE_BEACON: u16 = 0x08;
pub const MGMT_SUBTYPE_ATIM: u16 = 0x09;
pub const MGMT_SUBTYPE_DISASSOC: u16 = 0x0A;
pub const MGMT_SUBTYPE_AUTH: u16 = 0x0B;
pub const MGMT_SUBTYPE_DEAUTH: u16 = 0x0C;
pub const MGMT_SUBTYPE_ACTION: u16 = 0x0D;
pub const MGMT_SUBTYPE_ACTION_NO_ACK: u16 = 0x0E;

// Control subtypes.
pub const CTRL_SUBTYPE_BEAMFORMING_REPORT_POLL: u16 = 0x04;
pub const CTRL_SUBTYPE_VHT_NDP_ANNOUNCEMENT: u16 = 0x05;
pub const CTRL_SUBTYPE_FRAME_EXT: u16 = 0x06;
pub const CTRL_SUBTYPE_WRAPPER: u16 = 0x07;
pub const CTRL_SUBTYPE_BLOCK_ACK_REQ: u16 = 0x08;
pub const CTRL_SUBTYPE_BLOCK_ACK: u16 = 0x09;
pub const CTRL_SUBTYPE_PS_POLL: u16 = 0x0A;
pub const CTRL_SUBTYPE_RTS: u16 = 0x0B;
pub const CTRL_SUBTYPE_CTS: u16 = 0x0C;
pub const CTRL_SUBTYPE_ACK: u16 = 0x0D;
pub const CTRL_SUBTYPE_CF_END: u16 = 0x0E;
pub const CTRL_SUBTYPE_CF_END_ACK: u16 = 0x0F;

// Data subtype bits.
pub const BITMASK_NULL: u16 = 1 << 2;
pub const BITMASK_QOS: u16 = 1 << 3;

const FRAME_CTRL_LEN: usize = 2;
const CTRL_HDR_RA_ONLY_LEN: usize = 10;
const CTRL_HDR_RA_TA_LEN: usize = 16;
const MGMT_HDR_LEN: usize = 24;
const DATA_HDR_LEN: usize = 24;
const ADDR_LEN: usize = 6;
const QOS_CTRL_LEN: usize = 2;
const HT_CTRL_LEN: usize = 4;

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

pub const BCAST_ADDR: MacAddr = MacAddr([0xFF; 6]);

impl MacAddr {
    pub fn is_broadcast(&self) -> bool {
        *self == BCAST_ADDR
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    fn read(reader: &mut BufferReader<'_>) -> Option<MacAddr> {
        let mut addr = [0u8; 6];
        addr.copy_from_slice(reader.read_bytes(ADDR_LEN)?);
        Some(MacAddr(addr))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a[0], a[1], a[2], a[3], a[4], a[5])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid MAC address {0:?}: expected six ':' separated hex octets")]
pub struct ParseMacAddrError(String);

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMacAddrError(s.to_string());
        let mut addr = [0u8; 6];
        let mut octets = s.split(|c| c == ':' || c == '-');
        for byte in addr.iter_mut() {
            let octet = octets.next().ok_or_else(err)?;
            if octet.len() != 2 {
                return Err(err());
            }
            *byte = u8::from_str_radix(octet, 16).map_err(|_| err())?;
        }
        match octets.next() {
            Some(_) => Err(err()),
            None => Ok(MacAddr(addr)),
        }
    }
}

impl TryFrom<String> for MacAddr {
    type Error = ParseMacAddrError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(addr: MacAddr) -> String {
        addr.to_string()
    }
}

bitfield! {
    /// IEEE Std 802.11-2016, 9.2.4.1.1
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct FrameControl(u16);
    impl Debug;
    bool;
    pub u16, protocol_version, _: 1, 0;
    pub u16, frame_type, _: 3, 2;
    pub u16, frame_subtype, _: 7, 4;
    pub to_ds, _: 8;
    pub from_ds, _: 9;
    pub more_fragments, _: 10;
    pub retry, _: 11;
    pub power_mgmt, _: 12;
    pub more_data, _: 13;
    pub protected, _: 14;
    pub htc_order, _: 15;
}

impl FrameControl {
    pub fn value(&self) -> u16 {
        self.0
    }
}

bitfield! {
    /// IEEE Std 802.11-2016, 9.2.4.4
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct SequenceControl(u16);
    impl Debug;
    pub u16, frag_num, _: 3, 0;
    pub u16, seq_num, _: 15, 4;
}

bitfield! {
    /// IEEE Std 802.11-2016, 9.2.4.5.1
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct QosControl(u16);
    impl Debug;
    bool;
    pub u16, tid, _: 3, 0;
    pub eosp, _: 4;
    pub u16, ack_policy, _: 6, 5;
    pub amsdu_present, _: 7;
    pub u16, txop_limit, _: 15, 8;
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MacParseError {
    #[error("header needs {needed} bytes, frame has {available}")]
    TooShort { needed: usize, available: usize },
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u16),
    #[error("unsupported frame type {0}")]
    UnsupportedFrameType(u16),
}

/// The MAC header of any management, control or data frame. Fields that a frame type does
/// not carry are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct MacHeader {
    pub frame_ctrl: FrameControl,
    pub duration: u16,
    pub addr1: MacAddr,
    pub addr2: Option<MacAddr>,
    pub addr3: Option<MacAddr>,
    pub seq_ctrl: Option<SequenceControl>,
    pub addr4: Option<MacAddr>,
    pub qos_ctrl: Option<QosControl>,
    pub ht_ctrl: Option<u32>,
}

fn ctrl_frame_has_ta(subtype: u16) -> bool {
    match subtype {
        CTRL_SUBTYPE_BEAMFORMING_REPORT_POLL
        | CTRL_SUBTYPE_VHT_NDP_ANNOUNCEMENT
        | CTRL_SUBTYPE_FRAME_EXT
        | CTRL_SUBTYPE_BLOCK_ACK_REQ
        | CTRL_SUBTYPE_BLOCK_ACK
        | CTRL_SUBTYPE_PS_POLL
        | CTRL_SUBTYPE_RTS
        | CTRL_SUBTYPE_CF_END
        | CTRL_SUBTYPE_CF_END_ACK => true,
        _ => false,
    }
}

/// Number of header bytes a frame with the given frame control field requires.
pub fn header_len(frame_ctrl: FrameControl) -> Result<usize, MacParseError> {
    if frame_ctrl.protocol_version() != 0 {
        return Err(MacParseError::UnsupportedProtocolVersion(frame_ctrl.protocol_version()));
    }
    let subtype = frame_ctrl.frame_subtype();
    match frame_ctrl.frame_type() {
        FRAME_TYPE_MGMT => {
            Ok(MGMT_HDR_LEN + if frame_ctrl.htc_order() { HT_CTRL_LEN } else { 0 })
        }
        FRAME_TYPE_CTRL if ctrl_frame_has_ta(subtype) => Ok(CTRL_HDR_RA_TA_LEN),
        FRAME_TYPE_CTRL => Ok(CTRL_HDR_RA_ONLY_LEN),
        FRAME_TYPE_DATA => {
            let mut len = DATA_HDR_LEN;
            if frame_ctrl.to_ds() && frame_ctrl.from_ds() {
                len += ADDR_LEN;
            }
            if subtype & BITMASK_QOS != 0 {
                len += QOS_CTRL_LEN;
                if frame_ctrl.htc_order() {
                    len += HT_CTRL_LEN;
                }
            }
            Ok(len)
        }
        other => Err(MacParseError::UnsupportedFrameType(other)),
    }
}

impl MacHeader {
    /// Parses the MAC header and returns it together with the frame body that follows it.
    pub fn parse(bytes: &[u8]) -> Result<(MacHeader, &[u8]), MacParseError> {
        let too_short = |needed| MacParseError::TooShort { needed, available: bytes.len() };
        let mut reader = BufferReader::new(bytes);
        let frame_ctrl = FrameControl(reader.read_le_u16().ok_or(too_short(FRAME_CTRL_LEN))?);
        let needed = header_len(frame_ctrl)?;
        if bytes.len() < needed {
            return Err(too_short(needed));
        }

        // Lengths are checked above, reads below cannot fail.
        let duration = reader.read_le_u16().ok_or(too_short(needed))?;
        let addr1 = MacAddr::read(&mut reader).ok_or(too_short(needed))?;
        let mut hdr = MacHeader {
            frame_ctrl,
            duration,
            addr1,
            addr2: None,
            addr3: None,
            seq_ctrl: None,
            addr4: None,
            qos_ctrl: None,
            ht_ctrl: None,
        };
        if needed == CTRL_HDR_RA_ONLY_LEN {
            return Ok((hdr, reader.into_remaining()));
        }
        hdr.addr2 = MacAddr::read(&mut reader);
        if frame_ctrl.frame_type() == FRAME_TYPE_CTRL {
            return Ok((hdr, reader.into_remaining()));
        }
        hdr.addr3 = MacAddr::read(&mut reader);
        hdr.seq_ctrl = reader.read_le_u16().map(SequenceControl);
        match frame_ctrl.frame_type() {
            FRAME_TYPE_MGMT => {
                if frame_ctrl.htc_order() {
                    hdr.ht_ctrl = reader.read_le_u32();
                }
            }
            _ => {
                if frame_ctrl.to_ds() && frame_ctrl.from_ds() {
                    hdr.addr4 = MacAddr::read(&mut reader);
                }
                if frame_ctrl.frame_subtype() & BITMASK_QOS != 0 {
                    hdr.qos_ctrl = reader.read_le_u16().map(QosControl);
                    if frame_ctrl.htc_order() {
                        hdr.ht_ctrl = reader.read_le_u32();
                    }
                }
            }
        }
        Ok((hdr, reader.into_remaining()))
    }

    pub fn frame_type(&self) -> u16 {
        self.frame_ctrl.frame_type()
    }

    pub fn frame_subtype(&self) -> u16 {
        self.frame_ctrl.frame_subtype()
    }

    pub fn receiver_addr(&self) -> MacAddr {
        self.addr1
    }

    pub fn transmitter_addr(&self) -> Option<MacAddr> {
        self.addr2
    }

    /// IEEE Std 802.11-2016, 9.3.2.1, Table 9-26 for data frames.
    pub fn dst_addr(&self) -> MacAddr {
        match (self.frame_type(), self.frame_ctrl.to_ds()) {
            (FRAME_TYPE_DATA, true) => self.addr3.unwrap_or(self.addr1),
            _ => self.addr1,
        }
    }

    pub fn src_addr(&self) -> Option<MacAddr> {
        if self.frame_type() != FRAME_TYPE_DATA {
            return self.addr2;
        }
        match (self.frame_ctrl.to_ds(), self.frame_ctrl.from_ds()) {
            (false, true) => self.addr3,
            (true, true) => self.addr4,
            _ => self.addr2,
        }
    }

    pub fn bssid(&self) -> Option<MacAddr> {
        match self.frame_type() {
            FRAME_TYPE_MGMT => self.addr3,
            FRAME_TYPE_DATA => match (self.frame_ctrl.to_ds(), self.frame_ctrl.from_ds()) {
                (false, false) => self.addr3,
                (true, false) => Some(self.addr1),
                (false, true) => self.addr2,
                (true, true) => None,
            },
            _ => None,
        }
    }

    pub fn seq_num(&self) -> Option<u16> {
        self.seq_ctrl.map(|s| s.seq_num())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, test_case::test_case};

    #[rustfmt::skip]
    fn mgmt_frame() -> Vec<u8> {
        vec![
            // Mgmt header, auth subtype:
            0b10110000, 0, // Frame Control
            0, 0, // Duration
            1, 1, 1, 1, 1, 1, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            3, 3, 3, 3, 3, 3, // addr3
            0x10, 0, // Sequence Control: seq 1, frag 0
            // Body:
            0, 0, 2, 0, 0, 0,
        ]
    }

    #[rustfmt::skip]
    fn qos_data_frame() -> Vec<u8> {
        vec![
            // Data header, QoS data, from DS, retry:
            0b10001000, 0b00001010, // Frame Control
            0, 0, // Duration
            1, 1, 1, 1, 1, 1, // addr1
            2, 2, 2, 2, 2, 2, // addr2
            3, 3, 3, 3, 3, 3, // addr3
            0x30, 0x01, // Sequence Control: seq 19, frag 0
            0x80, 0, // QoS Control: A-MSDU present
            // Body:
            7, 7,
        ]
    }

    #[test]
    fn parse_mgmt_frame() {
        match MacHeader::parse(&mgmt_frame()[..]) {
            Ok((hdr, body)) => {
                assert_eq!(FRAME_TYPE_MGMT, hdr.frame_type());
                assert_eq!(MGMT_SUBTYPE_AUTH, hdr.frame_subtype());
                assert_eq!(MacAddr([1; 6]), hdr.dst_addr());
                assert_eq!(Some(MacAddr([2; 6])), hdr.src_addr());
                assert_eq!(Some(MacAddr([3; 6])), hdr.bssid());
                assert_eq!(Some(1), hdr.seq_num());
                assert_eq!(&[0, 0, 2, 0, 0, 0][..], body);
            }
            _ => panic!("failed parsing mgmt frame"),
        }
    }

    #[test]
    fn parse_qos_data_frame() {
        match MacHeader::parse(&qos_data_frame()[..]) {
            Ok((hdr, body)) => {
                assert!(hdr.frame_ctrl.retry());
                assert!(hdr.frame_ctrl.from_ds());
                assert_eq!(Some(MacAddr([2; 6])), hdr.transmitter_addr());
                assert_eq!(Some(MacAddr([3; 6])), hdr.src_addr());
                assert_eq!(Some(MacAddr([2; 6])), hdr.bssid());
                assert_eq!(Some(19), hdr.seq_num());
                assert_matches!(hdr.qos_ctrl, Some(qos) if qos.amsdu_present());
                assert_eq!(&[7, 7][..], body);
            }
            _ => panic!("failed parsing data frame"),
        }
    }

    #[test]
    fn parse_ack_frame() {
        #[rustfmt::skip]
        let bytes = [
            0b11010100, 0, // Frame Control
            0, 0, // Duration
            4, 4, 4, 4, 4, 4, // RA
        ];
        let (hdr, body) = MacHeader::parse(&bytes[..]).expect("failed parsing ack frame");
        assert_eq!(FRAME_TYPE_CTRL, hdr.frame_type());
        assert_eq!(MacAddr([4; 6]), hdr.receiver_addr());
        assert_eq!(None, hdr.transmitter_addr());
        assert_eq!(None, hdr.seq_num());
        assert!(body.is_empty());
    }

    #[test]
    fn too_short() {
        let bytes = mgmt_frame();
        assert_eq!(
            Err(MacParseError::TooShort { needed: 24, available: 20 }),
            MacHeader::parse(&bytes[..20])
        );
        assert_eq!(
            Err(MacParseError::TooShort { needed: 2, available: 1 }),
            MacHeader::parse(&bytes[..1])
        );
    }

    #[test]
    fn unsupported_protocol_version() {
        let mut bytes = mgmt_frame();
        bytes[0] |= 0b01;
        assert_eq!(Err(MacParseError::UnsupportedProtocolVersion(1)), MacHeader::parse(&bytes[..]));
    }

    #[test]
    fn unsupported_frame_type() {
        let mut bytes = mgmt_frame();
        bytes[0] = 0b00001100;
        assert_eq!(Err(MacParseError::UnsupportedFrameType(3)), MacHeader::parse(&bytes[..]));
    }

    #[test_case(false, false, 24 ; "no ds bits")]
    #[test_case(true, true, 30 ; "four address")]
    fn data_header_len(to_ds: bool, from_ds: bool, expected: usize) {
        let fc = (FRAME_TYPE_DATA << 2) | ((to_ds as u16) << 8) | ((from_ds as u16) << 9);
        assert_eq!(Ok(expected), header_len(FrameControl(fc)));
    }

    #[test]
    fn mac_addr_parse_and_display() {
        let addr: MacAddr = "00:1A:2b:3c:4d:ff".parse().expect("valid address");
        assert_eq!(MacAddr([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0xff]), addr);
        assert_eq!("00:1a:2b:3c:4d:ff", addr.to_string());
        assert!("00:1a:2b:3c:4d".parse::<MacAddr>().is_err());
        assert!("00:1a:2b:3c:4d:ff:01".parse::<MacAddr>().is_err());
        assert!("00:1a:2b:3c:4d:fg".parse::<MacAddr>().is_err());
        assert!(BCAST_ADDR.is_broadcast());
        assert!(BCAST_ADDR.is_multicast());
        assert!(!addr.is_multicast());
    }
}
