// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::buffer_reader::BufferReader,
    bitfield::bitfield,
    serde::{Deserialize, Serialize},
};

// IEEE Std 802.2-1998, 3.2
const LLC_SAP_SNAP: u8 = 0xAA;
const LLC_CONTROL_UNNUMBERED_INFO: u8 = 0x03;
pub const ETHER_TYPE_EAPOL: u16 = 0x888E;

// IEEE Std 802.1X-2010, 11.3.2
pub const EAPOL_PACKET_TYPE_KEY: u8 = 3;

bitfield! {
    /// IEEE Std 802.11-2016, 12.7.2, Figure 12-33
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct KeyInformation(u16);
    impl Debug;
    bool;
    pub u16, key_descriptor_version, _: 2, 0;
    pub key_type, _: 3;
    pub u16, legacy_key_index, _: 5, 4;
    pub install, _: 6;
    pub key_ack, _: 7;
    pub key_mic, _: 8;
    pub secure, _: 9;
    pub error, _: 10;
    pub request, _: 11;
    pub encrypted_key_data, _: 12;
    pub smk_message, _: 13;
}

/// Position of an EAPOL-Key frame within the 4-way or group key handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMessage {
    FourWay1,
    FourWay2,
    FourWay3,
    FourWay4,
    Group1,
    Group2,
}

impl KeyInformation {
    /// Derives the handshake message from the flags an authenticator and supplicant set in
    /// IEEE Std 802.11-2016, 12.7.6.2 - 12.7.6.5 and 12.7.7.
    pub fn message(&self) -> Option<KeyMessage> {
        if self.request() || self.error() {
            return None;
        }
        let pairwise = self.key_type();
        match (pairwise, self.key_ack(), self.key_mic()) {
            (true, true, false) => Some(KeyMessage::FourWay1),
            (true, true, true) if self.install() => Some(KeyMessage::FourWay3),
            (true, false, true) if self.secure() => Some(KeyMessage::FourWay4),
            (true, false, true) => Some(KeyMessage::FourWay2),
            (false, true, _) => Some(KeyMessage::Group1),
            (false, false, true) => Some(KeyMessage::Group2),
            _ => None,
        }
    }
}

/// Leading fields of an EAPOL-Key frame. Nonces, MIC and key data are not decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyFrame {
    pub version: u8,
    pub descriptor_type: u8,
    pub key_info: KeyInformation,
    pub key_len: u16,
    pub key_replay_counter: u64,
}

/// Returns the EAPOL-Key frame carried by an unprotected data frame body, if any.
pub fn parse_llc_key_frame(body: &[u8]) -> Option<KeyFrame> {
    let mut reader = BufferReader::new(body);
    let dsap = reader.read_u8()?;
    let ssap = reader.read_u8()?;
    let control = reader.read_u8()?;
    reader.skip(3)?; // OUI
    let ether_type = reader.read_be_u16()?;
    if dsap != LLC_SAP_SNAP
        || ssap != LLC_SAP_SNAP
        || control != LLC_CONTROL_UNNUMBERED_INFO
        || ether_type != ETHER_TYPE_EAPOL
    {
        return None;
    }

    let version = reader.read_u8()?;
    let packet_type = reader.read_u8()?;
    let _packet_body_len = reader.read_be_u16()?;
    if packet_type != EAPOL_PACKET_TYPE_KEY {
        return None;
    }
    Some(KeyFrame {
        version,
        descriptor_type: reader.read_u8()?,
        key_info: KeyInformation(reader.read_be_u16()?),
        key_len: reader.read_be_u16()?,
        key_replay_counter: reader.read_be_u64()?,
    })
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[rustfmt::skip]
    fn llc_key_frame(key_info: u16) -> Vec<u8> {
        let mut bytes = vec![
            // LLC header:
            0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E,
            // EAPOL header:
            0x01, 0x03, 0x00, 0x5f,
            // Key descriptor type:
            0x02,
        ];
        bytes.extend_from_slice(&key_info.to_be_bytes());
        bytes.extend_from_slice(&[0x00, 0x10]); // key length
        bytes.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]); // replay counter
        bytes
    }

    #[test_case(0x008a, Some(KeyMessage::FourWay1) ; "message 1")]
    #[test_case(0x010a, Some(KeyMessage::FourWay2) ; "message 2")]
    #[test_case(0x13ca, Some(KeyMessage::FourWay3) ; "message 3")]
    #[test_case(0x030a, Some(KeyMessage::FourWay4) ; "message 4")]
    #[test_case(0x1382, Some(KeyMessage::Group1) ; "group message 1")]
    #[test_case(0x0302, Some(KeyMessage::Group2) ; "group message 2")]
    #[test_case(0x0b0a, None ; "request")]
    fn classify(key_info: u16, expected: Option<KeyMessage>) {
        assert_eq!(expected, KeyInformation(key_info).message());
    }

    #[test]
    fn parse_key_frame() {
        let frame = parse_llc_key_frame(&llc_key_frame(0x008a)[..]).expect("expected key frame");
        assert_eq!(1, frame.version);
        assert_eq!(2, frame.descriptor_type);
        assert_eq!(KeyInformation(0x008a), frame.key_info);
        assert_eq!(16, frame.key_len);
        assert_eq!(1, frame.key_replay_counter);
    }

    #[test]
    fn not_eapol() {
        let mut bytes = llc_key_frame(0x008a);
        bytes[6] = 0x08;
        bytes[7] = 0x00;
        assert_eq!(None, parse_llc_key_frame(&bytes[..]));
    }

    #[test]
    fn eapol_start_is_not_a_key_frame() {
        let mut bytes = llc_key_frame(0x008a);
        bytes[9] = 0x01;
        assert_eq!(None, parse_llc_key_frame(&bytes[..]));
    }

    #[test]
    fn truncated_key_frame() {
        let bytes = llc_key_frame(0x008a);
        assert_eq!(None, parse_llc_key_frame(&bytes[..14]));
    }
}
