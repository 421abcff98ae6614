// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Radiotap capture header, as prepended by monitor-mode interfaces to each received frame.
//! See https://www.radiotap.org for the field definitions.

use {
    crate::buffer_reader::BufferReader,
    bitfield::bitfield,
    serde::{Deserialize, Serialize},
    std::fmt,
    thiserror::Error,
};

const RADIOTAP_VERSION: u8 = 0;
const RADIOTAP_FIXED_LEN: usize = 8;
const PRESENT_EXT_BIT: u32 = 1 << 31;

const FIELD_TSFT: u32 = 0;
const FIELD_FLAGS: u32 = 1;
const FIELD_RATE: u32 = 2;
const FIELD_CHANNEL: u32 = 3;
const FIELD_DBM_ANTSIGNAL: u32 = 5;
const FIELD_DBM_ANTNOISE: u32 = 6;
const FIELD_MCS: u32 = 19;
const FIELD_VHT: u32 = 21;

const MCS_KNOWN_INDEX: u8 = 1 << 1;

/// (alignment, length) of the fields defined in the first present word, indexed by bit.
/// Bits past the table cannot be skipped and end the walk.
const FIELD_LAYOUT: [(usize, usize); 22] = [
    (8, 8),  // TSFT
    (1, 1),  // Flags
    (1, 1),  // Rate
    (2, 4),  // Channel
    (2, 2),  // FHSS
    (1, 1),  // Antenna signal (dBm)
    (1, 1),  // Antenna noise (dBm)
    (2, 2),  // Lock quality
    (2, 2),  // TX attenuation
    (2, 2),  // TX attenuation (dB)
    (1, 1),  // TX power (dBm)
    (1, 1),  // Antenna
    (1, 1),  // Antenna signal (dB)
    (1, 1),  // Antenna noise (dB)
    (2, 2),  // RX flags
    (2, 2),  // TX flags
    (1, 1),  // RTS retries
    (1, 1),  // Data retries
    (4, 8),  // XChannel
    (1, 3),  // MCS
    (4, 8),  // A-MPDU status
    (2, 12), // VHT
];

bitfield! {
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct RadiotapFlags(u8);
    impl Debug;
    bool;
    pub cfp, _: 0;
    pub short_preamble, _: 1;
    pub wep, _: 2;
    pub fragmentation, _: 3;
    pub fcs_at_end, _: 4;
    pub data_pad, _: 5;
    pub bad_fcs, _: 6;
    pub short_gi, _: 7;
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RadiotapError {
    #[error("header truncated: {0} bytes")]
    Truncated(usize),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("declared length {declared} exceeds the {available} captured bytes")]
    BadLength { declared: usize, available: usize },
    #[error("field {bit} overruns the header")]
    FieldOverrun { bit: u32 },
}

/// PHY rate a frame was sent with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhyRate {
    /// DSSS/CCK or OFDM rate in units of 500 kbps.
    Legacy { rate_500kbps: u8 },
    Ht { mcs: u8 },
    Vht { mcs: u8, nss: u8 },
}

/// Rough PHY generation, as used for traffic statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhyClass {
    /// 802.11b
    Dsss,
    /// 802.11a/g
    Ofdm,
    /// 802.11n
    Ht,
    /// 802.11ac
    Vht,
}

impl PhyRate {
    pub fn phy_class(&self) -> PhyClass {
        match self {
            // 1, 2, 5.5 and 11 Mbps
            PhyRate::Legacy { rate_500kbps: 2 }
            | PhyRate::Legacy { rate_500kbps: 4 }
            | PhyRate::Legacy { rate_500kbps: 11 }
            | PhyRate::Legacy { rate_500kbps: 22 } => PhyClass::Dsss,
            PhyRate::Legacy { .. } => PhyClass::Ofdm,
            PhyRate::Ht { .. } => PhyClass::Ht,
            PhyRate::Vht { .. } => PhyClass::Vht,
        }
    }
}

impl fmt::Display for PhyRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhyRate::Legacy { rate_500kbps } if rate_500kbps % 2 == 1 => {
                write!(f, "{}.5 Mbps", rate_500kbps / 2)
            }
            PhyRate::Legacy { rate_500kbps } => write!(f, "{} Mbps", rate_500kbps / 2),
            PhyRate::Ht { mcs } => write!(f, "HT MCS {}", mcs),
            PhyRate::Vht { mcs, nss } => write!(f, "VHT MCS {} NSS {}", mcs, nss),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RadiotapInfo {
    pub tsft: Option<u64>,
    pub flags: Option<RadiotapFlags>,
    pub rate_500kbps: Option<u8>,
    pub channel_mhz: Option<u16>,
    pub channel_flags: Option<u16>,
    pub signal_dbm: Option<i8>,
    pub noise_dbm: Option<i8>,
    pub mcs: Option<u8>,
    pub vht_mcs_nss: Option<(u8, u8)>,
}

impl RadiotapInfo {
    /// The most specific rate reported: VHT, then HT, then legacy.
    pub fn phy_rate(&self) -> Option<PhyRate> {
        if let Some((mcs, nss)) = self.vht_mcs_nss {
            return Some(PhyRate::Vht { mcs, nss });
        }
        if let Some(mcs) = self.mcs {
            return Some(PhyRate::Ht { mcs });
        }
        self.rate_500kbps.map(|rate_500kbps| PhyRate::Legacy { rate_500kbps })
    }

    pub fn fcs_at_end(&self) -> bool {
        self.flags.map_or(false, |f| f.fcs_at_end())
    }

    pub fn bad_fcs(&self) -> bool {
        self.flags.map_or(false, |f| f.bad_fcs())
    }
}

/// Parses the radiotap header at the start of `bytes` and returns the fields of interest
/// together with the 802.11 frame that follows the header.
pub fn parse(bytes: &[u8]) -> Result<(RadiotapInfo, &[u8]), RadiotapError> {
    let mut reader = BufferReader::new(bytes);
    let truncated = RadiotapError::Truncated(bytes.len());
    let version = reader.read_u8().ok_or(truncated.clone())?;
    if version != RADIOTAP_VERSION {
        return Err(RadiotapError::UnsupportedVersion(version));
    }
    reader.skip(1).ok_or(truncated.clone())?;
    let declared = reader.read_le_u16().ok_or(truncated.clone())? as usize;
    if declared < RADIOTAP_FIXED_LEN || declared > bytes.len() {
        return Err(RadiotapError::BadLength { declared, available: bytes.len() });
    }
    let (header, frame) = bytes.split_at(declared);
    let mut reader = BufferReader::new(header);
    reader.skip(4).ok_or(truncated.clone())?;
    let present = reader.read_le_u32().ok_or(truncated.clone())?;
    let mut word = present;
    while word & PRESENT_EXT_BIT != 0 {
        word = reader.read_le_u32().ok_or(truncated.clone())?;
    }

    let mut info = RadiotapInfo::default();
    for bit in 0..32u32 {
        if present & (1 << bit) == 0 {
            continue;
        }
        let (align, len) = match FIELD_LAYOUT.get(bit as usize) {
            Some(layout) => *layout,
            None => break,
        };
        reader.align_to(align).ok_or(RadiotapError::FieldOverrun { bit })?;
        let field = reader.read_bytes(len).ok_or(RadiotapError::FieldOverrun { bit })?;
        read_field(&mut info, bit, field);
    }
    Ok((info, frame))
}

fn read_field(info: &mut RadiotapInfo, bit: u32, field: &[u8]) {
    let mut reader = BufferReader::new(field);
    match bit {
        FIELD_TSFT => info.tsft = reader.read_le_u64(),
        FIELD_FLAGS => info.flags = reader.read_u8().map(RadiotapFlags),
        FIELD_RATE => info.rate_500kbps = reader.read_u8().filter(|r| *r != 0),
        FIELD_CHANNEL => {
            info.channel_mhz = reader.read_le_u16();
            info.channel_flags = reader.read_le_u16();
        }
        FIELD_DBM_ANTSIGNAL => info.signal_dbm = reader.read_i8(),
        FIELD_DBM_ANTNOISE => info.noise_dbm = reader.read_i8(),
        FIELD_MCS => {
            let known = reader.read_u8().unwrap_or(0);
            let _flags = reader.read_u8();
            let mcs = reader.read_u8();
            if known & MCS_KNOWN_INDEX != 0 {
                info.mcs = mcs;
            }
        }
        FIELD_VHT => {
            let _known = reader.read_le_u16();
            let _flags = reader.read_u8();
            let _bandwidth = reader.read_u8();
            // First user only.
            if let Some(mcs_nss) = reader.read_u8() {
                let nss = mcs_nss & 0x0f;
                if nss != 0 {
                    info.vht_mcs_nss = Some((mcs_nss >> 4, nss));
                }
            }
        }
        _ => (),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, assert_matches::assert_matches, test_case::test_case};

    #[rustfmt::skip]
    fn header_with_rate_channel_signal() -> Vec<u8> {
        vec![
            0, 0, // version, pad
            18, 0, // length
            0b0010_1110, 0, 0, 0, // present: flags, rate, channel, dbm signal
            0x10, // flags: FCS at end
            12, // rate: 6 Mbps
            0x85, 0x09, // channel: 2437 MHz
            0xa0, 0x00, // channel flags
            0xc4, // -60 dBm
            0, 0, 0, // padding up to declared length
            // 802.11 frame:
            0xaa, 0xbb,
        ]
    }

    #[test]
    fn parse_common_fields() {
        let bytes = header_with_rate_channel_signal();
        let (info, frame) = parse(&bytes[..]).expect("failed parsing radiotap header");
        assert!(info.fcs_at_end());
        assert!(!info.bad_fcs());
        assert_eq!(Some(12), info.rate_500kbps);
        assert_eq!(Some(2437), info.channel_mhz);
        assert_eq!(Some(-60), info.signal_dbm);
        assert_eq!(Some(PhyRate::Legacy { rate_500kbps: 12 }), info.phy_rate());
        assert_eq!(&[0xaa, 0xbb][..], frame);
    }

    #[test]
    fn tsft_is_aligned_past_extended_present_words() {
        #[rustfmt::skip]
        let bytes = [
            0, 0, 24, 0, // version, pad, length
            0x01, 0, 0, 0x80, // present: TSFT, ext
            0, 0, 0, 0, // second present word
            0, 0, 0, 0, // align to 8
            1, 0, 0, 0, 0, 0, 0, 0, // TSFT
        ];
        let (info, frame) = parse(&bytes[..]).expect("failed parsing radiotap header");
        assert_eq!(Some(1), info.tsft);
        assert!(frame.is_empty());
    }

    #[test]
    fn mcs_field() {
        #[rustfmt::skip]
        let bytes = [
            0, 0, 11, 0,
            0, 0, 0x08, 0, // present: MCS
            0x02, 0, 7, // known: index, flags, MCS 7
        ];
        let (info, _) = parse(&bytes[..]).expect("failed parsing radiotap header");
        assert_eq!(Some(PhyRate::Ht { mcs: 7 }), info.phy_rate());
    }

    #[test]
    fn vht_field() {
        #[rustfmt::skip]
        let bytes = [
            0, 0, 20, 0,
            0, 0, 0x20, 0, // present: VHT
            0, 0, 0, 0, // known, flags, bandwidth
            0x92, 0, 0, 0, // mcs 9, nss 2 for user 0
            0, 0, 0, 0, // coding, group id, partial aid
        ];
        let (info, _) = parse(&bytes[..]).expect("failed parsing radiotap header");
        assert_eq!(Some(PhyRate::Vht { mcs: 9, nss: 2 }), info.phy_rate());
    }

    #[test]
    fn bad_version() {
        assert_eq!(Err(RadiotapError::UnsupportedVersion(1)), parse(&[1, 0, 8, 0, 0, 0, 0, 0][..]));
    }

    #[test]
    fn declared_length_too_long() {
        assert_matches!(
            parse(&[0, 0, 32, 0, 0, 0, 0, 0][..]),
            Err(RadiotapError::BadLength { declared: 32, available: 8 })
        );
    }

    #[test]
    fn field_overruns_header() {
        // Channel present but the header ends after the fixed part.
        assert_eq!(
            Err(RadiotapError::FieldOverrun { bit: 3 }),
            parse(&[0, 0, 8, 0, 0x08, 0, 0, 0][..])
        );
    }

    #[test]
    fn truncated() {
        assert_eq!(Err(RadiotapError::Truncated(3)), parse(&[0, 0, 8][..]));
    }

    #[test_case(PhyRate::Legacy { rate_500kbps: 11 }, PhyClass::Dsss, "5.5 Mbps")]
    #[test_case(PhyRate::Legacy { rate_500kbps: 108 }, PhyClass::Ofdm, "54 Mbps")]
    #[test_case(PhyRate::Ht { mcs: 15 }, PhyClass::Ht, "HT MCS 15")]
    #[test_case(PhyRate::Vht { mcs: 9, nss: 2 }, PhyClass::Vht, "VHT MCS 9 NSS 2")]
    fn phy_rate_class_and_display(rate: PhyRate, class: PhyClass, display: &str) {
        assert_eq!(class, rate.phy_class());
        assert_eq!(display, rate.to_string());
    }
}
