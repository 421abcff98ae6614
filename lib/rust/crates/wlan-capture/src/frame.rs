// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        buffer_reader::BufferReader,
        eapol::{self, KeyMessage},
        error::{CaptureParseError, DecodeWarning, RecordError},
        mac::{self, MacAddr, MacHeader},
        pcap::{self, LinkType},
        radiotap::{self, PhyRate, RadiotapInfo},
        time::Timestamp,
    },
    log::{debug, info, warn},
    serde::{Deserialize, Serialize},
};

const FCS_LEN: usize = 4;
const AID_MASK: u16 = 0x3FFF;

/// Identifies a frame by the capture it came from and its record index within that capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameId {
    pub capture: usize,
    pub record: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Management,
    Control,
    Data,
}

/// Radio metadata reported by the capturing interface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RateInfo {
    pub phy_rate: Option<PhyRate>,
    pub channel_mhz: Option<u16>,
    pub signal_dbm: Option<i8>,
}

impl From<&RadiotapInfo> for RateInfo {
    fn from(info: &RadiotapInfo) -> Self {
        RateInfo {
            phy_rate: info.phy_rate(),
            channel_mhz: info.channel_mhz,
            signal_dbm: info.signal_dbm,
        }
    }
}

/// The fixed fields of a frame body that the protocol timeline depends on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FrameBody {
    /// Nothing of interest, or the body is encrypted or truncated.
    Opaque,
    Authentication { algorithm: u16, transaction: u16, status: u16 },
    AssociationResponse { status: u16, aid: u16 },
    Reason { code: u16 },
    Action { category: u8, action: u8 },
    EapolKey { key_info: u16, message: Option<KeyMessage> },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub id: FrameId,
    pub timestamp: Timestamp,
    pub frame_type: FrameType,
    pub subtype: u16,
    pub source: Option<MacAddr>,
    pub destination: MacAddr,
    pub transmitter: Option<MacAddr>,
    pub receiver: MacAddr,
    pub bssid: Option<MacAddr>,
    pub sequence_number: Option<u16>,
    pub retry: bool,
    pub protected: bool,
    pub amsdu: bool,
    /// Traffic identifier of QoS data frames.
    pub tid: Option<u16>,
    pub rate_info: Option<RateInfo>,
    pub body: FrameBody,
}

impl Frame {
    pub fn is_mgmt(&self, subtype: u16) -> bool {
        self.frame_type == FrameType::Management && self.subtype == subtype
    }

    /// Data frames that carry no payload (Null and QoS Null).
    pub fn is_null_data(&self) -> bool {
        self.frame_type == FrameType::Data && self.subtype & mac::BITMASK_NULL != 0
    }
}

/// Frames of one or more captures plus the records that had to be skipped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedCapture {
    pub frames: Vec<Frame>,
    pub warnings: Vec<DecodeWarning>,
    pub records: usize,
}

/// Decodes a single pcap capture. Malformed records are skipped and reported as warnings;
/// decoding fails only for an unusable container or when not a single frame decodes.
pub fn decode_capture(bytes: &[u8]) -> Result<DecodedCapture, CaptureParseError> {
    decode_indexed_capture(0, bytes)
}

/// Decodes the capture at position `capture` of a set of captures. Frame ids and warnings
/// carry that position.
pub fn decode_indexed_capture(
    capture: usize,
    bytes: &[u8],
) -> Result<DecodedCapture, CaptureParseError> {
    let mut reader = pcap::Reader::new(bytes)?;
    let link_type = reader.header().link_type;
    let mut decoded = DecodedCapture::default();
    for record in &mut reader {
        let result = record.and_then(|record| {
            let id = FrameId { capture, record: record.index };
            decode_frame(id, record.timestamp, link_type, record.data).map_err(|kind| {
                CaptureParseError::Record { record: record.index, offset: record.offset, kind }
            })
        });
        match result {
            Ok(frame) => decoded.frames.push(frame),
            Err(CaptureParseError::Record { record, offset, kind }) => {
                warn!("capture {}: skipping record {} at offset {}: {}", capture, record, offset, kind);
                decoded.warnings.push(DecodeWarning { capture, record, offset, error: kind });
            }
            Err(e) => return Err(e),
        }
    }
    decoded.records = reader.records_read();
    if decoded.frames.is_empty() {
        return Err(CaptureParseError::NoFrames {
            records: decoded.records,
            warnings: decoded.warnings,
        });
    }
    info!(
        "capture {}: decoded {} frames from {} records ({} skipped)",
        capture,
        decoded.frames.len(),
        decoded.records,
        decoded.warnings.len()
    );
    Ok(decoded)
}

/// Decodes several captures of the same air and merges their frames by timestamp. Frame ids
/// carry the index of the capture within `captures`.
pub fn decode_captures<'a, I>(captures: I) -> Result<DecodedCapture, CaptureParseError>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut per_capture = vec![];
    let mut merged = DecodedCapture::default();
    for (capture, bytes) in captures.into_iter().enumerate() {
        let decoded = decode_indexed_capture(capture, bytes)
            .map_err(|e| CaptureParseError::InCapture { capture, source: Box::new(e) })?;
        merged.records += decoded.records;
        merged.warnings.extend(decoded.warnings);
        per_capture.push(decoded.frames);
    }
    merged.frames = merge_frames(per_capture);
    Ok(merged)
}

/// Merges per-capture frame sequences by timestamp. Each input's own order is kept even if
/// its timestamps are not monotonic; ties go to the capture listed first.
pub fn merge_frames(captures: Vec<Vec<Frame>>) -> Vec<Frame> {
    let total = captures.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut iters: Vec<_> = captures.into_iter().map(|c| c.into_iter().peekable()).collect();
    loop {
        let mut next: Option<(usize, Timestamp)> = None;
        for (i, iter) in iters.iter_mut().enumerate() {
            if let Some(frame) = iter.peek() {
                match next {
                    Some((_, ts)) if ts <= frame.timestamp => (),
                    _ => next = Some((i, frame.timestamp)),
                }
            }
        }
        match next.and_then(|(i, _)| iters[i].next()) {
            Some(frame) => merged.push(frame),
            None => return merged,
        }
    }
}

/// Decodes one capture record into a frame.
pub fn decode_frame(
    id: FrameId,
    timestamp: Timestamp,
    link_type: LinkType,
    data: &[u8],
) -> Result<Frame, RecordError> {
    let (rate_info, mpdu) = match link_type {
        LinkType::Ieee80211 => (None, data),
        LinkType::Ieee80211Radiotap => {
            let (info, mut mpdu) = radiotap::parse(data)?;
            if info.bad_fcs() {
                return Err(RecordError::BadFcs);
            }
            if info.fcs_at_end() && mpdu.len() >= FCS_LEN {
                mpdu = &mpdu[..mpdu.len() - FCS_LEN];
            }
            (Some(RateInfo::from(&info)), mpdu)
        }
    };

    let (hdr, body) = MacHeader::parse(mpdu)?;
    let frame_type = match hdr.frame_type() {
        mac::FRAME_TYPE_MGMT => FrameType::Management,
        mac::FRAME_TYPE_CTRL => FrameType::Control,
        _ => FrameType::Data,
    };
    let protected = hdr.frame_ctrl.protected();
    Ok(Frame {
        id,
        timestamp,
        frame_type,
        subtype: hdr.frame_subtype(),
        source: hdr.src_addr(),
        destination: hdr.dst_addr(),
        transmitter: hdr.transmitter_addr(),
        receiver: hdr.receiver_addr(),
        bssid: hdr.bssid(),
        sequence_number: hdr.seq_num(),
        retry: hdr.frame_ctrl.retry(),
        protected,
        amsdu: hdr.qos_ctrl.map_or(false, |qos| qos.amsdu_present()),
        tid: hdr.qos_ctrl.map(|qos| qos.tid()),
        rate_info,
        body: decode_body(frame_type, hdr.frame_subtype(), protected, body),
    })
}

fn decode_body(frame_type: FrameType, subtype: u16, protected: bool, body: &[u8]) -> FrameBody {
    let decoded = match frame_type {
        FrameType::Management if protected => Some(FrameBody::Opaque),
        FrameType::Management => match subtype {
            mac::MGMT_SUBTYPE_AUTH => read_auth(&mut BufferReader::new(body)),
            mac::MGMT_SUBTYPE_ASSOC_RESP | mac::MGMT_SUBTYPE_REASSOC_RESP => {
                read_assoc_resp(&mut BufferReader::new(body))
            }
            mac::MGMT_SUBTYPE_DEAUTH | mac::MGMT_SUBTYPE_DISASSOC => {
                BufferReader::new(body).read_le_u16().map(|code| FrameBody::Reason { code })
            }
            mac::MGMT_SUBTYPE_ACTION | mac::MGMT_SUBTYPE_ACTION_NO_ACK => {
                read_action(&mut BufferReader::new(body))
            }
            _ => Some(FrameBody::Opaque),
        },
        FrameType::Data if !protected && subtype & mac::BITMASK_NULL == 0 => {
            Some(eapol::parse_llc_key_frame(body).map_or(FrameBody::Opaque, |key| {
                FrameBody::EapolKey { key_info: key.key_info.0, message: key.key_info.message() }
            }))
        }
        _ => Some(FrameBody::Opaque),
    };
    decoded.unwrap_or_else(|| {
        debug!("{:?} frame subtype {} body truncated at {} bytes", frame_type, subtype, body.len());
        FrameBody::Opaque
    })
}

// IEEE Std 802.11-2016, 9.3.3.12
fn read_auth(reader: &mut BufferReader<'_>) -> Option<FrameBody> {
    Some(FrameBody::Authentication {
        algorithm: reader.read_le_u16()?,
        transaction: reader.read_le_u16()?,
        status: reader.read_le_u16()?,
    })
}

// IEEE Std 802.11-2016, 9.3.3.7
fn read_assoc_resp(reader: &mut BufferReader<'_>) -> Option<FrameBody> {
    let _capabilities = reader.read_le_u16()?;
    Some(FrameBody::AssociationResponse {
        status: reader.read_le_u16()?,
        aid: reader.read_le_u16()? & AID_MASK,
    })
}

fn read_action(reader: &mut BufferReader<'_>) -> Option<FrameBody> {
    Some(FrameBody::Action { category: reader.read_u8()?, action: reader.read_u8()? })
}
