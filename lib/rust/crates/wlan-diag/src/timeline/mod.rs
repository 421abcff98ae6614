// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reduction of a frame sequence into the protocol events of one AP/station pair.

mod state;

pub use state::{next_state, HandshakeStep, LinkState, Rule, Target, Trigger, TRANSITIONS};

use {
    log::{info, warn},
    serde::Serialize,
    std::{collections::BTreeMap, fmt},
    wlan_capture::{
        eapol::KeyMessage,
        mac::{self, MacAddr},
        radiotap::PhyRate,
        Frame, FrameBody, FrameId, FrameType, Timestamp,
    },
};

pub const DEFAULT_RETRY_BURST_THRESHOLD: usize = 3;

const ACTION_CATEGORY_BLOCK_ACK: u8 = 3;
const ACTION_ADDBA_REQUEST: u8 = 0;
const ACTION_ADDBA_RESPONSE: u8 = 1;
const ACTION_DELBA: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineConfig {
    pub ap: MacAddr,
    pub station: MacAddr,
    /// A burst yields an event once its retried frames outnumber this.
    pub retry_burst_threshold: usize,
}

impl TimelineConfig {
    pub fn new(ap: MacAddr, station: MacAddr) -> Self {
        TimelineConfig { ap, station, retry_burst_threshold: DEFAULT_RETRY_BURST_THRESHOLD }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Probe,
    Auth,
    Assoc,
    Reassoc,
    Deauth,
    Disassoc,
    KeyExchange,
    DataActive,
    RetryBurst,
    RateChange,
    ChannelChange,
    BlockAck,
    UnexpectedTransition,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Probe => "probe",
            EventKind::Auth => "auth",
            EventKind::Assoc => "assoc",
            EventKind::Reassoc => "reassoc",
            EventKind::Deauth => "deauth",
            EventKind::Disassoc => "disassoc",
            EventKind::KeyExchange => "key-exchange",
            EventKind::DataActive => "data-active",
            EventKind::RetryBurst => "retry-burst",
            EventKind::RateChange => "rate-change",
            EventKind::ChannelChange => "channel-change",
            EventKind::BlockAck => "block-ack",
            EventKind::UnexpectedTransition => "unexpected-transition",
        };
        f.write_str(name)
    }
}

impl From<Trigger> for EventKind {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::ProbeRequest | Trigger::ProbeResponse => EventKind::Probe,
            Trigger::Authentication => EventKind::Auth,
            Trigger::AssociationRequest
            | Trigger::AssociationAccepted
            | Trigger::AssociationRejected => EventKind::Assoc,
            Trigger::ReassociationRequest
            | Trigger::ReassociationAccepted
            | Trigger::ReassociationRejected => EventKind::Reassoc,
            Trigger::KeyMessage(_) | Trigger::GroupKeyMessage => EventKind::KeyExchange,
            Trigger::Data => EventKind::DataActive,
            Trigger::Deauthentication => EventKind::Deauth,
            Trigger::Disassociation => EventKind::Disassoc,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Participants {
    pub ap: MacAddr,
    pub station: MacAddr,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolEvent {
    pub timestamp: Timestamp,
    pub kind: EventKind,
    pub participants: Participants,
    pub detail: String,
    /// Frames this event was derived from.
    pub frames: Vec<FrameId>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolTimeline {
    pub events: Vec<ProtocolEvent>,
    pub final_state: LinkState,
    /// Frames not exchanged between the AP and the station.
    pub ignored_frames: usize,
}

impl ProtocolTimeline {
    pub fn unexpected_transitions(&self) -> impl Iterator<Item = &ProtocolEvent> {
        self.events.iter().filter(|e| e.kind == EventKind::UnexpectedTransition)
    }
}

/// Transmitter and traffic identifier. QoS data of each TID has its own sequence counter.
type RetryKey = (MacAddr, Option<u16>);

/// Consecutive data frames of one transmitter and TID with the same sequence number.
#[derive(Debug)]
struct RetryBurst {
    sequence_number: u16,
    first_retry: Option<Timestamp>,
    retried: Vec<FrameId>,
}

pub struct TimelineBuilder {
    config: TimelineConfig,
    state: LinkState,
    bursts: BTreeMap<RetryKey, RetryBurst>,
    rates: BTreeMap<MacAddr, PhyRate>,
    channels: BTreeMap<MacAddr, u16>,
    events: Vec<ProtocolEvent>,
    ignored_frames: usize,
}

impl TimelineBuilder {
    pub fn new(config: TimelineConfig) -> Self {
        TimelineBuilder {
            config,
            state: LinkState::Idle,
            bursts: BTreeMap::new(),
            rates: BTreeMap::new(),
            channels: BTreeMap::new(),
            events: vec![],
            ignored_frames: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn push(&mut self, frame: &Frame) {
        let transmitter = match frame.transmitter {
            Some(ta) if self.is_pair(ta, frame.receiver) => ta,
            _ => {
                self.ignored_frames += 1;
                return;
            }
        };
        let unicast = !frame.receiver.is_broadcast();

        if unicast {
            self.track_radio(transmitter, frame);
        }
        // Group addressed frames are never retried.
        if frame.frame_type == FrameType::Data && unicast {
            self.track_retries(transmitter, frame);
        }
        if let Some((category, action)) = block_ack_action(frame) {
            self.block_ack(frame, category, action);
        }
        if let Some(trigger) = classify(frame, unicast) {
            self.apply(frame, trigger);
        }
    }

    pub fn finish(mut self) -> ProtocolTimeline {
        let bursts = std::mem::take(&mut self.bursts);
        for ((transmitter, _), burst) in bursts {
            self.close_burst(transmitter, burst);
        }
        // Retry bursts are reported when they end, but are dated at their first retry.
        self.events.sort_by_key(|e| e.timestamp);
        info!(
            "{} protocol events, final state {}, {} frames of other stations",
            self.events.len(),
            self.state,
            self.ignored_frames
        );
        ProtocolTimeline {
            events: self.events,
            final_state: self.state,
            ignored_frames: self.ignored_frames,
        }
    }

    fn is_pair(&self, transmitter: MacAddr, receiver: MacAddr) -> bool {
        let TimelineConfig { ap, station, .. } = self.config;
        (transmitter == ap && (receiver == station || receiver.is_broadcast()))
            || (transmitter == station && (receiver == ap || receiver.is_broadcast()))
    }

    fn role(&self, addr: MacAddr) -> &'static str {
        if addr == self.config.ap {
            "AP"
        } else {
            "station"
        }
    }

    fn emit(&mut self, frame_ts: Timestamp, kind: EventKind, detail: String, frames: Vec<FrameId>) {
        self.events.push(ProtocolEvent {
            timestamp: frame_ts,
            kind,
            participants: Participants { ap: self.config.ap, station: self.config.station },
            detail,
            frames,
        });
    }

    fn apply(&mut self, frame: &Frame, trigger: Trigger) {
        match next_state(self.state, trigger) {
            Some(next) => {
                let previous = self.state;
                self.state = next;
                if previous == next && reported_on_change_only(trigger) {
                    return;
                }
                let detail = match describe_body(&frame.body) {
                    Some(body) => format!("{} ({}): {} -> {}", trigger, body, previous, next),
                    None => format!("{}: {} -> {}", trigger, previous, next),
                };
                self.emit(frame.timestamp, trigger.into(), detail, vec![frame.id]);
            }
            None if trigger == Trigger::Data => (),
            None => {
                warn!(
                    "unexpected {} from {} at {} in state {}",
                    trigger,
                    frame.transmitter.map(|ta| ta.to_string()).unwrap_or_default(),
                    frame.timestamp,
                    self.state
                );
                let detail = format!("{} in state {}", trigger, self.state);
                self.emit(frame.timestamp, EventKind::UnexpectedTransition, detail, vec![frame.id]);
            }
        }
    }

    fn track_radio(&mut self, transmitter: MacAddr, frame: &Frame) {
        let rate_info = match frame.rate_info {
            Some(info) => info,
            None => return,
        };
        let role = self.role(transmitter);
        if let Some(rate) = rate_info.phy_rate {
            if let Some(previous) = self.rates.insert(transmitter, rate) {
                if previous != rate {
                    let detail = format!("{} {}: {} -> {}", role, transmitter, previous, rate);
                    self.emit(frame.timestamp, EventKind::RateChange, detail, vec![frame.id]);
                }
            }
        }
        if let Some(channel) = rate_info.channel_mhz {
            if let Some(previous) = self.channels.insert(transmitter, channel) {
                if previous != channel {
                    let detail =
                        format!("{} {}: {} MHz -> {} MHz", role, transmitter, previous, channel);
                    self.emit(frame.timestamp, EventKind::ChannelChange, detail, vec![frame.id]);
                }
            }
        }
    }

    fn track_retries(&mut self, transmitter: MacAddr, frame: &Frame) {
        let sequence_number = match frame.sequence_number {
            Some(seq) => seq,
            None => return,
        };
        let key = (transmitter, frame.tid);
        let same_burst =
            self.bursts.get(&key).map_or(false, |b| b.sequence_number == sequence_number);
        if !same_burst {
            let burst = RetryBurst { sequence_number, first_retry: None, retried: vec![] };
            if let Some(ended) = self.bursts.insert(key, burst) {
                self.close_burst(transmitter, ended);
            }
        }
        if frame.retry {
            if let Some(burst) = self.bursts.get_mut(&key) {
                burst.first_retry.get_or_insert(frame.timestamp);
                burst.retried.push(frame.id);
            }
        }
    }

    fn close_burst(&mut self, transmitter: MacAddr, burst: RetryBurst) {
        if burst.retried.len() <= self.config.retry_burst_threshold {
            return;
        }
        if let Some(first_retry) = burst.first_retry {
            let detail = format!(
                "{} {}: {} retries of sequence number {}",
                self.role(transmitter),
                transmitter,
                burst.retried.len(),
                burst.sequence_number
            );
            self.emit(first_retry, EventKind::RetryBurst, detail, burst.retried);
        }
    }

    fn block_ack(&mut self, frame: &Frame, category: u8, action: u8) {
        let what = match (category, action) {
            (ACTION_CATEGORY_BLOCK_ACK, ACTION_ADDBA_REQUEST) => "ADDBA request",
            (ACTION_CATEGORY_BLOCK_ACK, ACTION_ADDBA_RESPONSE) => "ADDBA response",
            (ACTION_CATEGORY_BLOCK_ACK, ACTION_DELBA) => "DELBA",
            _ => return,
        };
        let detail = match frame.transmitter {
            Some(ta) => format!("{} from {} {}", what, self.role(ta), ta),
            None => what.to_string(),
        };
        self.emit(frame.timestamp, EventKind::BlockAck, detail, vec![frame.id]);
    }
}

/// Triggers that repeat as a matter of course, such as scanning and traffic.
fn reported_on_change_only(trigger: Trigger) -> bool {
    matches!(trigger, Trigger::Data | Trigger::ProbeRequest | Trigger::ProbeResponse)
}

fn block_ack_action(frame: &Frame) -> Option<(u8, u8)> {
    match frame.body {
        FrameBody::Action { category, action }
            if frame.is_mgmt(mac::MGMT_SUBTYPE_ACTION) && category == ACTION_CATEGORY_BLOCK_ACK =>
        {
            Some((category, action))
        }
        _ => None,
    }
}

/// The link state trigger a frame of the pair stands for, if any.
fn classify(frame: &Frame, unicast: bool) -> Option<Trigger> {
    match frame.frame_type {
        FrameType::Management => match (frame.subtype, frame.body) {
            (mac::MGMT_SUBTYPE_PROBE_REQ, _) => Some(Trigger::ProbeRequest),
            (mac::MGMT_SUBTYPE_PROBE_RESP, _) if unicast => Some(Trigger::ProbeResponse),
            (mac::MGMT_SUBTYPE_AUTH, _) if unicast => Some(Trigger::Authentication),
            (mac::MGMT_SUBTYPE_ASSOC_REQ, _) if unicast => Some(Trigger::AssociationRequest),
            (mac::MGMT_SUBTYPE_ASSOC_RESP, FrameBody::AssociationResponse { status, .. })
                if unicast =>
            {
                Some(if status == 0 {
                    Trigger::AssociationAccepted
                } else {
                    Trigger::AssociationRejected
                })
            }
            (mac::MGMT_SUBTYPE_REASSOC_REQ, _) if unicast => Some(Trigger::ReassociationRequest),
            (mac::MGMT_SUBTYPE_REASSOC_RESP, FrameBody::AssociationResponse { status, .. })
                if unicast =>
            {
                Some(if status == 0 {
                    Trigger::ReassociationAccepted
                } else {
                    Trigger::ReassociationRejected
                })
            }
            (mac::MGMT_SUBTYPE_DEAUTH, _) => Some(Trigger::Deauthentication),
            (mac::MGMT_SUBTYPE_DISASSOC, _) => Some(Trigger::Disassociation),
            _ => None,
        },
        FrameType::Data if unicast => match frame.body {
            FrameBody::EapolKey { message: Some(KeyMessage::Group1), .. }
            | FrameBody::EapolKey { message: Some(KeyMessage::Group2), .. } => {
                Some(Trigger::GroupKeyMessage)
            }
            FrameBody::EapolKey { message: Some(message), .. } => {
                HandshakeStep::from_key_message(message).map(Trigger::KeyMessage)
            }
            FrameBody::EapolKey { message: None, .. } => None,
            _ if frame.is_null_data() => None,
            _ => Some(Trigger::Data),
        },
        _ => None,
    }
}

fn describe_body(body: &FrameBody) -> Option<String> {
    match body {
        FrameBody::Authentication { algorithm, transaction, status } => Some(format!(
            "algorithm {}, transaction {}, status {}",
            algorithm, transaction, status
        )),
        FrameBody::AssociationResponse { status, aid } => {
            Some(format!("status {}, AID {}", status, aid))
        }
        FrameBody::Reason { code } => Some(format!("reason {}", code)),
        _ => None,
    }
}

/// Builds the timeline of the configured pair from frames in capture order.
pub fn build_timeline(frames: &[Frame], config: &TimelineConfig) -> ProtocolTimeline {
    let mut builder = TimelineBuilder::new(config.clone());
    for frame in frames {
        builder.push(frame);
    }
    builder.finish()
}
