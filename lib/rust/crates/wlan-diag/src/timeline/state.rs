// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    serde::Serialize,
    std::fmt,
    wlan_capture::eapol::KeyMessage,
    HandshakeStep::*,
    LinkState::*,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HandshakeStep {
    Message1,
    Message2,
    Message3,
    Message4,
}

impl HandshakeStep {
    pub fn from_key_message(message: KeyMessage) -> Option<HandshakeStep> {
        match message {
            KeyMessage::FourWay1 => Some(HandshakeStep::Message1),
            KeyMessage::FourWay2 => Some(HandshakeStep::Message2),
            KeyMessage::FourWay3 => Some(HandshakeStep::Message3),
            KeyMessage::FourWay4 => Some(HandshakeStep::Message4),
            KeyMessage::Group1 | KeyMessage::Group2 => None,
        }
    }

    fn number(&self) -> u8 {
        match self {
            HandshakeStep::Message1 => 1,
            HandshakeStep::Message2 => 2,
            HandshakeStep::Message3 => 3,
            HandshakeStep::Message4 => 4,
        }
    }
}

/// Link state of the AP/station pair, as far as it can be told from the air.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Idle,
    Probing,
    Authenticating,
    Associating,
    Associated,
    KeyExchange(HandshakeStep),
    DataActive,
    Deauthenticated,
    Disassociated,
}

impl Default for LinkState {
    fn default() -> Self {
        LinkState::Idle
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Idle => write!(f, "Idle"),
            LinkState::Probing => write!(f, "Probing"),
            LinkState::Authenticating => write!(f, "Authenticating"),
            LinkState::Associating => write!(f, "Associating"),
            LinkState::Associated => write!(f, "Associated"),
            LinkState::KeyExchange(step) => write!(f, "KeyExchange(M{})", step.number()),
            LinkState::DataActive => write!(f, "DataActive"),
            LinkState::Deauthenticated => write!(f, "Deauthenticated"),
            LinkState::Disassociated => write!(f, "Disassociated"),
        }
    }
}

/// What a frame between the AP and the station means to the link state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    ProbeRequest,
    ProbeResponse,
    Authentication,
    AssociationRequest,
    AssociationAccepted,
    AssociationRejected,
    ReassociationRequest,
    ReassociationAccepted,
    ReassociationRejected,
    KeyMessage(HandshakeStep),
    GroupKeyMessage,
    Data,
    Deauthentication,
    Disassociation,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::ProbeRequest => write!(f, "probe request"),
            Trigger::ProbeResponse => write!(f, "probe response"),
            Trigger::Authentication => write!(f, "authentication"),
            Trigger::AssociationRequest => write!(f, "association request"),
            Trigger::AssociationAccepted => write!(f, "association response (accepted)"),
            Trigger::AssociationRejected => write!(f, "association response (rejected)"),
            Trigger::ReassociationRequest => write!(f, "reassociation request"),
            Trigger::ReassociationAccepted => write!(f, "reassociation response (accepted)"),
            Trigger::ReassociationRejected => write!(f, "reassociation response (rejected)"),
            Trigger::KeyMessage(step) => write!(f, "4-way handshake message {}", step.number()),
            Trigger::GroupKeyMessage => write!(f, "group key handshake message"),
            Trigger::Data => write!(f, "data"),
            Trigger::Deauthentication => write!(f, "deauthentication"),
            Trigger::Disassociation => write!(f, "disassociation"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Stay,
    To(LinkState),
}

#[derive(Debug)]
pub struct Rule {
    pub from: &'static [LinkState],
    pub trigger: Trigger,
    pub to: Target,
}

const UNASSOCIATED: &[LinkState] =
    &[Idle, Probing, Authenticating, Associating, Deauthenticated, Disassociated];
const ASSOCIATED: &[LinkState] = &[
    Associated,
    KeyExchange(Message1),
    KeyExchange(Message2),
    KeyExchange(Message3),
    KeyExchange(Message4),
    DataActive,
];
const NOT_IDLE: &[LinkState] = &[
    Probing,
    Authenticating,
    Associating,
    Associated,
    KeyExchange(Message1),
    KeyExchange(Message2),
    KeyExchange(Message3),
    KeyExchange(Message4),
    DataActive,
    Deauthenticated,
    Disassociated,
];

pub const TRANSITIONS: &[Rule] = &[
    Rule {
        from: &[Idle, Probing, Deauthenticated, Disassociated],
        trigger: Trigger::ProbeRequest,
        to: Target::To(Probing),
    },
    Rule { from: &[Authenticating, Associating], trigger: Trigger::ProbeRequest, to: Target::Stay },
    Rule { from: ASSOCIATED, trigger: Trigger::ProbeRequest, to: Target::Stay },
    Rule { from: UNASSOCIATED, trigger: Trigger::ProbeResponse, to: Target::To(Probing) },
    Rule { from: ASSOCIATED, trigger: Trigger::ProbeResponse, to: Target::Stay },
    Rule {
        from: &[Idle, Probing, Authenticating, Deauthenticated, Disassociated],
        trigger: Trigger::Authentication,
        to: Target::To(Authenticating),
    },
    Rule {
        from: &[Authenticating, Associating, Disassociated],
        trigger: Trigger::AssociationRequest,
        to: Target::To(Associating),
    },
    Rule { from: &[Associating], trigger: Trigger::AssociationAccepted, to: Target::To(Associated) },
    Rule {
        from: &[Associating],
        trigger: Trigger::AssociationRejected,
        to: Target::To(Authenticating),
    },
    Rule {
        from: &[
            Associated,
            KeyExchange(Message1),
            KeyExchange(Message2),
            KeyExchange(Message3),
            KeyExchange(Message4),
            DataActive,
            Associating,
            Disassociated,
        ],
        trigger: Trigger::ReassociationRequest,
        to: Target::To(Associating),
    },
    Rule {
        from: &[Associating],
        trigger: Trigger::ReassociationAccepted,
        to: Target::To(Associated),
    },
    Rule {
        from: &[Associating],
        trigger: Trigger::ReassociationRejected,
        to: Target::To(Authenticating),
    },
    Rule {
        from: ASSOCIATED,
        trigger: Trigger::KeyMessage(Message1),
        to: Target::To(KeyExchange(Message1)),
    },
    Rule {
        from: &[KeyExchange(Message1), KeyExchange(Message2)],
        trigger: Trigger::KeyMessage(Message2),
        to: Target::To(KeyExchange(Message2)),
    },
    Rule {
        from: &[KeyExchange(Message2), KeyExchange(Message3)],
        trigger: Trigger::KeyMessage(Message3),
        to: Target::To(KeyExchange(Message3)),
    },
    Rule {
        from: &[KeyExchange(Message3), KeyExchange(Message4)],
        trigger: Trigger::KeyMessage(Message4),
        to: Target::To(KeyExchange(Message4)),
    },
    Rule {
        from: &[KeyExchange(Message4), DataActive],
        trigger: Trigger::GroupKeyMessage,
        to: Target::Stay,
    },
    Rule {
        from: &[Associated, KeyExchange(Message4), DataActive],
        trigger: Trigger::Data,
        to: Target::To(DataActive),
    },
    Rule { from: NOT_IDLE, trigger: Trigger::Deauthentication, to: Target::To(Deauthenticated) },
    Rule { from: NOT_IDLE, trigger: Trigger::Disassociation, to: Target::To(Disassociated) },
];

/// The state `trigger` leads to from `state`, or `None` if no rule allows it.
pub fn next_state(state: LinkState, trigger: Trigger) -> Option<LinkState> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.trigger == trigger && rule.from.contains(&state))
        .map(|rule| match rule.to {
            Target::Stay => state,
            Target::To(next) => next,
        })
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[test]
    fn full_connection() {
        let triggers = [
            Trigger::ProbeRequest,
            Trigger::ProbeResponse,
            Trigger::Authentication,
            Trigger::Authentication,
            Trigger::AssociationRequest,
            Trigger::AssociationAccepted,
            Trigger::KeyMessage(Message1),
            Trigger::KeyMessage(Message2),
            Trigger::KeyMessage(Message3),
            Trigger::KeyMessage(Message4),
            Trigger::GroupKeyMessage,
            Trigger::Data,
            Trigger::Deauthentication,
        ];
        let mut state = LinkState::default();
        let mut visited = vec![];
        for trigger in triggers.iter() {
            state = next_state(state, *trigger).expect("missing transition");
            visited.push(state);
        }
        assert_eq!(
            vec![
                Probing,
                Probing,
                Authenticating,
                Authenticating,
                Associating,
                Associated,
                KeyExchange(Message1),
                KeyExchange(Message2),
                KeyExchange(Message3),
                KeyExchange(Message4),
                KeyExchange(Message4),
                DataActive,
                Deauthenticated,
            ],
            visited
        );
    }

    #[test_case(Idle, Trigger::AssociationRequest; "assoc without auth")]
    #[test_case(Probing, Trigger::AssociationAccepted; "assoc resp without request")]
    #[test_case(Associated, Trigger::KeyMessage(Message3); "skipped key message")]
    #[test_case(KeyExchange(Message2), Trigger::Data; "data during handshake")]
    #[test_case(Idle, Trigger::Deauthentication; "deauth while idle")]
    #[test_case(DataActive, Trigger::Authentication; "auth while associated")]
    fn no_transition(state: LinkState, trigger: Trigger) {
        assert_eq!(None, next_state(state, trigger));
    }

    #[test]
    fn deauth_and_disassoc_from_any_non_idle_state() {
        for state in NOT_IDLE.iter() {
            assert_eq!(Some(Deauthenticated), next_state(*state, Trigger::Deauthentication));
            assert_eq!(Some(Disassociated), next_state(*state, Trigger::Disassociation));
        }
    }

    #[test]
    fn retransmitted_key_message_keeps_step() {
        assert_eq!(
            Some(KeyExchange(Message3)),
            next_state(KeyExchange(Message3), Trigger::KeyMessage(Message3))
        );
        assert_eq!(
            Some(KeyExchange(Message1)),
            next_state(DataActive, Trigger::KeyMessage(Message1))
        );
    }

    #[test]
    fn reassociation() {
        assert_eq!(Some(Associating), next_state(DataActive, Trigger::ReassociationRequest));
        assert_eq!(Some(Associated), next_state(Associating, Trigger::ReassociationAccepted));
    }

    #[test]
    fn display() {
        assert_eq!("KeyExchange(M3)", KeyExchange(Message3).to_string());
        assert_eq!("association response (rejected)", Trigger::AssociationRejected.to_string());
    }
}
