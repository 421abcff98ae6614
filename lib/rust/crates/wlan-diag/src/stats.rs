// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    serde::Serialize,
    std::collections::BTreeMap,
    wlan_capture::{mac, radiotap::PhyClass, Frame, FrameBody, MacAddr},
};

const ACTION_CATEGORY_BLOCK_ACK: u8 = 3;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SenderCounts {
    pub frames: usize,
    pub retries: usize,
    /// Frames per PHY generation, for frames with a known rate.
    pub phy: BTreeMap<PhyClass, usize>,
}

impl SenderCounts {
    fn add(&mut self, frame: &Frame) {
        self.frames += 1;
        if frame.retry {
            self.retries += 1;
        }
        if let Some(rate) = frame.rate_info.and_then(|info| info.phy_rate) {
            *self.phy.entry(rate.phy_class()).or_default() += 1;
        }
    }

    pub fn retry_fraction(&self) -> Option<f64> {
        fraction(self.retries, self.frames)
    }
}

/// Traffic counters of a capture, split by who transmitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CaptureStatistics {
    pub total: usize,
    pub retries: usize,
    /// Frames of the AP and the station plus frames without a transmitter address, beacons
    /// excluded.
    pub network: usize,
    pub network_retries: usize,
    pub by_ap: SenderCounts,
    pub by_station: SenderCounts,
    pub by_others: SenderCounts,
    pub no_transmitter: SenderCounts,
    /// Network frames carrying an A-MSDU.
    pub amsdu_frames: usize,
    pub block_ack_requests: usize,
    pub block_ack_responses: usize,
}

fn fraction(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part as f64 / whole as f64)
    }
}

impl CaptureStatistics {
    pub fn compute(frames: &[Frame], ap: MacAddr, station: MacAddr) -> Self {
        let mut stats = CaptureStatistics::default();
        for frame in frames {
            stats.total += 1;
            if frame.retry {
                stats.retries += 1;
            }
            let counts = match frame.transmitter {
                Some(ta) if ta == ap => &mut stats.by_ap,
                Some(ta) if ta == station => &mut stats.by_station,
                Some(_) => &mut stats.by_others,
                None => &mut stats.no_transmitter,
            };
            counts.add(frame);

            let from_network = match frame.transmitter {
                Some(ta) => ta == ap || ta == station,
                None => true,
            };
            if !from_network || frame.is_mgmt(mac::MGMT_SUBTYPE_BEACON) {
                continue;
            }
            stats.network += 1;
            if frame.retry {
                stats.network_retries += 1;
            }
            if frame.amsdu {
                stats.amsdu_frames += 1;
            }
            if let FrameBody::Action { category: ACTION_CATEGORY_BLOCK_ACK, action } = frame.body {
                match action {
                    0 => stats.block_ack_requests += 1,
                    1 => stats.block_ack_responses += 1,
                    _ => (),
                }
            }
        }
        stats
    }

    pub fn retry_fraction(&self) -> Option<f64> {
        fraction(self.retries, self.total)
    }

    pub fn network_retry_fraction(&self) -> Option<f64> {
        fraction(self.network_retries, self.network)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        wlan_capture::{
            mac::BCAST_ADDR,
            radiotap::PhyRate,
            test_utils::{FrameBuilder, AP_ADDR, OTHER_STA_ADDR, STA_ADDR},
        },
    };

    #[test]
    fn counts_by_transmitter() {
        let frames = vec![
            FrameBuilder::mgmt(mac::MGMT_SUBTYPE_BEACON, AP_ADDR, BCAST_ADDR)
                .rate(PhyRate::Legacy { rate_500kbps: 2 })
                .build(),
            FrameBuilder::data(AP_ADDR, STA_ADDR).rate(PhyRate::Ht { mcs: 7 }).amsdu().build(),
            FrameBuilder::data(AP_ADDR, STA_ADDR).rate(PhyRate::Ht { mcs: 7 }).retry().build(),
            FrameBuilder::data(STA_ADDR, AP_ADDR).rate(PhyRate::Legacy { rate_500kbps: 108 }).build(),
            FrameBuilder::data(OTHER_STA_ADDR, AP_ADDR).retry().build(),
            FrameBuilder::ctrl(mac::CTRL_SUBTYPE_ACK, STA_ADDR).build(),
            FrameBuilder::mgmt(mac::MGMT_SUBTYPE_ACTION, STA_ADDR, AP_ADDR)
                .body(FrameBody::Action { category: 3, action: 0 })
                .build(),
            FrameBuilder::mgmt(mac::MGMT_SUBTYPE_ACTION, AP_ADDR, STA_ADDR)
                .body(FrameBody::Action { category: 3, action: 1 })
                .build(),
        ];
        let stats = CaptureStatistics::compute(&frames, AP_ADDR, STA_ADDR);
        assert_eq!(8, stats.total);
        assert_eq!(2, stats.retries);
        assert_eq!(6, stats.network);
        assert_eq!(1, stats.network_retries);
        assert_eq!(4, stats.by_ap.frames);
        assert_eq!(1, stats.by_ap.retries);
        assert_eq!(Some(&2), stats.by_ap.phy.get(&PhyClass::Ht));
        assert_eq!(Some(&1), stats.by_ap.phy.get(&PhyClass::Dsss));
        assert_eq!(2, stats.by_station.frames);
        assert_eq!(Some(&1), stats.by_station.phy.get(&PhyClass::Ofdm));
        assert_eq!(1, stats.by_others.frames);
        assert_eq!(Some(1.0), stats.by_others.retry_fraction());
        assert_eq!(1, stats.no_transmitter.frames);
        assert_eq!(1, stats.amsdu_frames);
        assert_eq!(1, stats.block_ack_requests);
        assert_eq!(1, stats.block_ack_responses);
        assert_eq!(Some(0.25), stats.by_ap.retry_fraction());
        assert_eq!(Some(0.25), stats.retry_fraction());
    }

    #[test]
    fn fractions_of_empty_capture() {
        let stats = CaptureStatistics::compute(&[], AP_ADDR, STA_ADDR);
        assert_eq!(None, stats.retry_fraction());
        assert_eq!(None, stats.network_retry_fraction());
        assert_eq!(None, stats.by_station.retry_fraction());
    }
}
