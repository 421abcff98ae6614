// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    assert_matches::assert_matches,
    wlan_capture::{
        mac::{self, BCAST_ADDR},
        pcap::LinkType,
        radiotap::PhyRate,
        test_utils::{self, PcapWriter, AP_ADDR, STA_ADDR},
        Timestamp,
    },
    wlan_diag::{
        report::{self, CorrelationListing},
        CaptureInput, DiagnosticConfig, DiagnosticSession, DumpInput, EventKind,
    },
};

const HEADER: &str = "\
#define REG_SYS_FUNC\t\t\t0x0002
#define  SYS_FUNC_BBRSTB\t\tBIT(0)
#define REG_APS_FSMCO\t\t\t0x0004
#define REG_TSFTR\t\t\t0x0560
#define RF6052_REG_MODE_AG\t\t0x18
#define  MODE_AG_CHANNEL_MASK\t\t0x3ff
";

fn config(clock_offset_ms: i64) -> DiagnosticConfig {
    DiagnosticConfig::from_json_str(&format!(
        r#"{{
            "ap": "{}",
            "station": "{}",
            "correlation": {{ "window_ms": 1000, "clock_offset_ns": {} }}
        }}"#,
        AP_ADDR,
        STA_ADDR,
        clock_offset_ms * 1_000_000
    ))
    .expect("invalid config")
}

fn fw_dump(name: &str, secs: i64, word: &str) -> DumpInput {
    DumpInput {
        name: name.to_string(),
        content: format!(
            "======= FW REG (rtl8xxxu) =======\n0x1230: 0x00000000 {} 0x00000000 0x00000000\n",
            word
        ),
        capture_time: Timestamp::from_secs(secs),
    }
}

fn record(frame: Vec<u8>) -> Vec<u8> {
    let mut bytes =
        test_utils::radiotap_header(Some(PhyRate::Legacy { rate_500kbps: 12 }), 2412, -40, false);
    bytes.extend_from_slice(&frame);
    bytes
}

/// Probe, authentication and association between 19.7 s and 20.3 s on the monitor clock.
fn association_capture() -> CaptureInput {
    let ms = Timestamp::from_millis;
    let mut writer = PcapWriter::new(LinkType::Ieee80211Radiotap);
    writer
        .push_record(
            ms(19_700),
            &record(test_utils::mgmt_frame(
                mac::MGMT_SUBTYPE_PROBE_REQ,
                BCAST_ADDR,
                STA_ADDR,
                BCAST_ADDR,
                1,
                &[],
            )),
        )
        .push_record(
            ms(19_800),
            &record(test_utils::mgmt_frame(
                mac::MGMT_SUBTYPE_AUTH,
                AP_ADDR,
                STA_ADDR,
                AP_ADDR,
                2,
                &test_utils::auth_body(1, 0),
            )),
        )
        // Cut short inside the MAC header.
        .push_record(ms(19_850), &record(vec![0xb0, 0x00, 0x00]))
        .push_record(
            ms(19_900),
            &record(test_utils::mgmt_frame(
                mac::MGMT_SUBTYPE_ASSOC_REQ,
                AP_ADDR,
                STA_ADDR,
                AP_ADDR,
                3,
                &[0x01, 0x00, 0x0a, 0x00],
            )),
        )
        .push_record(
            ms(20_300),
            &record(test_utils::mgmt_frame(
                mac::MGMT_SUBTYPE_ASSOC_RESP,
                STA_ADDR,
                AP_ADDR,
                AP_ADDR,
                4,
                &test_utils::assoc_resp_body(0, 1),
            )),
        );
    CaptureInput { name: "monitor.pcap".to_string(), bytes: writer.into_bytes() }
}

#[test]
fn register_change_correlates_with_association() {
    let session = DiagnosticSession::new(config(0));
    let dumps = vec![fw_dump("fw-0.txt", 10, "0x00000000"), fw_dump("fw-1.txt", 20, "0x00000001")];
    let report =
        session.run(HEADER, &dumps, &[association_capture()]).expect("diagnostic run failed");

    let diffs = report.all_register_diffs();
    assert_eq!(1, diffs.len());
    assert_eq!("unknown-0x1234", diffs[0].name);
    assert_eq!(0x1234, diffs[0].address);
    assert_eq!(Some(0x00), diffs[0].previous_value);
    assert_eq!(Some(0x01), diffs[0].new_value);
    assert_eq!(Timestamp::from_secs(20), diffs[0].timestamp);

    let kinds: Vec<_> = report.timeline.events.iter().map(|e| e.kind).collect();
    assert_eq!(vec![EventKind::Probe, EventKind::Auth, EventKind::Assoc, EventKind::Assoc], kinds);

    assert_eq!(1, report.correlation.len());
    let record = &report.correlation[0];
    assert_eq!(Timestamp::from_millis(19_700), record.timestamp);
    assert_eq!(1, record.register_diffs.len());
    assert_eq!(4, record.protocol_events.len());
    assert!(record
        .protocol_events
        .iter()
        .any(|e| e.kind == EventKind::Assoc && e.timestamp == Timestamp::from_millis(20_300)));

    // The truncated record is reported and the frames after it still decode.
    assert_eq!(1, report.warnings.len());
    assert!(report.warnings[0].starts_with("monitor.pcap: skipped record 2"), "{}", report.warnings[0]);
    assert_eq!(4, report.statistics.total);
}

#[test]
fn register_change_outside_of_window() {
    let session = DiagnosticSession::new(config(0));
    let dumps = vec![fw_dump("fw-0.txt", 10, "0x00000000"), fw_dump("fw-1.txt", 25, "0x00000001")];
    let report =
        session.run(HEADER, &dumps, &[association_capture()]).expect("diagnostic run failed");
    assert_eq!(2, report.correlation.len());
    assert!(report.correlation[0].register_diffs.is_empty());
    assert_eq!(4, report.correlation[0].protocol_events.len());
    assert_eq!(1, report.correlation[1].register_diffs.len());
    assert!(report.correlation[1].protocol_events.is_empty());
}

#[test]
fn clock_offset_aligns_device_time() {
    // The device clock runs 100 s behind the monitor.
    let session = DiagnosticSession::new(config(100_000));
    let dumps =
        vec![fw_dump("fw-0.txt", -90, "0x00000000"), fw_dump("fw-1.txt", -80, "0x00000001")];
    let report =
        session.run(HEADER, &dumps, &[association_capture()]).expect("diagnostic run failed");
    assert_eq!(1, report.correlation.len());
    assert_eq!(Timestamp::from_secs(20), report.correlation[0].register_diffs[0].timestamp);
}

#[test]
fn failing_and_lonely_dumps_are_reported() {
    let session = DiagnosticSession::new(config(0));
    let dumps = vec![
        fw_dump("fw-0.txt", 10, "0x00000000"),
        fw_dump("fw-1.txt", 20, "0x00000000"),
        DumpInput {
            name: "broken.txt".to_string(),
            content: "======= FW REG (rtl8xxxu) =======\n0x1230 0x0\n".to_string(),
            capture_time: Timestamp::from_secs(30),
        },
        DumpInput {
            name: "mac-0.txt".to_string(),
            content: "======= MAC REG (rtl8xxxu) =======\n0x000: 0x00010000\n".to_string(),
            capture_time: Timestamp::from_secs(30),
        },
    ];
    let report =
        session.run(HEADER, &dumps, &[association_capture()]).expect("diagnostic run failed");
    assert_eq!(1, report.register_diffs.len());
    assert_eq!(vec!["fw-0.txt", "fw-1.txt"], report.register_diffs[0].snapshots);
    assert!(report.all_register_diffs().is_empty());
    assert!(report.warnings.iter().any(|w| w.contains("broken.txt:2")), "{:?}", report.warnings);
    assert!(report.warnings.iter().any(|w| w.contains("section MAC")), "{:?}", report.warnings);
}

#[test]
fn unusable_capture_is_excluded() {
    let session = DiagnosticSession::new(config(0));
    let broken = CaptureInput { name: "broken.pcap".to_string(), bytes: vec![0u8; 10] };
    let report = session
        .run(HEADER, &[], &[broken, association_capture()])
        .expect("diagnostic run failed");
    assert_eq!(4, report.statistics.total);
    assert_eq!(4, report.timeline.events.len());
    assert!(report.timeline.events[0].frames.iter().all(|id| id.capture == 1));
    assert_eq!(2, report.warnings.len());
    assert!(
        report.warnings[0].starts_with("excluded capture broken.pcap: "),
        "{}",
        report.warnings[0]
    );
    assert!(report.warnings[1].starts_with("monitor.pcap: skipped record 2"), "{}", report.warnings[1]);
}

#[test]
fn run_fails_without_a_usable_capture() {
    let session = DiagnosticSession::new(config(0));
    let broken = CaptureInput { name: "broken.pcap".to_string(), bytes: vec![0u8; 10] };
    let err = session.run(HEADER, &[], &[broken]).expect_err("run should fail");
    assert_eq!("failed to decode capture broken.pcap", err.to_string());
    assert_matches!(
        err.downcast_ref::<wlan_capture::CaptureParseError>(),
        Some(wlan_capture::CaptureParseError::TruncatedGlobalHeader(10))
    );
}

#[test]
fn broken_header_fails_the_run() {
    let session = DiagnosticSession::new(config(0));
    let header = format!("{}#define REG_SYS_FUNC_ALIAS\t0x0002\n", HEADER);
    let err = session.run(&header, &[], &[]).expect_err("run should fail");
    assert_matches!(
        err.downcast_ref::<wlan_diag::MapParseError>(),
        Some(wlan_diag::MapParseError::DuplicateAddress { .. })
    );
}

#[test]
fn report_renderings() {
    let session = DiagnosticSession::new(config(0));
    let dumps = vec![fw_dump("fw-0.txt", 10, "0x00000000"), fw_dump("fw-1.txt", 20, "0x00000001")];
    let report =
        session.run(HEADER, &dumps, &[association_capture()]).expect("diagnostic run failed");

    let listing = CorrelationListing(&report.correlation).to_string();
    assert!(listing.starts_with("== #0 at 19.700000000\n"), "{}", listing);
    assert!(listing.contains("20.000000000 FW 0x1234 unknown-0x1234: 0x00000000 -> 0x00000001"));

    let json = report::to_json(&report).expect("failed serializing report");
    let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");
    assert_eq!(value["timeline"]["final_state"], "associated");
    assert_eq!(value["correlation"][0]["register_diffs"][0]["name"], "unknown-0x1234");
    assert_eq!(value["register_diffs"][0]["section"], "FW");
}
