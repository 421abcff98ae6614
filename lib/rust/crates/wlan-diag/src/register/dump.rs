// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    super::{RegisterDefinition, RegisterSection},
    crate::error::DumpParseError,
    lazy_static::lazy_static,
    log::debug,
    regex::Regex,
    std::collections::BTreeMap,
    wlan_capture::Timestamp,
};

lazy_static! {
    static ref HEADER_RE: Regex =
        Regex::new(r"^=+ (?P<section>[A-Z]+) REG \((?P<driver>[^)]+)\) =+$").unwrap();
    static ref LINE_RE: Regex = Regex::new(
        r"^(?:[A-Za-z]+ REG \([^)]*\) )?(?P<address>0x[0-9a-fA-F]+):\s*(?P<values>.*)$"
    )
    .unwrap();
}

/// The register values of one section, as read from a single dump file.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterSnapshot {
    pub source: String,
    pub driver: Option<String>,
    pub section: &'static RegisterSection,
    pub capture_time: Timestamp,
    /// Raw value behind every dumped address: a byte for byte-addressed sections, a word for RF.
    values: BTreeMap<u32, u32>,
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    u64::from_str_radix(digits, 16).ok()
}

impl RegisterSnapshot {
    pub fn parse(
        source_name: &str,
        content: &str,
        capture_time: Timestamp,
    ) -> Result<RegisterSnapshot, DumpParseError> {
        let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (header_index, header) = lines
            .next()
            .ok_or_else(|| DumpParseError::Empty { source_name: source_name.to_string() })?;
        let caps = HEADER_RE.captures(header.trim()).ok_or_else(|| {
            DumpParseError::InvalidHeader {
                source_name: source_name.to_string(),
                line: header_index + 1,
                text: header.to_string(),
            }
        })?;
        let section = RegisterSection::by_name(&caps["section"]).ok_or_else(|| {
            DumpParseError::UnknownSection {
                source_name: source_name.to_string(),
                line: header_index + 1,
                section: caps["section"].to_string(),
            }
        })?;
        let driver = Some(caps["driver"].to_string());

        let mut values = BTreeMap::new();
        for (i, raw) in lines {
            let line = i + 1;
            let text = raw.trim();
            let malformed = || DumpParseError::MalformedLine {
                source_name: source_name.to_string(),
                line,
                text: raw.to_string(),
            };
            let caps = LINE_RE.captures(text).ok_or_else(malformed)?;
            let start = parse_hex(&caps["address"]).ok_or_else(malformed)?;
            for (n, word_text) in caps["values"].split_whitespace().enumerate() {
                let word = parse_hex(word_text).ok_or_else(malformed)?;
                if word > u64::from(u32::MAX) {
                    return Err(DumpParseError::ValueTooWide {
                        source_name: source_name.to_string(),
                        line,
                        value: word_text.to_string(),
                    });
                }
                let word = word as u32;
                if section.depth == 1 {
                    let base = start + 4 * n as u64;
                    for (b, byte) in word.to_le_bytes().iter().enumerate() {
                        let address = check_address(source_name, line, section, base + b as u64)?;
                        values.insert(address, u32::from(*byte));
                    }
                } else {
                    let address = check_address(source_name, line, section, start + n as u64)?;
                    values.insert(address, word);
                }
            }
        }
        debug!("{}: {} addresses of section {}", source_name, values.len(), section.name);

        Ok(RegisterSnapshot {
            source: source_name.to_string(),
            driver,
            section,
            capture_time,
            values,
        })
    }

    /// Raw value at a single address.
    pub fn get(&self, address: u32) -> Option<u32> {
        self.values.get(&address).copied()
    }

    pub fn values(&self) -> &BTreeMap<u32, u32> {
        &self.values
    }

    /// Value of `register`, assembled little-endian from the addresses it covers. Missing
    /// addresses read as zero; `None` when none of them was dumped.
    pub fn register_value(&self, register: &RegisterDefinition) -> Option<u32> {
        let shift = self.section.depth * 8;
        let mut present = false;
        let mut value = 0u32;
        for i in 0..register.length() {
            if let Some(part) = self.get(register.address() + i) {
                present = true;
                value |= part.checked_shl(shift * i).unwrap_or(0);
            }
        }
        if present {
            Some(value)
        } else {
            None
        }
    }
}

fn check_address(
    source_name: &str,
    line: usize,
    section: &'static RegisterSection,
    address: u64,
) -> Result<u32, DumpParseError> {
    if address <= u64::from(u32::MAX) && section.contains(address as u32) {
        Ok(address as u32)
    } else {
        Err(DumpParseError::AddressOutOfRange {
            source_name: source_name.to_string(),
            line,
            address,
            section: section.name,
        })
    }
}

/// Splits snapshots by section and orders every series by capture time. Snapshots with equal
/// capture times keep their input order.
pub fn group_by_section(
    snapshots: Vec<RegisterSnapshot>,
) -> BTreeMap<&'static str, Vec<RegisterSnapshot>> {
    let mut groups: BTreeMap<&'static str, Vec<RegisterSnapshot>> = BTreeMap::new();
    for snapshot in snapshots {
        groups.entry(snapshot.section.name).or_default().push(snapshot);
    }
    for series in groups.values_mut() {
        series.sort_by_key(|s| s.capture_time);
    }
    groups
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::register::{MAC, RF},
        assert_matches::assert_matches,
    };

    const MAC_DUMP: &str = "\
======= MAC REG (rtlwifi) =======
0x000: 0xBB1780AA 0x20010812 0x00207ca3 0x00000000

0x010: 0x000000ff
";

    fn parse(content: &str) -> Result<RegisterSnapshot, DumpParseError> {
        RegisterSnapshot::parse("dump.txt", content, Timestamp::from_secs(10))
    }

    #[test]
    fn parse_mac_dump() {
        let snapshot = parse(MAC_DUMP).expect("failed parsing MAC dump");
        assert_eq!(&MAC, snapshot.section);
        assert_eq!(Some("rtlwifi".to_string()), snapshot.driver);
        assert_eq!(Timestamp::from_secs(10), snapshot.capture_time);
        assert_eq!(20, snapshot.values().len());
        assert_eq!(Some(0xAA), snapshot.get(0x000));
        assert_eq!(Some(0x80), snapshot.get(0x001));
        assert_eq!(Some(0xBB), snapshot.get(0x003));
        assert_eq!(Some(0x12), snapshot.get(0x004));
        assert_eq!(Some(0xff), snapshot.get(0x010));
        assert_eq!(None, snapshot.get(0x014));
    }

    #[test]
    fn parse_rf_dump_with_line_prefix() {
        let content = "\
======= RF REG (debugfs) =======
RF REG (debugfs) 0x000: 0x00000000 0x00011111
RF REG (debugfs) 0x018: 0x00000c07
";
        let snapshot = parse(content).expect("failed parsing RF dump");
        assert_eq!(&RF, snapshot.section);
        assert_eq!(Some(0x11111), snapshot.get(0x01));
        assert_eq!(Some(0xc07), snapshot.get(0x18));
        assert_eq!(3, snapshot.values().len());
    }

    #[test]
    fn register_value_assembly() {
        let snapshot = parse(MAC_DUMP).expect("failed parsing MAC dump");
        let word = RegisterDefinition::Unknown { address: 0x000, length: 4, bit_width: 32 };
        assert_eq!(Some(0xBB1780AA), snapshot.register_value(&word));
        let half = RegisterDefinition::Unknown { address: 0x002, length: 2, bit_width: 16 };
        assert_eq!(Some(0xBB17), snapshot.register_value(&half));
        // Only 0x010 was dumped beyond 0x00f; the other bytes read as zero.
        let partial = RegisterDefinition::Unknown { address: 0x00f, length: 2, bit_width: 16 };
        assert_eq!(Some(0xff00), snapshot.register_value(&partial));
        let absent = RegisterDefinition::Unknown { address: 0x020, length: 4, bit_width: 32 };
        assert_eq!(None, snapshot.register_value(&absent));
    }

    #[test]
    fn empty_dump() {
        assert_matches!(parse(""), Err(DumpParseError::Empty { .. }));
        assert_matches!(parse("\n  \n"), Err(DumpParseError::Empty { .. }));
    }

    #[test]
    fn invalid_header() {
        assert_matches!(
            parse("0x000: 0x00000000\n"),
            Err(DumpParseError::InvalidHeader { line: 1, .. })
        );
    }

    #[test]
    fn unknown_section() {
        assert_matches!(
            parse("\n=== PHY REG (rtlwifi) ===\n"),
            Err(DumpParseError::UnknownSection { line: 2, ref section, .. }) if section == "PHY"
        );
    }

    #[test]
    fn malformed_lines() {
        for line in ["0x010 0x0", "0x010: 0xzz", "address: 0x0", "0x010: 12"].iter() {
            let content = format!("=== MAC REG (rtlwifi) ===\n{}\n", line);
            assert_matches!(
                parse(&content),
                Err(DumpParseError::MalformedLine { line: 2, .. }),
                "{}",
                line
            );
        }
    }

    #[test]
    fn value_too_wide() {
        assert_eq!(
            Err(DumpParseError::ValueTooWide {
                source_name: "dump.txt".to_string(),
                line: 3,
                value: "0x100000000".to_string(),
            }),
            parse("=== MAC REG (rtlwifi) ===\n0x000: 0x0\n0x004: 0x100000000\n")
        );
    }

    #[test]
    fn address_outside_of_section() {
        assert_matches!(
            parse("=== MAC REG (rtlwifi) ===\n0x7fc: 0x0 0x0\n"),
            Err(DumpParseError::AddressOutOfRange { line: 2, address: 0x800, section: "MAC", .. })
        );
        assert_matches!(
            parse("=== RF REG (rtlwifi) ===\n0x040: 0x0\n"),
            Err(DumpParseError::AddressOutOfRange { address: 0x40, section: "RF", .. })
        );
    }

    #[test]
    fn group_and_order_by_section() {
        let mac = |name: &str, secs| {
            RegisterSnapshot::parse(name, MAC_DUMP, Timestamp::from_secs(secs)).expect("MAC dump")
        };
        let rf = RegisterSnapshot::parse(
            "rf-0",
            "=== RF REG (x) ===\n0x0: 0x1\n",
            Timestamp::from_secs(1),
        )
        .expect("RF dump");
        let groups = group_by_section(vec![mac("mac-2", 20), mac("mac-1a", 10), rf, mac("mac-1b", 10)]);
        assert_eq!(vec!["MAC", "RF"], groups.keys().copied().collect::<Vec<_>>());
        let order: Vec<_> = groups["MAC"].iter().map(|s| s.source.as_str()).collect();
        assert_eq!(vec!["mac-1a", "mac-1b", "mac-2"], order);
    }
}
