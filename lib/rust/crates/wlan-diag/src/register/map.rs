// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    super::{FieldDefinition, RegisterDefinition, RegisterSection, SECTIONS},
    crate::error::MapParseError,
    lazy_static::lazy_static,
    log::{debug, info},
    regex::Regex,
    std::{
        cmp::{max, min},
        collections::{BTreeMap, BTreeSet},
    },
};

/// Registers of the RTL8188CUS header that alias another register or do not exist on it.
pub const DEFAULT_IGNORED_REGISTERS: &[&str] = &[
    "REG_HOST_SUSP_CNT",
    "REG_Q0_INFO",
    "REG_Q1_INFO",
    "REG_Q2_INFO",
    "REG_Q3_INFO",
    "REG_MACID_SLEEP_3_8732B",
    "REG_EARLY_MODE_CONTROL_8188E",
    "REG_MACID_SLEEP_2_8732B",
    "REG_MBSSID_BCN_SPACE",
    "REG_FPGA0_XAB_RF_SW_CTRL",
    "REG_FPGA0_XCD_RF_SW_CTRL",
    "REG_FPGA0_XAB_RF_PARM",
    "REG_FPGA0_XCD_RF_PARM",
    "REG_RX_DMA_CTRL_8723B",
];

/// Fields of the RTL8188CUS header that overlap a more detailed definition.
pub const DEFAULT_IGNORED_FIELDS: &[&str] = &[
    "SYS_CFG_SW_OFFLOAD_EN",
    "SYS_CFG_SPS_LDO_SEL",
    "SYS_CFG_TRP_BT_EN",
    "SYS_CFG_RTL_ID",
    "MODE_AG_CHANNEL_20MHZ",
    "HPON_FSM_BONDING_1T2R",
    "SYS_CFG_CHIP_VER",
    "WMAC_TRXPTCL_CTL_BW_MASK",
    "CCK0_AFE_RX_ANT_AB",
    "CCK0_AFE_RX_ANT_B",
    "MODE_AG_BW_20MHZ_8723B",
    "MODE_AG_BW_40MHZ_8723B",
    "MODE_AG_BW_80MHZ_8723B",
    "SYS_CFG_VENDOR_ID",
    "LEDCFG0_DPDT_SELECT",
];

/// Registers whose changes are expected, keyed by register name.
pub const DEFAULT_HINTS: &[(&str, &str)] = &[
    ("TSFTR", "Ignore (Timer)"),
    ("TSFTR1", "Ignore (Timer)"),
    ("INIT_TSFTR", "Ignore (Timer)"),
    ("TSFTR1_OVERFLOW", "Ignore (Timer)"),
    ("FPGA0_POWER_SAVE", "Bit 28 never set by 8192cu"),
    ("FPGA0_XB_HSSI_PARM1", "Ignore (RF B path)"),
    ("FPGA0_XB_HSSI_PARM2", "Ignore (RF B path)"),
    ("FPGA0_XB_LSSI_PARM", "Ignore (RF B path)"),
    ("HSPI_XB_READBACK", "Ignore (RF B path)"),
    ("FPGA0_XB_LSSI_READBACK", "Ignore (RF B path)"),
    ("FPGA0_XB_RF_SW_CTRL", "Ignore (RF B path)"),
    ("OFDM0_XB_RX_IQ_IMBALANCE", "Ignore (RF B path)"),
    ("OFDM0_XB_TX_IQ_IMBALANCE", "Ignore (RF B path)"),
    ("TX_AGC_B_RATE18_06", "Ignore (RF B path)"),
    ("TX_AGC_B_RATE54_24", "Ignore (RF B path)"),
    ("TX_AGC_B_CCK1_55_MCS32", "Ignore (RF B path)"),
    ("TX_AGC_B_MCS03_MCS00", "Ignore (RF B path)"),
    ("TX_AGC_B_MCS07_MCS04", "Ignore (RF B path)"),
    ("TX_AGC_B_MCS11_MCS08", "Ignore (RF B path)"),
    ("TX_AGC_B_MCS15_MCS12", "Ignore (RF B path)"),
    ("TX_AGC_B_CCK11_A_CCK2_11", "Ignore (RF B path)"),
    ("RETRY_LIMIT", "Adjusted by mac80211"),
    ("SPEC_SIFS", "Endian error in rtl8192cu?"),
    ("RXERR_RPT", "Ignore (not a control register)"),
    ("NAV_UPPER", "Setting to zero reduces performance"),
    ("RXFF_PTR", "8192cu: unstable"),
    ("MCUTST_2", "8192cu: unstable"),
    ("TDECTRL", "8192cu: unstable"),
    ("MULTI_BCNQ_OFFSET", "8192cu: unstable"),
    ("POWER_STATUS", "Toggles often"),
    ("CAM_DEBUG", "Toggles often"),
    ("RSV_CTRL", "8192cu: unstable (LEDCFG0)"),
    ("EFUSE_CTRL", "Ignore (efuse I/O)"),
    ("HMBOX_0", "Ignore (H2C)"),
    ("HMBOX_1", "Ignore (H2C)"),
    ("HMBOX_2", "Ignore (H2C)"),
    ("HMBOX_3", "Ignore (H2C)"),
    ("HMBOX_EXT_0", "Ignore (H2C)"),
    ("HMBOX_EXT_1", "Ignore (H2C)"),
    ("HMBOX_EXT_2", "Ignore (H2C)"),
    ("HMBOX_EXT_3", "Ignore (H2C)"),
];

lazy_static! {
    static ref REGISTER_RE: Regex =
        Regex::new(r"^#define (?P<name>(?:RF6052_)?REG_[A-Z_0-9]+)\s+(?P<address>0x[0-9a-fA-F]+)\b")
            .unwrap();
    static ref BIT_RE: Regex =
        Regex::new(r"^#define {2,}(?P<name>[A-Z_0-9]+)\s+BIT\((?P<bit>[0-9]+)\)").unwrap();
    static ref MASK_RE: Regex =
        Regex::new(r"^#define {2,}(?P<name>[A-Z_0-9]+)_MASK\s+(?P<mask>0x[0-9a-fA-F]+)\b")
            .unwrap();
    static ref BIT_LIST_RE: Regex = Regex::new(
        r"^#define {2,}(?P<name>[A-Z_0-9]+)\s+\((?P<bits>BIT\([0-9]+\)(?:\s*\|\s*BIT\([0-9]+\))+)\)"
    )
    .unwrap();
    static ref BIT_IN_LIST_RE: Regex = Regex::new(r"BIT\((?P<bit>[0-9]+)\)").unwrap();
}

/// Names to skip and hints to attach while loading a register map.
#[derive(Clone, Debug, PartialEq)]
pub struct MapOptions {
    /// Register names as written in the header, e.g. `REG_Q0_INFO`.
    pub ignored_registers: BTreeSet<String>,
    pub ignored_fields: BTreeSet<String>,
    /// Hints keyed by register name without the section prefix, e.g. `TSFTR`.
    pub hints: BTreeMap<String, String>,
}

impl Default for MapOptions {
    fn default() -> Self {
        MapOptions {
            ignored_registers: DEFAULT_IGNORED_REGISTERS.iter().map(|s| s.to_string()).collect(),
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|s| s.to_string()).collect(),
            hints: DEFAULT_HINTS.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

impl MapOptions {
    /// No ignore lists and no hints.
    pub fn empty() -> Self {
        MapOptions {
            ignored_registers: BTreeSet::new(),
            ignored_fields: BTreeSet::new(),
            hints: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct RegisterLine {
    line: usize,
    header_name: String,
    address: u32,
}

#[derive(Debug)]
struct FieldLine {
    line: usize,
    name: String,
    bit_offset: u32,
    bit_width: u32,
}

fn malformed(line: usize, name: &str, reason: String) -> MapParseError {
    MapParseError::MalformedField { line, name: name.to_string(), reason }
}

fn parse_bit(line: usize, name: &str, text: &str) -> Result<u32, MapParseError> {
    match text.parse::<u32>() {
        Ok(bit) if bit < 32 => Ok(bit),
        _ => Err(malformed(line, name, format!("bit {} outside of a 32-bit register", text))),
    }
}

fn field_from_mask(line: usize, name: &str, mask: u64) -> Result<FieldLine, MapParseError> {
    if mask == 0 || mask > u64::from(u32::MAX) {
        return Err(malformed(line, name, format!("mask {:#x} is not a 32-bit mask", mask)));
    }
    let bit_offset = mask.trailing_zeros();
    let shifted = mask >> bit_offset;
    if shifted & (shifted + 1) != 0 {
        return Err(malformed(line, name, format!("mask {:#x} is not contiguous", mask)));
    }
    Ok(FieldLine {
        line,
        name: name.to_string(),
        bit_offset,
        bit_width: 64 - shifted.leading_zeros(),
    })
}

fn parse_field_line(line: usize, text: &str) -> Result<Option<FieldLine>, MapParseError> {
    if let Some(caps) = BIT_LIST_RE.captures(text) {
        let name = &caps["name"];
        let mut mask = 0u64;
        for bit_caps in BIT_IN_LIST_RE.captures_iter(&caps["bits"]) {
            let bit = parse_bit(line, name, &bit_caps["bit"])?;
            if mask & (1 << bit) != 0 {
                return Err(malformed(line, name, format!("bit {} listed twice", bit)));
            }
            mask |= 1 << bit;
        }
        return field_from_mask(line, name, mask).map(Some);
    }
    if let Some(caps) = MASK_RE.captures(text) {
        let name = &caps["name"];
        let mask = u64::from_str_radix(&caps["mask"][2..], 16)
            .map_err(|e| malformed(line, name, e.to_string()))?;
        return field_from_mask(line, name, mask).map(Some);
    }
    if let Some(caps) = BIT_RE.captures(text) {
        let name = &caps["name"];
        let bit = parse_bit(line, name, &caps["bit"])?;
        return Ok(Some(FieldLine { line, name: name.to_string(), bit_offset: bit, bit_width: 1 }));
    }
    Ok(None)
}

fn parse_header(
    text: &str,
    options: &MapOptions,
) -> Result<(Vec<RegisterLine>, Vec<FieldLine>), MapParseError> {
    let mut registers = vec![];
    let mut fields = vec![];
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let text = raw.trim_end();
        if let Some(caps) = REGISTER_RE.captures(text) {
            let header_name = caps["name"].to_string();
            if options.ignored_registers.contains(&header_name) {
                debug!("line {}: ignoring register {}", line, header_name);
                continue;
            }
            let address = u32::from_str_radix(&caps["address"][2..], 16).map_err(|_| {
                MapParseError::InvalidAddress {
                    line,
                    name: header_name.clone(),
                    text: caps["address"].to_string(),
                }
            })?;
            registers.push(RegisterLine { line, header_name, address });
        } else if let Some(field) = parse_field_line(line, text)? {
            if options.ignored_fields.contains(&field.name) {
                debug!("line {}: ignoring field {}", line, field.name);
                continue;
            }
            fields.push(field);
        } else if text.starts_with("#define") {
            debug!("line {}: not a register or field definition: {}", line, text);
        }
    }
    Ok((registers, fields))
}

/// Immutable set of register definitions of one section, keyed by address.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterMap {
    section: &'static RegisterSection,
    registers: BTreeMap<u32, RegisterDefinition>,
}

impl RegisterMap {
    /// Loads the registers of `section` from a C register header in the style of
    /// `rtl8xxxu_regs.h`.
    pub fn from_header(
        text: &str,
        section: &'static RegisterSection,
        options: &MapOptions,
    ) -> Result<RegisterMap, MapParseError> {
        let (register_lines, field_lines) = parse_header(text, options)?;
        Self::build(section, register_lines, field_lines, options)
    }

    fn build(
        section: &'static RegisterSection,
        register_lines: Vec<RegisterLine>,
        field_lines: Vec<FieldLine>,
        options: &MapOptions,
    ) -> Result<RegisterMap, MapParseError> {
        let mut by_address: BTreeMap<u32, RegisterLine> = BTreeMap::new();
        for reg in register_lines {
            if !section.owns(&reg.header_name, reg.address) {
                continue;
            }
            if let Some(existing) = by_address.get(&reg.address) {
                return Err(MapParseError::DuplicateAddress {
                    line: reg.line,
                    address: reg.address,
                    name: reg.header_name,
                    existing: existing.header_name.clone(),
                });
            }
            by_address.insert(reg.address, reg);
        }

        let addresses: Vec<u32> = by_address.keys().copied().collect();
        let mut registers = BTreeMap::new();
        for (i, reg) in by_address.values().enumerate() {
            let length = match addresses.get(i + 1) {
                Some(next) => min(section.max_length, next - reg.address),
                None => section.max_length - reg.address % section.max_length,
            };
            let length = min(length, section.address_end - reg.address);
            let name = reg.header_name[section.header_prefix.len()..].to_string();
            let hint = options.hints.get(&name).cloned();
            registers.insert(
                reg.address,
                RegisterDefinition::Known {
                    address: reg.address,
                    name,
                    length,
                    bit_width: length * section.depth * 8,
                    fields: vec![],
                    hint,
                },
            );
        }

        let mut map = RegisterMap { section, registers };
        map.assign_fields(field_lines)?;
        info!("loaded {} registers of section {}", map.registers.len(), section.name);
        Ok(map)
    }

    /// Gives each field to the register whose name is the longest prefix of the field name.
    fn assign_fields(&mut self, field_lines: Vec<FieldLine>) -> Result<(), MapParseError> {
        let mut by_name_len: Vec<(String, u32)> =
            self.registers.values().map(|r| (r.name(), r.address())).collect();
        by_name_len.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        for field in field_lines {
            let address = match by_name_len.iter().find(|(name, _)| field.name.starts_with(name)) {
                Some((_, address)) => *address,
                None => {
                    debug!("line {}: field {} matches no {} register", field.line, field.name,
                        self.section.name);
                    continue;
                }
            };
            if let Some(RegisterDefinition::Known { name, bit_width, fields, .. }) =
                self.registers.get_mut(&address)
            {
                if field.bit_offset + field.bit_width > *bit_width {
                    return Err(MapParseError::FieldOutOfRange {
                        line: field.line,
                        field: field.name,
                        register: name.clone(),
                        bit_offset: field.bit_offset,
                        bit_width: field.bit_width,
                        register_bits: *bit_width,
                    });
                }
                let new = FieldDefinition {
                    name: field.name,
                    bit_offset: field.bit_offset,
                    bit_width: field.bit_width,
                };
                if let Some(existing) = fields.iter().find(|f| f.mask() & new.mask() != 0) {
                    return Err(MapParseError::OverlappingField {
                        line: field.line,
                        field: new.name,
                        existing: existing.name.clone(),
                        register: name.clone(),
                    });
                }
                let pos = fields.partition_point(|f| f.bit_offset < new.bit_offset);
                fields.insert(pos, new);
            }
        }
        Ok(())
    }

    pub fn section(&self) -> &'static RegisterSection {
        self.section
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// The known register starting at `address`.
    pub fn get(&self, address: u32) -> Option<&RegisterDefinition> {
        self.registers.get(&address)
    }

    pub fn by_name(&self, name: &str) -> Option<&RegisterDefinition> {
        self.registers.values().find(|r| r.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisterDefinition> {
        self.registers.values()
    }

    /// The register covering `address`. Addresses outside of every known register resolve to
    /// an unknown register spanning the surrounding aligned word, clipped so that it does not
    /// overlap a known register.
    pub fn resolve(&self, address: u32) -> RegisterDefinition {
        let mut previous_end = self.section.address_begin;
        if let Some((_, reg)) = self.registers.range(..=address).next_back() {
            if reg.covers(address) {
                return reg.clone();
            }
            previous_end = reg.address() + reg.length();
        }
        let aligned = address - address % self.section.max_length;
        let base = max(aligned, previous_end);
        let next_known = self
            .registers
            .range(address.saturating_add(1)..)
            .next()
            .map(|(a, _)| *a)
            .unwrap_or(u32::MAX);
        let end = min(min(aligned + self.section.max_length, next_known), self.section.address_end);
        let length = max(end, address.saturating_add(1)) - base;
        RegisterDefinition::Unknown {
            address: base,
            length,
            bit_width: length * self.section.depth * 8,
        }
    }
}

/// Loads one map per register section from the same header.
pub fn load_all_sections(
    text: &str,
    options: &MapOptions,
) -> Result<BTreeMap<&'static str, RegisterMap>, MapParseError> {
    let mut maps = BTreeMap::new();
    for section in SECTIONS {
        maps.insert(section.name, RegisterMap::from_header(text, section, options)?);
    }
    Ok(maps)
}
