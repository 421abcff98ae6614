// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Symbolic register maps, captured register dumps, and the differences between dumps.

mod diff;
mod dump;
mod map;

pub use {
    diff::{FieldChange, RegisterDiffEntry, RegisterDiffer, UNKNOWN_FIELD_NAME},
    dump::{group_by_section, RegisterSnapshot},
    map::{
        load_all_sections, MapOptions, RegisterMap, DEFAULT_HINTS, DEFAULT_IGNORED_FIELDS,
        DEFAULT_IGNORED_REGISTERS,
    },
};

use serde::Serialize;

/// An address space of the chip, as dumped by the driver's debugfs interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RegisterSection {
    pub name: &'static str,
    pub address_begin: u32,
    pub address_end: u32,
    /// Bytes behind every address.
    pub depth: u32,
    /// Most addresses a single register spans.
    pub max_length: u32,
    /// Prefix of the register names of this section in the register header.
    #[serde(skip)]
    pub header_prefix: &'static str,
}

pub const MAC: RegisterSection = RegisterSection {
    name: "MAC",
    address_begin: 0x0000,
    address_end: 0x0800,
    depth: 1,
    max_length: 4,
    header_prefix: "REG_",
};
pub const BB: RegisterSection = RegisterSection {
    name: "BB",
    address_begin: 0x0800,
    address_end: 0x1000,
    depth: 1,
    max_length: 4,
    header_prefix: "REG_",
};
pub const FW: RegisterSection = RegisterSection {
    name: "FW",
    address_begin: 0x1000,
    address_end: 0x5000,
    depth: 1,
    max_length: 4,
    header_prefix: "REG_",
};
pub const USB: RegisterSection = RegisterSection {
    name: "USB",
    address_begin: 0xfe17,
    address_end: 0xfe60,
    depth: 1,
    max_length: 4,
    header_prefix: "REG_",
};
pub const NORMAL: RegisterSection = RegisterSection {
    name: "NORMAL",
    address_begin: 0xfe60,
    address_end: 0xfee0,
    depth: 1,
    max_length: 4,
    header_prefix: "REG_",
};
pub const RF: RegisterSection = RegisterSection {
    name: "RF",
    address_begin: 0x00,
    address_end: 0x40,
    depth: 4,
    max_length: 1,
    header_prefix: "RF6052_REG_",
};

pub const SECTIONS: &[RegisterSection] = &[MAC, BB, FW, USB, NORMAL, RF];

impl RegisterSection {
    pub fn by_name(name: &str) -> Option<&'static RegisterSection> {
        SECTIONS.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, address: u32) -> bool {
        self.address_begin <= address && address < self.address_end
    }

    /// Whether a name from the register header denotes a register of this section.
    pub fn owns(&self, header_name: &str, address: u32) -> bool {
        header_name.starts_with(self.header_prefix) && self.contains(address)
    }
}

/// A contiguous range of bits within a register.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDefinition {
    pub name: String,
    pub bit_offset: u32,
    pub bit_width: u32,
}

impl FieldDefinition {
    pub fn mask(&self) -> u32 {
        ((((1u64 << self.bit_width) - 1) << self.bit_offset) & u64::from(u32::MAX)) as u32
    }

    pub fn extract(&self, value: u32) -> u32 {
        (value & self.mask()) >> self.bit_offset
    }
}

pub fn unknown_register_name(address: u32) -> String {
    format!("unknown-{:#06x}", address)
}

/// A register as resolved from a map. Addresses the map does not cover resolve to `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegisterDefinition {
    Known {
        address: u32,
        name: String,
        /// Number of addresses covered.
        length: u32,
        bit_width: u32,
        fields: Vec<FieldDefinition>,
        hint: Option<String>,
    },
    Unknown {
        address: u32,
        length: u32,
        bit_width: u32,
    },
}

impl RegisterDefinition {
    pub fn address(&self) -> u32 {
        match self {
            RegisterDefinition::Known { address, .. }
            | RegisterDefinition::Unknown { address, .. } => *address,
        }
    }

    pub fn length(&self) -> u32 {
        match self {
            RegisterDefinition::Known { length, .. }
            | RegisterDefinition::Unknown { length, .. } => *length,
        }
    }

    pub fn bit_width(&self) -> u32 {
        match self {
            RegisterDefinition::Known { bit_width, .. }
            | RegisterDefinition::Unknown { bit_width, .. } => *bit_width,
        }
    }

    pub fn name(&self) -> String {
        match self {
            RegisterDefinition::Known { name, .. } => name.clone(),
            RegisterDefinition::Unknown { address, .. } => unknown_register_name(*address),
        }
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        match self {
            RegisterDefinition::Known { fields, .. } => &fields[..],
            RegisterDefinition::Unknown { .. } => &[],
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            RegisterDefinition::Known { hint, .. } => hint.as_deref(),
            RegisterDefinition::Unknown { .. } => None,
        }
    }

    pub fn is_known(&self) -> bool {
        match self {
            RegisterDefinition::Known { .. } => true,
            RegisterDefinition::Unknown { .. } => false,
        }
    }

    pub fn covers(&self, address: u32) -> bool {
        let base = self.address();
        base <= address && address - base < self.length()
    }

    /// Mask of the bits not claimed by any field.
    pub fn unclaimed_mask(&self) -> u32 {
        let all = ((1u64 << self.bit_width()) - 1) as u32;
        self.fields().iter().fold(all, |mask, field| mask & !field.mask())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    #[test]
    fn unknown_name() {
        assert_eq!("unknown-0x1234", unknown_register_name(0x1234));
        assert_eq!("unknown-0x0012", unknown_register_name(0x12));
        let unknown = RegisterDefinition::Unknown { address: 0x1234, length: 4, bit_width: 32 };
        assert_eq!("unknown-0x1234", unknown.name());
        assert!(unknown.fields().is_empty());
        assert_eq!(u32::MAX, unknown.unclaimed_mask());
    }

    #[test_case(0, 1, 0x0000_0001)]
    #[test_case(4, 4, 0x0000_00f0)]
    #[test_case(0, 32, 0xffff_ffff)]
    #[test_case(28, 4, 0xf000_0000)]
    fn field_mask(bit_offset: u32, bit_width: u32, mask: u32) {
        let field = FieldDefinition { name: "F".to_string(), bit_offset, bit_width };
        assert_eq!(mask, field.mask());
    }

    #[test]
    fn field_extract() {
        let field = FieldDefinition { name: "F".to_string(), bit_offset: 4, bit_width: 3 };
        assert_eq!(0b101, field.extract(0b1101_0000));
    }

    #[test]
    fn unclaimed_mask_of_known_register() {
        let register = RegisterDefinition::Known {
            address: 0x40,
            name: "CR".to_string(),
            length: 2,
            bit_width: 16,
            fields: vec![FieldDefinition { name: "CR_EN".to_string(), bit_offset: 0, bit_width: 8 }],
            hint: None,
        };
        assert_eq!(0xff00, register.unclaimed_mask());
        assert!(register.covers(0x41));
        assert!(!register.covers(0x42));
        assert!(!register.covers(0x3f));
    }

    #[test]
    fn section_lookup() {
        assert_eq!(Some(&RF), RegisterSection::by_name("RF"));
        assert_eq!(None, RegisterSection::by_name("PHY"));
        assert!(MAC.owns("REG_CR", 0x100));
        assert!(!MAC.owns("REG_FPGA0_RF_MODE", 0x800));
        assert!(!MAC.owns("RF6052_REG_AC", 0x00));
        assert!(RF.owns("RF6052_REG_AC", 0x00));
    }
}
