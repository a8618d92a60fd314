//! Radio regulatory regions.
//!
//! The region exists in two encodings: the numeric enum in the radio
//! preferences, and a legacy textual tag like `"1.0-EU433"` carried in
//! the node info. The tag form is converted to the enum once at boot.

use serde::{Deserialize, Serialize};

/// Regulatory domain codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionCode {
    #[default]
    Unset,
    Us,
    Eu433,
    Eu865,
    Cn,
    Jp,
    Anz,
    Kr,
    Tw,
}

/// Static facts about one regulatory domain.
#[derive(Debug, Clone, Copy)]
pub struct RegionInfo {
    pub code: RegionCode,
    pub name: &'static str,
}

/// All known regions, in tag order.
pub static REGIONS: &[RegionInfo] = &[
    RegionInfo {
        code: RegionCode::Us,
        name: "US",
    },
    RegionInfo {
        code: RegionCode::Eu433,
        name: "EU433",
    },
    RegionInfo {
        code: RegionCode::Eu865,
        name: "EU865",
    },
    RegionInfo {
        code: RegionCode::Cn,
        name: "CN",
    },
    RegionInfo {
        code: RegionCode::Jp,
        name: "JP",
    },
    RegionInfo {
        code: RegionCode::Anz,
        name: "ANZ",
    },
    RegionInfo {
        code: RegionCode::Kr,
        name: "KR",
    },
    RegionInfo {
        code: RegionCode::Tw,
        name: "TW",
    },
];

/// Look a region up by its numeric code.
#[must_use]
pub fn region_for_code(code: RegionCode) -> Option<&'static RegionInfo> {
    REGIONS.iter().find(|r| r.code == code)
}

/// Look a region up by its textual name, e.g. `"EU433"`.
#[must_use]
pub fn region_for_name(name: &str) -> Option<&'static RegionInfo> {
    REGIONS.iter().find(|r| r.name == name)
}

/// Prefix of old-style region strings.
pub const LEGACY_REGION_PREFIX: &str = "1.0-";

/// Convert a legacy `"1.0-EU433"` style tag to its code.
#[must_use]
pub fn from_legacy_tag(tag: &str) -> Option<RegionCode> {
    tag.strip_prefix(LEGACY_REGION_PREFIX)
        .and_then(region_for_name)
        .map(|r| r.code)
}
