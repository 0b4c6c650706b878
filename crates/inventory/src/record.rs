use core::str::FromStr;
use serde::{Deserialize, Serialize};

use shelfaudit_core::{DomainError, DomainResult, ValueObject, error::require_non_empty};

/// Per-item tag encoded in a barcode.
///
/// Always stored trimmed and upper-cased so catalog entries and scans compare
/// equal regardless of how the scanner reported case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = require_non_empty("identifier", raw)?;
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Identifier {}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Physical storage position. Rack and shelf are opaque labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub rack: String,
    pub shelf: String,
}

impl Location {
    /// Build a location from raw input, trimming both parts.
    pub fn parse(rack: &str, shelf: &str) -> DomainResult<Self> {
        Ok(Self {
            rack: require_non_empty("rack", rack)?,
            shelf: require_non_empty("shelf", shelf)?,
        })
    }
}

impl ValueObject for Location {}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Rack {}, Shelf {}", self.rack, self.shelf)
    }
}

/// Lifecycle status of a catalog item.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemStatus {
    #[default]
    Available,
    Issued,
    Lost,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Available => "Available",
            ItemStatus::Issued => "Issued",
            ItemStatus::Lost => "Lost",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Available" => Ok(ItemStatus::Available),
            "Issued" => Ok(ItemStatus::Issued),
            "Lost" => Ok(ItemStatus::Lost),
            other => Err(DomainError::validation(format!("unknown item status '{other}'"))),
        }
    }
}

/// Catalog record as seen by the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub identifier: Identifier,
    pub accession_number: String,
    pub title: String,
    pub author: String,
    pub location: Location,
    #[serde(default)]
    pub status: ItemStatus,
}

impl InventoryRecord {
    pub fn is_at(&self, location: &Location) -> bool {
        &self.location == location
    }
}
