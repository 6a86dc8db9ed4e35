use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Returned when a textual channel, field or stage name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Sales channels an offer can be published to.
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Galaxus,
}

impl Channel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Channel::Galaxus => "GALAXUS",
        }
    }

    /// Lowercase prefix used for export artifact file names.
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Channel::Galaxus => "galaxus",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GALAXUS" => Ok(Channel::Galaxus),
            _ => Err(UnknownName {
                kind: "channel",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Master-data fields a variant must carry before it may be published.
#[serde(rename_all = "camelCase")]
pub enum RequiredField {
    Gtin,
    WeightGrams,
    OriginCountry,
    Title,
}

impl RequiredField {
    /// All required fields, in the order they are checked and reported.
    pub const ALL: [RequiredField; 4] = [
        RequiredField::Gtin,
        RequiredField::WeightGrams,
        RequiredField::OriginCountry,
        RequiredField::Title,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            RequiredField::Gtin => "gtin",
            RequiredField::WeightGrams => "weightGrams",
            RequiredField::OriginCountry => "originCountry",
            RequiredField::Title => "title",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequiredField {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequiredField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "required field",
                value: s.to_string(),
            })
    }
}

/// The missing required fields of one variant. Never longer than
/// [`RequiredField::ALL`], so it stays inline.
pub type MissingFields = SmallVec<[RequiredField; 4]>;
