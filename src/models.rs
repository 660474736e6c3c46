//! Closed vocabularies shared by the repository, services and HTTP layer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WelltickError;

/// Kind of health record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordCategory {
    Medication,
    Condition,
    Allergy,
    Procedure,
    Note,
}

impl RecordCategory {
    pub const ALL: [RecordCategory; 5] = [
        Self::Medication,
        Self::Condition,
        Self::Allergy,
        Self::Procedure,
        Self::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medication => "medication",
            Self::Condition => "condition",
            Self::Allergy => "allergy",
            Self::Procedure => "procedure",
            Self::Note => "note",
        }
    }
}

impl FromStr for RecordCategory {
    type Err = WelltickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WelltickError::InvalidInput(format!("Invalid record category: {}", s)))
    }
}

impl fmt::Display for RecordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of wellness measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    Mood,
    Pain,
    Energy,
    Sleep,
    Steps,
    HeartRate,
}

impl MetricCategory {
    pub const ALL: [MetricCategory; 6] = [
        Self::Mood,
        Self::Pain,
        Self::Energy,
        Self::Sleep,
        Self::Steps,
        Self::HeartRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mood => "mood",
            Self::Pain => "pain",
            Self::Energy => "energy",
            Self::Sleep => "sleep",
            Self::Steps => "steps",
            Self::HeartRate => "heart_rate",
        }
    }
}

impl FromStr for MetricCategory {
    type Err = WelltickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WelltickError::InvalidInput(format!("Invalid metric category: {}", s)))
    }
}

impl fmt::Display for MetricCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may see a record's payload at rest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Payload sealed and kept in the content store
    #[default]
    Private,
    /// Payload stored inline in the record row
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

impl FromStr for Visibility {
    type Err = WelltickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(WelltickError::InvalidInput(format!("Invalid visibility: {}", other))),
        }
    }
}
