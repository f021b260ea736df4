// Domain types - pure, no storage or network access
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ReportsConfig;
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentType {
    Flood,
    Landslide,
    Fire,
    PowerLine,
    Other,
}

/// How an incident type is drawn in lists and on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypePresentation {
    pub label: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

impl IncidentType {
    pub const ALL: [IncidentType; 5] = [
        Self::Flood,
        Self::Landslide,
        Self::Fire,
        Self::PowerLine,
        Self::Other,
    ];

    pub fn presentation(self) -> &'static TypePresentation {
        match self {
            Self::Flood => &TypePresentation {
                label: "Flood",
                icon: "water",
                color: "#1e88e5",
            },
            Self::Landslide => &TypePresentation {
                label: "Landslide",
                icon: "landslide",
                color: "#8d6e63",
            },
            Self::Fire => &TypePresentation {
                label: "Fire",
                icon: "local_fire_department",
                color: "#e53935",
            },
            Self::PowerLine => &TypePresentation {
                label: "Power Line",
                icon: "bolt",
                color: "#fdd835",
            },
            Self::Other => &TypePresentation {
                label: "Other",
                icon: "report",
                color: "#757575",
            },
        }
    }
}

impl fmt::Display for IncidentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.presentation().label)
    }
}

impl FromStr for IncidentType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "" => Err(AppError::MissingType),
            "flood" => Ok(Self::Flood),
            "landslide" => Ok(Self::Landslide),
            "fire" => Ok(Self::Fire),
            "powerline" => Ok(Self::PowerLine),
            "other" => Ok(Self::Other),
            _ => Err(AppError::InvalidInput(format!(
                "Unknown incident type: {}",
                s.trim()
            ))),
        }
    }
}

/// Severity on a 1..=5 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SeverityLevel {
    Low,
    Medium,
    Critical,
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Display bucket: 1-2 Low, 3 Medium, 4-5 Critical.
    pub fn level(self) -> SeverityLevel {
        match self.0 {
            1 | 2 => SeverityLevel::Low,
            3 => SeverityLevel::Medium,
            _ => SeverityLevel::Critical,
        }
    }

    /// e.g. "5 - Critical"
    pub fn label(self) -> String {
        format!("{} - {}", self.0, self.level())
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("severity must be 1-5, got {}", value))
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> u8 {
        severity.0
    }
}

/// Raw submission as it arrives from the form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportForm {
    #[serde(rename = "type")]
    pub incident_type: Option<String>,
    /// Forms post this as text (`"5"`); both spellings are accepted.
    #[serde(default, deserialize_with = "numeric_or_text")]
    pub severity: Option<i64>,
    pub notes: Option<String>,
    /// Photo, text-encoded (data URL or base64).
    pub image: Option<String>,
}

/// A form that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidReport {
    pub incident_type: IncidentType,
    pub severity: Severity,
    pub notes: Option<String>,
    pub image: Option<String>,
}

impl ReportForm {
    pub fn new(incident_type: &str, severity: i64) -> Self {
        Self {
            incident_type: Some(incident_type.to_string()),
            severity: Some(severity),
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    pub fn validate(&self, limits: &ReportsConfig) -> AppResult<ValidReport> {
        let incident_type: IncidentType = self
            .incident_type
            .as_deref()
            .ok_or(AppError::MissingType)?
            .parse()?;

        let severity = self
            .severity
            .and_then(|s| u8::try_from(s).ok())
            .and_then(Severity::new)
            .ok_or_else(|| AppError::InvalidInput("Severity must be between 1 and 5".into()))?;

        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        if let Some(ref notes) = notes {
            if notes.chars().count() > limits.max_notes_chars {
                return Err(AppError::InvalidInput(format!(
                    "Notes exceed {} characters",
                    limits.max_notes_chars
                )));
            }
        }

        let image = self.image.clone().filter(|i| !i.is_empty());
        if let Some(ref image) = image {
            if image.len() > limits.max_image_bytes {
                return Err(AppError::InvalidInput(format!(
                    "Image exceeds {} bytes",
                    limits.max_image_bytes
                )));
            }
        }

        Ok(ValidReport {
            incident_type,
            severity,
            notes,
            image,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Unparseable text reads as absent and fails validation like any bad severity.
fn numeric_or_text<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(
        match Option::<NumberOrText>::deserialize(deserializer)? {
            Some(NumberOrText::Number(n)) => Some(n),
            Some(NumberOrText::Text(text)) => text.trim().parse().ok(),
            None => None,
        },
    )
}
