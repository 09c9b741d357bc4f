//! Data models for soil samples, crop rankings and nutrient amounts

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Feature names in the order the classifier consumes them.
pub const FEATURE_NAMES: [&str; 9] = [
    "ph",
    "organic_matter",
    "cation_exchange_capacity",
    "calcium",
    "magnesium",
    "available_phosphate",
    "electrical_conductivity",
    "potassium",
    "drainage",
];

#[derive(Debug, Error, PartialEq)]
pub enum SampleError {
    #[error("unknown soil field '{0}'")]
    UnknownField(String),

    #[error("'{value}' is not a number for {field}")]
    NotANumber { field: String, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown drainage '{0}' (expected good, poor or moderate)")]
    UnknownDrainage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Drainage {
    Good,
    Poor,
    Moderate,
}

impl Drainage {
    pub fn as_str(self) -> &'static str {
        match self {
            Drainage::Good => "good",
            Drainage::Poor => "poor",
            Drainage::Moderate => "moderate",
        }
    }
}

impl FromStr for Drainage {
    type Err = SampleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Korean labels come from field survey sheets
        match s.trim().to_lowercase().as_str() {
            "good" | "양호" => Ok(Drainage::Good),
            "poor" | "불량" => Ok(Drainage::Poor),
            "moderate" | "보통" => Ok(Drainage::Moderate),
            _ => Err(SampleError::UnknownDrainage(s.to_string())),
        }
    }
}

impl fmt::Display for Drainage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One soil analysis, as entered on the form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilSample {
    pub ph: f64,
    pub organic_matter: f64,          // g/kg
    pub cation_exchange_capacity: f64, // cmol+/kg
    pub calcium: f64,
    pub magnesium: f64,
    pub available_phosphate: f64, // mg/kg
    pub electrical_conductivity: f64, // dS/m
    pub potassium: f64,
    pub drainage: Drainage,
}

impl Default for SoilSample {
    fn default() -> Self {
        Self {
            ph: 6.5,
            organic_matter: 20.0,
            cation_exchange_capacity: 0.5,
            calcium: 6.0,
            magnesium: 2.0,
            available_phosphate: 50.0,
            electrical_conductivity: 0.8,
            potassium: 0.3,
            drainage: Drainage::Good,
        }
    }
}

/// Canonical field name plus the aliases accepted on the form
const FIELD_ALIASES: [(&str, &[&str]); 9] = [
    ("ph", &["ph"]),
    ("organic_matter", &["organic_matter", "organic-matter", "om"]),
    (
        "cation_exchange_capacity",
        &["cation_exchange_capacity", "cation-exchange-capacity", "cec"],
    ),
    ("calcium", &["calcium", "ca"]),
    ("magnesium", &["magnesium", "mg"]),
    (
        "available_phosphate",
        &["available_phosphate", "available-phosphate", "p"],
    ),
    (
        "electrical_conductivity",
        &["electrical_conductivity", "electrical-conductivity", "ec"],
    ),
    ("potassium", &["potassium", "k"]),
    ("drainage", &["drainage"]),
];

fn canonical_field(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();
    FIELD_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.contains(&name.as_str()))
        .map(|(canonical, _)| *canonical)
}

/// Parse and range-check one numeric measurement.
///
/// pH must lie on the 0-14 scale; every other measurement must be a
/// finite, non-negative number.
pub fn parse_measurement(field: &str, raw: &str) -> Result<f64, SampleError> {
    let value: f64 = raw.trim().parse().map_err(|_| SampleError::NotANumber {
        field: field.to_string(),
        value: raw.to_string(),
    })?;
    check_range(field, value)?;
    Ok(value)
}

fn check_range(field: &str, value: f64) -> Result<(), SampleError> {
    let (min, max) = if field == "ph" {
        (0.0, 14.0)
    } else {
        (0.0, f64::MAX)
    };
    if !value.is_finite() || value < min || value > max {
        return Err(SampleError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

impl SoilSample {
    /// Numeric features in classifier order (drainage excluded)
    pub fn numeric_features(&self) -> [f64; 8] {
        [
            self.ph,
            self.organic_matter,
            self.cation_exchange_capacity,
            self.calcium,
            self.magnesium,
            self.available_phosphate,
            self.electrical_conductivity,
            self.potassium,
        ]
    }

    /// Set a single field by name, as typed into the form
    pub fn set_field(&mut self, name: &str, raw: &str) -> Result<(), SampleError> {
        let field =
            canonical_field(name).ok_or_else(|| SampleError::UnknownField(name.to_string()))?;

        if field == "drainage" {
            self.drainage = raw.parse()?;
            return Ok(());
        }

        let value = parse_measurement(field, raw)?;
        match field {
            "ph" => self.ph = value,
            "organic_matter" => self.organic_matter = value,
            "cation_exchange_capacity" => self.cation_exchange_capacity = value,
            "calcium" => self.calcium = value,
            "magnesium" => self.magnesium = value,
            "available_phosphate" => self.available_phosphate = value,
            "electrical_conductivity" => self.electrical_conductivity = value,
            "potassium" => self.potassium = value,
            _ => return Err(SampleError::UnknownField(name.to_string())),
        }
        Ok(())
    }

    /// Check every numeric field against the basic ranges
    pub fn validate(&self) -> Result<(), SampleError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.numeric_features()) {
            check_range(name, value)?;
        }
        Ok(())
    }
}

impl fmt::Display for SoilSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  pH:                        {}", self.ph)?;
        writeln!(f, "  Organic matter:            {}", self.organic_matter)?;
        writeln!(f, "  Cation exchange capacity:  {}", self.cation_exchange_capacity)?;
        writeln!(f, "  Ca:                        {}", self.calcium)?;
        writeln!(f, "  Mg:                        {}", self.magnesium)?;
        writeln!(f, "  Available phosphate:       {}", self.available_phosphate)?;
        writeln!(f, "  Electrical conductivity:   {}", self.electrical_conductivity)?;
        writeln!(f, "  K:                         {}", self.potassium)?;
        write!(f, "  Drainage:                  {}", self.drainage)
    }
}

/// A crop label with its predicted probability
#[derive(Debug, Clone, PartialEq)]
pub struct CropProbability {
    pub crop: String,
    pub probability: f64,
}

/// Nitrogen, phosphate (P₂O₅) and potash (K₂O) amounts in kg/10a
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NutrientAmounts {
    pub nitrogen: f64,
    pub phosphate: f64,
    pub potash: f64,
}

/// Standard prescription for a crop, with the estimated soil levels and
/// the resulting top-up
#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    pub crop: String,
    pub standard: NutrientAmounts,
    pub current: NutrientAmounts,
    pub top_up: NutrientAmounts,
}
