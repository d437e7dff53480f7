//! Unit conversion utilities
//!
//! Meshes are always normalised to millimetres after load. STL files carry no
//! unit field, so the source unit comes from a vendor header hint or from an
//! explicit override by the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolishError;

/// Length unit of a source model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Millimetres (canonical)
    Millimeter,
    /// Centimetres
    Centimeter,
    /// Metres
    Meter,
    /// Inches
    Inch,
}

impl Default for LengthUnit {
    fn default() -> Self {
        Self::Millimeter
    }
}

impl LengthUnit {
    /// Multiplier that converts a value in this unit to millimetres.
    pub fn to_mm_factor(self) -> f64 {
        match self {
            Self::Millimeter => 1.0,
            Self::Centimeter => 10.0,
            Self::Meter => 1000.0,
            Self::Inch => 25.4,
        }
    }

    /// Short symbol used in headers and logs.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Millimeter => "mm",
            Self::Centimeter => "cm",
            Self::Meter => "m",
            Self::Inch => "in",
        }
    }
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for LengthUnit {
    type Err = PolishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mm" | "millimeter" | "millimeters" | "millimetre" | "millimetres" => {
                Ok(Self::Millimeter)
            }
            "cm" | "centimeter" | "centimeters" | "centimetre" | "centimetres" => {
                Ok(Self::Centimeter)
            }
            "m" | "meter" | "meters" | "metre" | "metres" => Ok(Self::Meter),
            "in" | "inch" | "inches" => Ok(Self::Inch),
            _ => Err(PolishError::invalid_parameter(
                "unit",
                format!("unknown length unit '{}'", s),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factors() {
        assert_eq!(LengthUnit::Millimeter.to_mm_factor(), 1.0);
        assert_eq!(LengthUnit::Centimeter.to_mm_factor(), 10.0);
        assert_eq!(LengthUnit::Meter.to_mm_factor(), 1000.0);
        assert_eq!(LengthUnit::Inch.to_mm_factor(), 25.4);
    }

    #[test]
    fn test_parse() {
        assert_eq!("IN".parse::<LengthUnit>().unwrap(), LengthUnit::Inch);
        assert_eq!("inch".parse::<LengthUnit>().unwrap(), LengthUnit::Inch);
        assert_eq!(" mm ".parse::<LengthUnit>().unwrap(), LengthUnit::Millimeter);
        assert_eq!("M".parse::<LengthUnit>().unwrap(), LengthUnit::Meter);
        assert_eq!("cm".parse::<LengthUnit>().unwrap(), LengthUnit::Centimeter);
        assert!("furlong".parse::<LengthUnit>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for unit in [
            LengthUnit::Millimeter,
            LengthUnit::Centimeter,
            LengthUnit::Meter,
            LengthUnit::Inch,
        ] {
            assert_eq!(unit.to_string().parse::<LengthUnit>().unwrap(), unit);
        }
    }
}
