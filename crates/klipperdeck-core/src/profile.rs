//! Device limits the encoder and simulator enforce.
//!
//! Defaults match an Anycubic Kobra Neo 2 running Klipper. Every field can be
//! overridden from configuration; missing fields keep the default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A motion axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// G-code letter for this axis.
    pub fn letter(&self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }

    /// Index into a `[x, y, z, e]` position vector.
    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Parse a run of axis letters such as `"xy"`.
    pub fn parse_many(s: &str) -> Result<Vec<Axis>, AxisParseError> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(|c| c.to_string().parse())
            .collect()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for Axis {
    type Err = AxisParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            _ => Err(AxisParseError(s.to_string())),
        }
    }
}

/// A profile whose limits cannot be enforced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("{field}: min {min} is above max {max}")]
    Inverted { field: String, min: f64, max: f64 },

    #[error("{field} must be a finite, non-negative number, got {value}")]
    Invalid { field: &'static str, value: f64 },
}

/// Error parsing an axis name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown axis: {0}")]
pub struct AxisParseError(String);

/// Inclusive temperature range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min: f64,
    pub max: f64,
}

impl TemperatureRange {
    pub fn contains(&self, t: f64) -> bool {
        (self.min..=self.max).contains(&t)
    }
}

/// Hotend limits, including the cold-extrusion guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HotendLimits {
    pub min: f64,
    pub max: f64,
    pub min_extrude_temp: f64,
}

impl HotendLimits {
    pub fn range(&self) -> TemperatureRange {
        TemperatureRange {
            min: self.min,
            max: self.max,
        }
    }
}

/// Travel limits of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravelRange {
    pub min: f64,
    pub max: f64,
}

impl TravelRange {
    /// Never panics; an inverted range pins to `max`.
    pub fn clamp(&self, position: f64) -> f64 {
        position.max(self.min).min(self.max)
    }
}

/// Travel limits for every axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub x: TravelRange,
    pub y: TravelRange,
    pub z: TravelRange,
}

impl AxisLimits {
    pub fn get(&self, axis: Axis) -> TravelRange {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Velocity limits, mm/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Speeds {
    pub max_velocity: f64,
    pub max_z_velocity: f64,
}

/// Extrude-only move limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtruderLimits {
    /// Largest single extrude-only move, mm.
    pub max_extrude_only_distance: f64,
    /// mm/s.
    pub max_extrude_only_velocity: f64,
}

/// Everything device-specific the encoder and simulator need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterProfile {
    pub name: String,
    pub hotend: HotendLimits,
    pub bed: TemperatureRange,
    pub axes: AxisLimits,
    pub speeds: Speeds,
    pub extruder: ExtruderLimits,
    /// X/Y the toolhead parks at after homing (safe_z_home).
    pub home_xy: [f64; 2],
}

impl PrinterProfile {
    /// Anycubic Kobra Neo 2 limits from its printer.cfg.
    pub fn kobra_neo2() -> Self {
        Self {
            name: "Anycubic Kobra Neo 2".to_string(),
            hotend: HotendLimits {
                min: 0.0,
                max: 280.0,
                min_extrude_temp: 170.0,
            },
            bed: TemperatureRange {
                min: 0.0,
                max: 120.0,
            },
            axes: AxisLimits {
                x: TravelRange {
                    min: -14.0,
                    max: 235.0,
                },
                y: TravelRange {
                    min: -3.0,
                    max: 240.0,
                },
                z: TravelRange {
                    min: -4.0,
                    max: 250.0,
                },
            },
            speeds: Speeds {
                max_velocity: 300.0,
                max_z_velocity: 8.0,
            },
            extruder: ExtruderLimits {
                max_extrude_only_distance: 200.0,
                max_extrude_only_velocity: 80.0,
            },
            home_xy: [110.0, 110.0],
        }
    }

    /// Check that every range is ordered and every limit usable.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let ranges = [
            ("hotend".to_string(), self.hotend.min, self.hotend.max),
            ("bed".to_string(), self.bed.min, self.bed.max),
        ]
        .into_iter()
        .chain(Axis::ALL.iter().map(|axis| {
            let range = self.axes.get(*axis);
            (format!("axes.{}", axis.letter().to_ascii_lowercase()), range.min, range.max)
        }));
        for (field, min, max) in ranges {
            if min.is_nan() || max.is_nan() || min > max {
                return Err(ProfileError::Inverted { field, min, max });
            }
        }

        for (field, value) in [
            ("hotend.min_extrude_temp", self.hotend.min_extrude_temp),
            ("speeds.max_velocity", self.speeds.max_velocity),
            ("speeds.max_z_velocity", self.speeds.max_z_velocity),
            ("extruder.max_extrude_only_distance", self.extruder.max_extrude_only_distance),
            ("extruder.max_extrude_only_velocity", self.extruder.max_extrude_only_velocity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProfileError::Invalid { field, value });
            }
        }
        Ok(())
    }

    /// Default feedrate for a relative move on `axis`, mm/min.
    pub fn default_feedrate(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Z => self.speeds.max_z_velocity * 60.0,
            Axis::X | Axis::Y => self.speeds.max_velocity * 60.0,
        }
    }

    /// Default extrude-only feedrate, mm/min.
    pub fn default_extrude_feedrate(&self) -> f64 {
        self.extruder.max_extrude_only_velocity * 60.0
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::kobra_neo2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_axes() {
        assert_eq!(Axis::parse_many("xy").unwrap(), vec![Axis::X, Axis::Y]);
        assert_eq!(Axis::parse_many("X, Z").unwrap(), vec![Axis::X, Axis::Z]);
        assert!(Axis::parse_many("xq").is_err());
    }

    #[test]
    fn feedrates_follow_axis() {
        let profile = PrinterProfile::default();
        assert_eq!(profile.default_feedrate(Axis::X), 18000.0);
        assert_eq!(profile.default_feedrate(Axis::Z), 480.0);
        assert_eq!(profile.default_extrude_feedrate(), 4800.0);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let profile: PrinterProfile =
            serde_json::from_str(r#"{"bed": {"min": 0.0, "max": 100.0}}"#).unwrap();
        assert_eq!(profile.bed.max, 100.0);
        assert_eq!(profile.hotend.max, 280.0);
        assert_eq!(profile.home_xy, [110.0, 110.0]);
    }

    #[test]
    fn inverted_axis_is_rejected() {
        assert_eq!(PrinterProfile::default().validate(), Ok(()));

        let mut profile = PrinterProfile::default();
        profile.axes.x = TravelRange {
            min: 235.0,
            max: -14.0,
        };
        assert_eq!(
            profile.validate(),
            Err(ProfileError::Inverted {
                field: "axes.x".to_string(),
                min: 235.0,
                max: -14.0,
            })
        );
        // Clamping an inverted range still does not panic.
        assert_eq!(profile.axes.x.clamp(100.0), -14.0);
    }

    #[test]
    fn negative_speed_is_rejected() {
        let mut profile = PrinterProfile::default();
        profile.speeds.max_z_velocity = -1.0;
        assert!(matches!(
            profile.validate(),
            Err(ProfileError::Invalid {
                field: "speeds.max_z_velocity",
                ..
            })
        ));
    }

    #[test]
    fn travel_clamps() {
        let limits = PrinterProfile::default().axes;
        assert_eq!(limits.get(Axis::X).clamp(500.0), 235.0);
        assert_eq!(limits.get(Axis::Z).clamp(-10.0), -4.0);
    }
}
