//! Subsystem keys and typed views over snapshot records.
//!
//! Every view field is optional: a field the host did not report stays
//! `None` rather than reading as zero.

use serde::{Deserialize, Serialize};

pub const TOOLHEAD: &str = "toolhead";
pub const EXTRUDER: &str = "extruder";
pub const HEATER_BED: &str = "heater_bed";
pub const FAN: &str = "fan";
pub const EXTRUDER_FAN: &str = "heater_fan extruder_fan";
pub const CONTROLLER_FAN: &str = "controller_fan controller_fan";
pub const PRINT_STATS: &str = "print_stats";
pub const DISPLAY_STATUS: &str = "display_status";
pub const GCODE_MOVE: &str = "gcode_move";
pub const IDLE_TIMEOUT: &str = "idle_timeout";
pub const PROBE: &str = "probe";
pub const BED_MESH: &str = "bed_mesh";
pub const INPUT_SHAPER: &str = "input_shaper";
pub const HOST_SENSOR: &str = "temperature_sensor raspberry_pi";
pub const MCU_SENSOR: &str = "temperature_sensor mcu_temp";

/// Fields requested from the host, per subsystem.
///
/// Used both for the bulk query and the push subscription so the two sources
/// describe the same shape.
pub const SUBSCRIBED_FIELDS: &[(&str, &[&str])] = &[
    (TOOLHEAD, &["position", "homed_axes", "max_velocity", "max_accel"]),
    (EXTRUDER, &["temperature", "target", "power", "pressure_advance"]),
    (HEATER_BED, &["temperature", "target", "power"]),
    (
        PRINT_STATS,
        &[
            "state",
            "filename",
            "total_duration",
            "print_duration",
            "filament_used",
        ],
    ),
    (DISPLAY_STATUS, &["progress", "message"]),
    (FAN, &["speed"]),
    (EXTRUDER_FAN, &["speed"]),
    (CONTROLLER_FAN, &["speed"]),
    (
        GCODE_MOVE,
        &[
            "speed_factor",
            "extrude_factor",
            "absolute_coordinates",
            "absolute_extrude",
        ],
    ),
    (IDLE_TIMEOUT, &["state", "printing_time"]),
    (PROBE, &["last_query", "last_z_result"]),
    (BED_MESH, &["profile_name", "mesh_min", "mesh_max"]),
    (HOST_SENSOR, &["temperature"]),
    (MCU_SENSOR, &["temperature"]),
    (
        INPUT_SHAPER,
        &[
            "shaper_freq_x",
            "shaper_type_x",
            "shaper_freq_y",
            "shaper_type_y",
        ],
    ),
];

/// Subscription object for `printer.objects.subscribe`.
pub fn subscription_objects() -> serde_json::Value {
    let objects: serde_json::Map<String, serde_json::Value> = SUBSCRIBED_FIELDS
        .iter()
        .map(|(key, fields)| ((*key).to_string(), serde_json::json!(fields)))
        .collect();
    serde_json::Value::Object(objects)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolhead {
    /// `[x, y, z, e]`.
    pub position: Option<[f64; 4]>,
    pub homed_axes: Option<String>,
    pub max_velocity: Option<f64>,
    pub max_accel: Option<f64>,
}

/// Extruder or heated bed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heater {
    pub temperature: Option<f64>,
    pub target: Option<f64>,
    pub power: Option<f64>,
    pub pressure_advance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintStats {
    pub state: Option<String>,
    pub filename: Option<String>,
    pub total_duration: Option<f64>,
    pub print_duration: Option<f64>,
    pub filament_used: Option<f64>,
}

impl PrintStats {
    pub fn is_printing(&self) -> bool {
        self.state.as_deref() == Some("printing")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayStatus {
    pub progress: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fan {
    /// Fraction 0.0..=1.0.
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcodeMove {
    pub speed_factor: Option<f64>,
    pub extrude_factor: Option<f64>,
    pub absolute_coordinates: Option<bool>,
    pub absolute_extrude: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleTimeout {
    pub state: Option<String>,
    pub printing_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Probe {
    pub last_query: Option<bool>,
    pub last_z_result: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BedMesh {
    pub profile_name: Option<String>,
    pub mesh_min: Option<[f64; 2]>,
    pub mesh_max: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputShaper {
    pub shaper_freq_x: Option<f64>,
    pub shaper_type_x: Option<String>,
    pub shaper_freq_y: Option<f64>,
    pub shaper_type_y: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSensor {
    pub temperature: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_names_every_subsystem() {
        let objects = subscription_objects();
        let map = objects.as_object().unwrap();
        assert_eq!(map.len(), SUBSCRIBED_FIELDS.len());
        assert_eq!(map["extruder"][0], "temperature");
        assert!(map.contains_key("temperature_sensor mcu_temp"));
    }
}
