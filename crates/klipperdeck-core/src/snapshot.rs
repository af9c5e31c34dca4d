//! Telemetry snapshot: an in-memory mirror of the host's subsystem state.

use crate::subsystems::{
    self, BedMesh, DisplayStatus, Fan, GcodeMove, Heater, IdleTimeout, InputShaper, PrintStats,
    Probe, TemperatureSensor, Toolhead,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute record of one subsystem.
pub type Record = serde_json::Map<String, Value>;

/// Subsystem key -> attribute record.
///
/// Keys exist only for subsystems the host (or simulator) reported. Unknown
/// keys are kept as opaque records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: BTreeMap<String, Record>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a status object as returned by a bulk query.
    pub fn from_status(status: &Record) -> Self {
        let mut snapshot = Self::new();
        snapshot.replace_all(status);
        snapshot
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn record(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Replace one subsystem's record wholesale.
    pub fn replace(&mut self, key: impl Into<String>, record: Record) {
        self.records.insert(key.into(), record);
    }

    /// Replace every subsystem named in `status`. Non-object values (such as
    /// `eventtime`) are skipped.
    pub fn replace_all(&mut self, status: &Record) {
        for (key, value) in status {
            if let Value::Object(record) = value {
                self.records.insert(key.clone(), record.clone());
            }
        }
    }

    /// Merge a push delta: for each subsystem, only the named fields are
    /// replaced and every other field is kept.
    pub fn merge(&mut self, delta: &Record) {
        for (key, value) in delta {
            if let Value::Object(fields) = value {
                let record = self.records.entry(key.clone()).or_default();
                for (field, v) in fields {
                    record.insert(field.clone(), v.clone());
                }
            }
        }
    }

    /// Set one field of an existing subsystem. Returns `false` and changes
    /// nothing when the subsystem is absent.
    pub fn set_field(&mut self, key: &str, field: &str, value: impl Into<Value>) -> bool {
        match self.records.get_mut(key) {
            Some(record) => {
                record.insert(field.to_string(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn field(&self, key: &str, field: &str) -> Option<&Value> {
        self.records.get(key)?.get(field)
    }

    pub fn field_f64(&self, key: &str, field: &str) -> Option<f64> {
        self.field(key, field)?.as_f64()
    }

    pub fn field_str(&self, key: &str, field: &str) -> Option<&str> {
        self.field(key, field)?.as_str()
    }

    /// Decode a subsystem record into a typed view.
    pub fn view<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let record = self.records.get(key)?;
        serde_json::from_value(Value::Object(record.clone())).ok()
    }

    pub fn toolhead(&self) -> Option<Toolhead> {
        self.view(subsystems::TOOLHEAD)
    }

    pub fn extruder(&self) -> Option<Heater> {
        self.view(subsystems::EXTRUDER)
    }

    pub fn heater_bed(&self) -> Option<Heater> {
        self.view(subsystems::HEATER_BED)
    }

    pub fn print_stats(&self) -> Option<PrintStats> {
        self.view(subsystems::PRINT_STATS)
    }

    pub fn display_status(&self) -> Option<DisplayStatus> {
        self.view(subsystems::DISPLAY_STATUS)
    }

    pub fn fan(&self) -> Option<Fan> {
        self.view(subsystems::FAN)
    }

    pub fn gcode_move(&self) -> Option<GcodeMove> {
        self.view(subsystems::GCODE_MOVE)
    }

    pub fn idle_timeout(&self) -> Option<IdleTimeout> {
        self.view(subsystems::IDLE_TIMEOUT)
    }

    pub fn probe(&self) -> Option<Probe> {
        self.view(subsystems::PROBE)
    }

    pub fn bed_mesh(&self) -> Option<BedMesh> {
        self.view(subsystems::BED_MESH)
    }

    pub fn input_shaper(&self) -> Option<InputShaper> {
        self.view(subsystems::INPUT_SHAPER)
    }

    /// A `temperature_sensor <name>` subsystem.
    pub fn temperature_sensor(&self, name: &str) -> Option<TemperatureSensor> {
        self.view(&format!("temperature_sensor {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut snapshot = Snapshot::from_status(&record(json!({
            "extruder": {"temperature": 25.0, "target": 210.0, "power": 0.0}
        })));

        snapshot.merge(&record(json!({"extruder": {"temperature": 205}})));

        let extruder = snapshot.extruder().unwrap();
        assert_eq!(extruder.temperature, Some(205.0));
        assert_eq!(extruder.target, Some(210.0));
        assert_eq!(extruder.power, Some(0.0));
    }

    #[test]
    fn merge_adds_new_subsystems() {
        let mut snapshot = Snapshot::new();
        snapshot.merge(&record(json!({"fan": {"speed": 0.5}})));
        assert_eq!(snapshot.fan().unwrap().speed, Some(0.5));
    }

    #[test]
    fn replace_all_skips_scalars() {
        let snapshot = Snapshot::from_status(&record(json!({
            "eventtime": 1234.5,
            "toolhead": {"homed_axes": "xyz"}
        })));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.toolhead().unwrap().homed_axes.as_deref(), Some("xyz"));
    }

    #[test]
    fn replace_drops_old_fields() {
        let mut snapshot = Snapshot::from_status(&record(json!({
            "heater_bed": {"temperature": 60.0, "target": 60.0}
        })));
        snapshot.replace("heater_bed", record(json!({"temperature": 30.0})));
        let bed = snapshot.heater_bed().unwrap();
        assert_eq!(bed.temperature, Some(30.0));
        assert_eq!(bed.target, None);
    }

    #[test]
    fn absent_subsystems_are_none() {
        let snapshot = Snapshot::new();
        assert!(snapshot.extruder().is_none());
        assert!(snapshot.field_f64("extruder", "temperature").is_none());
    }

    #[test]
    fn set_field_requires_existing_subsystem() {
        let mut snapshot = Snapshot::new();
        assert!(!snapshot.set_field("fan", "speed", 1.0));
        snapshot.replace("fan", Record::new());
        assert!(snapshot.set_field("fan", "speed", 1.0));
        assert_eq!(snapshot.field_f64("fan", "speed"), Some(1.0));
    }

    #[test]
    fn unknown_keys_pass_through() {
        let snapshot = Snapshot::from_status(&record(json!({
            "temperature_sensor chamber": {"temperature": 31.5},
            "exclude_object": {"objects": []}
        })));
        assert!(snapshot.contains("exclude_object"));
        assert_eq!(
            snapshot.temperature_sensor("chamber").unwrap().temperature,
            Some(31.5)
        );
    }
}
