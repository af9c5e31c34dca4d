//! Offline printer simulation.
//!
//! The [`Simulator`] never owns the snapshot; the session hands it the one it
//! holds under its write lock, so a tick or a command is applied in one
//! critical section. Commands change setpoints immediately. The tick only
//! moves physical quantities (temperatures, progress) toward them.

use chrono::Utc;
use klipperdeck_core::subsystems::{
    BED_MESH, CONTROLLER_FAN, DISPLAY_STATUS, EXTRUDER, EXTRUDER_FAN, FAN, GCODE_MOVE, HEATER_BED,
    HOST_SENSOR, IDLE_TIMEOUT, INPUT_SHAPER, MCU_SENSOR, PRINT_STATS, PROBE, TOOLHEAD,
};
use klipperdeck_core::{Axis, FileRecord, PrinterCommand, PrinterProfile, Snapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use std::time::{Duration, Instant};

/// How often the physical model advances.
pub const TICK_INTERVAL: Duration = Duration::from_secs(3);

/// First-order heater model.
#[derive(Debug, Clone, Copy)]
struct HeaterModel {
    /// Fraction of the remaining gap closed per tick.
    approach: f64,
    /// Jitter amplitude while heating or holding.
    jitter: f64,
    /// Degrees lost per tick with the heater off.
    cooling: f64,
    cooling_jitter: f64,
    /// Ambient floor with the heater off.
    ambient: f64,
    min: f64,
    max: f64,
}

const HOTEND_MODEL: HeaterModel = HeaterModel {
    approach: 0.1,
    jitter: 1.0,
    cooling: 0.5,
    cooling_jitter: 0.5,
    ambient: 25.0,
    min: 20.0,
    max: 300.0,
};

const BED_MODEL: HeaterModel = HeaterModel {
    approach: 0.05,
    jitter: 0.5,
    cooling: 0.3,
    cooling_jitter: 0.25,
    ambient: 23.0,
    min: 20.0,
    max: 120.0,
};

/// Slow oscillation plus noise for a sensor no heater drives.
#[derive(Debug, Clone, Copy)]
struct SensorModel {
    base: f64,
    swing: f64,
    period_secs: f64,
    jitter: f64,
}

const HOST_SENSOR_MODEL: SensorModel = SensorModel {
    base: 45.0,
    swing: 3.0,
    period_secs: 60.0,
    jitter: 1.0,
};

const MCU_SENSOR_MODEL: SensorModel = SensorModel {
    base: 38.0,
    swing: 2.0,
    period_secs: 45.0,
    jitter: 0.5,
};

/// Largest progress step per tick. Progress is a fraction, as Moonraker
/// reports it, so 1.0 is a finished job.
const MAX_PROGRESS_STEP: f64 = 0.005;

pub struct Simulator {
    rng: StdRng,
    started: Instant,
    profile: PrinterProfile,
}

impl Simulator {
    pub fn new(profile: PrinterProfile) -> Self {
        Self::with_rng(profile, StdRng::from_entropy())
    }

    /// Reproducible jitter.
    pub fn seeded(profile: PrinterProfile, seed: u64) -> Self {
        Self::with_rng(profile, StdRng::seed_from_u64(seed))
    }

    fn with_rng(profile: PrinterProfile, rng: StdRng) -> Self {
        Self {
            rng,
            started: Instant::now(),
            profile,
        }
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    /// A cold, idle, homed printer.
    pub fn baseline_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new();
        let records = [
            (
                TOOLHEAD,
                json!({
                    "position": [120.5, 110.2, 15.8, 0.0],
                    "homed_axes": "xyz",
                    "max_velocity": 300.0,
                    "max_accel": 10000.0,
                }),
            ),
            (
                EXTRUDER,
                json!({"temperature": 25.3, "target": 0.0, "power": 0.0, "pressure_advance": 0.04}),
            ),
            (
                HEATER_BED,
                json!({"temperature": 23.8, "target": 0.0, "power": 0.0}),
            ),
            (
                PRINT_STATS,
                json!({
                    "state": "standby",
                    "filename": "",
                    "total_duration": 0.0,
                    "print_duration": 0.0,
                    "filament_used": 0.0,
                }),
            ),
            (
                DISPLAY_STATUS,
                json!({"progress": 0.0, "message": "Printer ready"}),
            ),
            (FAN, json!({"speed": 0.0})),
            (EXTRUDER_FAN, json!({"speed": 0.0})),
            (CONTROLLER_FAN, json!({"speed": 0.0})),
            (
                GCODE_MOVE,
                json!({
                    "speed_factor": 1.0,
                    "extrude_factor": 1.0,
                    "absolute_coordinates": true,
                    "absolute_extrude": true,
                }),
            ),
            (
                IDLE_TIMEOUT,
                json!({"state": "Idle", "printing_time": 0.0}),
            ),
            (
                PROBE,
                json!({"last_query": false, "last_z_result": 3.815}),
            ),
            (
                BED_MESH,
                json!({"profile_name": "default", "mesh_min": [14.0, 11.0], "mesh_max": [210.0, 215.0]}),
            ),
            (HOST_SENSOR, json!({"temperature": 45.2})),
            (MCU_SENSOR, json!({"temperature": 38.7})),
            (
                INPUT_SHAPER,
                json!({
                    "shaper_freq_x": 54.8,
                    "shaper_type_x": "ei",
                    "shaper_freq_y": 34.0,
                    "shaper_type_y": "mzv",
                }),
            ),
        ];
        for (key, value) in records {
            if let Value::Object(record) = value {
                snapshot.replace(key, record);
            }
        }
        snapshot
    }

    /// A few sample jobs, one to four days old.
    pub fn baseline_files() -> Vec<FileRecord> {
        const DAY: f64 = 86_400.0;
        let now = Utc::now().timestamp() as f64;
        [
            ("benchy.gcode", 2_456_789, 1.0, 3600.0),
            ("calibration_cube.gcode", 1_234_567, 2.0, 1800.0),
            ("test_print.gcode", 987_654, 3.0, 2400.0),
            ("temperature_tower.gcode", 3_456_789, 4.0, 4200.0),
        ]
        .into_iter()
        .map(|(filename, size, age_days, estimated)| FileRecord {
            filename: filename.to_string(),
            size,
            modified: now - age_days * DAY,
            estimated_time: Some(estimated),
        })
        .collect()
    }

    /// Advance the physical model by one interval.
    pub fn tick(&mut self, snapshot: &mut Snapshot) {
        self.advance_heater(snapshot, EXTRUDER, HOTEND_MODEL);
        self.advance_heater(snapshot, HEATER_BED, BED_MODEL);

        let elapsed = self.started.elapsed().as_secs_f64();
        self.advance_sensor(snapshot, HOST_SENSOR, HOST_SENSOR_MODEL, elapsed);
        self.advance_sensor(snapshot, MCU_SENSOR, MCU_SENSOR_MODEL, elapsed);

        self.advance_progress(snapshot);
    }

    fn jitter(&mut self, amplitude: f64) -> f64 {
        self.rng.gen_range(-amplitude..=amplitude)
    }

    fn advance_heater(&mut self, snapshot: &mut Snapshot, key: &str, model: HeaterModel) {
        let Some(current) = snapshot.field_f64(key, "temperature") else {
            return;
        };
        let target = snapshot.field_f64(key, "target").unwrap_or(0.0);

        let next = if target > 0.0 {
            let gap = target - current;
            if gap.abs() > 1.0 {
                current + gap * model.approach + self.jitter(model.jitter)
            } else {
                target + self.jitter(model.jitter)
            }
        } else {
            let cooled = current - model.cooling + self.jitter(model.cooling_jitter);
            cooled.max(model.ambient)
        };

        snapshot.set_field(key, "temperature", next.clamp(model.min, model.max));
    }

    fn advance_sensor(
        &mut self,
        snapshot: &mut Snapshot,
        key: &str,
        model: SensorModel,
        elapsed: f64,
    ) {
        let wave = (elapsed / model.period_secs).sin() * model.swing;
        let value = model.base + wave + self.jitter(model.jitter);
        snapshot.set_field(key, "temperature", value);
    }

    fn advance_progress(&mut self, snapshot: &mut Snapshot) {
        if !snapshot.print_stats().is_some_and(|stats| stats.is_printing()) {
            return;
        }
        let progress = snapshot
            .field_f64(DISPLAY_STATUS, "progress")
            .unwrap_or(0.0);
        if progress < 1.0 {
            let step = self.rng.gen_range(0.0..MAX_PROGRESS_STEP);
            snapshot.set_field(DISPLAY_STATUS, "progress", (progress + step).min(1.0));
        }
    }

    /// Mirror a command onto the snapshot. Commands without a visible effect
    /// (extrusion, calibration macros, raw G-code) leave it untouched.
    pub fn apply(&mut self, command: &PrinterCommand, snapshot: &mut Snapshot) {
        match command {
            PrinterCommand::SetHotendTemperature { target } => {
                snapshot.set_field(EXTRUDER, "target", *target);
            }
            PrinterCommand::SetBedTemperature { target } => {
                snapshot.set_field(HEATER_BED, "target", *target);
            }
            PrinterCommand::MoveAxis { axis, distance, .. } => {
                self.move_axis(snapshot, *axis, *distance);
            }
            PrinterCommand::Home { .. } | PrinterCommand::StartSequence => self.home(snapshot),
            PrinterCommand::SetFanSpeed { percent } => {
                snapshot.set_field(FAN, "speed", percent.clamp(0.0, 100.0) / 100.0);
            }
            PrinterCommand::StartPrint { filename } => {
                snapshot.set_field(PRINT_STATS, "state", "printing");
                snapshot.set_field(PRINT_STATS, "filename", filename.as_str());
                snapshot.set_field(DISPLAY_STATUS, "progress", 0.0);
            }
            PrinterCommand::PausePrint => {
                snapshot.set_field(PRINT_STATS, "state", "paused");
            }
            PrinterCommand::ResumePrint => {
                snapshot.set_field(PRINT_STATS, "state", "printing");
            }
            PrinterCommand::CancelPrint => {
                snapshot.set_field(PRINT_STATS, "state", "standby");
                snapshot.set_field(PRINT_STATS, "filename", "");
                snapshot.set_field(DISPLAY_STATUS, "progress", 0.0);
            }
            PrinterCommand::EmergencyStop => {
                snapshot.set_field(PRINT_STATS, "state", "error");
                snapshot.set_field(EXTRUDER, "target", 0.0);
                snapshot.set_field(HEATER_BED, "target", 0.0);
            }
            PrinterCommand::FirmwareRestart => {
                snapshot.set_field(PRINT_STATS, "state", "standby");
            }
            PrinterCommand::EndSequence => {
                snapshot.set_field(EXTRUDER, "target", 0.0);
                snapshot.set_field(HEATER_BED, "target", 0.0);
                snapshot.set_field(FAN, "speed", 0.0);
            }
            PrinterCommand::LoadBedMesh { profile } | PrinterCommand::SaveBedMesh { profile } => {
                let name = if profile.trim().is_empty() {
                    klipperdeck_core::gcode::DEFAULT_MESH_PROFILE
                } else {
                    profile.as_str()
                };
                snapshot.set_field(BED_MESH, "profile_name", name);
            }
            PrinterCommand::QueryProbe => {
                snapshot.set_field(PROBE, "last_query", false);
            }
            PrinterCommand::Extrude { .. }
            | PrinterCommand::BedMeshCalibrate
            | PrinterCommand::ProbeAccuracy
            | PrinterCommand::PidTuneHotend { .. }
            | PrinterCommand::PidTuneBed { .. }
            | PrinterCommand::InputShaperCalibrate
            | PrinterCommand::SaveConfig
            | PrinterCommand::Raw { .. } => {}
        }
    }

    fn move_axis(&self, snapshot: &mut Snapshot, axis: Axis, distance: f64) {
        let Some(mut position) = toolhead_position(snapshot) else {
            return;
        };
        let i = axis.index();
        position[i] = self.profile.axes.get(axis).clamp(position[i] + distance);
        snapshot.set_field(TOOLHEAD, "position", json!(position));
    }

    fn home(&self, snapshot: &mut Snapshot) {
        let [x, y] = self.profile.home_xy;
        snapshot.set_field(TOOLHEAD, "position", json!([x, y, 0.0, 0.0]));
        snapshot.set_field(TOOLHEAD, "homed_axes", "xyz");
    }

    /// A record for a file "uploaded" to the simulator.
    pub fn upload(&self, filename: &str, size: u64) -> FileRecord {
        FileRecord::synthesized(filename, size, Utc::now().timestamp() as f64)
    }
}

fn toolhead_position(snapshot: &Snapshot) -> Option<[f64; 4]> {
    snapshot.toolhead()?.position
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim() -> (Simulator, Snapshot) {
        (
            Simulator::seeded(PrinterProfile::default(), 7),
            Simulator::baseline_snapshot(),
        )
    }

    #[test]
    fn baseline_has_core_subsystems() {
        let snapshot = Simulator::baseline_snapshot();
        for key in [TOOLHEAD, EXTRUDER, HEATER_BED, PRINT_STATS, INPUT_SHAPER] {
            assert!(snapshot.contains(key), "missing {key}");
        }
        assert_eq!(snapshot.print_stats().unwrap().state.as_deref(), Some("standby"));
        assert_eq!(Simulator::baseline_files().len(), 4);
    }

    #[test]
    fn moves_clamp_to_travel_limits() {
        let (mut sim, mut snapshot) = sim();
        for _ in 0..5 {
            sim.apply(
                &PrinterCommand::MoveAxis {
                    axis: Axis::X,
                    distance: 100.0,
                    feedrate: None,
                },
                &mut snapshot,
            );
            let x = snapshot.toolhead().unwrap().position.unwrap()[0];
            assert!(x <= 235.0);
        }
        assert_eq!(snapshot.toolhead().unwrap().position.unwrap()[0], 235.0);

        for _ in 0..3 {
            sim.apply(
                &PrinterCommand::MoveAxis {
                    axis: Axis::Z,
                    distance: -50.0,
                    feedrate: None,
                },
                &mut snapshot,
            );
        }
        assert_eq!(snapshot.toolhead().unwrap().position.unwrap()[2], -4.0);
    }

    #[test]
    fn homing_resets_position_from_anywhere() {
        let (mut sim, mut snapshot) = sim();
        snapshot.set_field(TOOLHEAD, "homed_axes", "");
        sim.apply(
            &PrinterCommand::MoveAxis {
                axis: Axis::Y,
                distance: 77.0,
                feedrate: None,
            },
            &mut snapshot,
        );
        sim.apply(&PrinterCommand::Home { axes: vec![Axis::Z] }, &mut snapshot);

        let toolhead = snapshot.toolhead().unwrap();
        assert_eq!(toolhead.position, Some([110.0, 110.0, 0.0, 0.0]));
        assert_eq!(toolhead.homed_axes.as_deref(), Some("xyz"));
    }

    #[test]
    fn hotend_converges_and_stays_in_range() {
        let (mut sim, mut snapshot) = sim();
        sim.apply(
            &PrinterCommand::SetHotendTemperature { target: 210.0 },
            &mut snapshot,
        );
        for _ in 0..200 {
            sim.tick(&mut snapshot);
            let t = snapshot.extruder().unwrap().temperature.unwrap();
            assert!((20.0..=300.0).contains(&t));
        }
        let t = snapshot.extruder().unwrap().temperature.unwrap();
        assert!((t - 210.0).abs() <= 12.0, "temperature {t}");
        // The tick never touches the setpoint.
        assert_eq!(snapshot.extruder().unwrap().target, Some(210.0));
    }

    #[test]
    fn cooling_stops_at_ambient() {
        let (mut sim, mut snapshot) = sim();
        snapshot.set_field(HEATER_BED, "temperature", 60.0);
        for _ in 0..500 {
            sim.tick(&mut snapshot);
        }
        let t = snapshot.heater_bed().unwrap().temperature.unwrap();
        assert!((23.0..=23.5).contains(&t), "bed {t}");
    }

    #[test]
    fn progress_only_advances_while_printing() {
        let (mut sim, mut snapshot) = sim();
        sim.tick(&mut snapshot);
        assert_eq!(snapshot.display_status().unwrap().progress, Some(0.0));

        sim.apply(
            &PrinterCommand::StartPrint {
                filename: "benchy.gcode".into(),
            },
            &mut snapshot,
        );
        let mut last = 0.0;
        for _ in 0..1000 {
            sim.tick(&mut snapshot);
            let p = snapshot.display_status().unwrap().progress.unwrap();
            assert!(p >= last && p <= 1.0);
            last = p;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn lifecycle_and_emergency_stop() {
        let (mut sim, mut snapshot) = sim();
        sim.apply(
            &PrinterCommand::StartPrint {
                filename: "cube.gcode".into(),
            },
            &mut snapshot,
        );
        sim.apply(&PrinterCommand::PausePrint, &mut snapshot);
        assert_eq!(snapshot.field_str(PRINT_STATS, "state"), Some("paused"));

        sim.apply(&PrinterCommand::CancelPrint, &mut snapshot);
        assert_eq!(snapshot.field_str(PRINT_STATS, "state"), Some("standby"));
        assert_eq!(snapshot.field_str(PRINT_STATS, "filename"), Some(""));

        sim.apply(&PrinterCommand::EmergencyStop, &mut snapshot);
        assert_eq!(snapshot.field_str(PRINT_STATS, "state"), Some("error"));
        sim.apply(&PrinterCommand::FirmwareRestart, &mut snapshot);
        assert_eq!(snapshot.field_str(PRINT_STATS, "state"), Some("standby"));
    }

    #[test]
    fn fan_is_stored_as_fraction() {
        let (mut sim, mut snapshot) = sim();
        sim.apply(&PrinterCommand::SetFanSpeed { percent: 75.0 }, &mut snapshot);
        assert_eq!(snapshot.fan().unwrap().speed, Some(0.75));
    }

    #[test]
    fn upload_estimates_duration() {
        let (sim, _) = sim();
        let record = sim.upload("part.gcode", 54_321);
        assert_eq!(record.estimated_time, Some(54.0));
        assert_eq!(record.size, 54_321);
    }
}
