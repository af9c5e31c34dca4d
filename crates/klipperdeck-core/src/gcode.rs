//! Command encoder.
//!
//! Turns a [`PrinterCommand`] into what the host understands: either a G-code
//! script for `/printer/gcode/script` or one of the dedicated endpoints.
//! Limits from the [`PrinterProfile`] are checked first; a rejected command
//! never reaches the transport.

use crate::ErrorKind;
use crate::profile::{Axis, PrinterProfile};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default bed mesh profile name.
pub const DEFAULT_MESH_PROFILE: &str = "default";

/// A semantic printer operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrinterCommand {
    /// Hotend target, °C. Zero turns the heater off.
    SetHotendTemperature { target: f64 },
    /// Bed target, °C. Zero turns the heater off.
    SetBedTemperature { target: f64 },
    /// Relative move; `feedrate` in mm/min.
    MoveAxis {
        axis: Axis,
        distance: f64,
        feedrate: Option<f64>,
    },
    /// Home the given axes, or all of them when empty.
    Home { axes: Vec<Axis> },
    /// Extrude (positive) or retract (negative), mm.
    Extrude { amount: f64, feedrate: Option<f64> },
    /// Part cooling fan, percent.
    SetFanSpeed { percent: f64 },
    StartPrint { filename: String },
    PausePrint,
    ResumePrint,
    CancelPrint,
    EmergencyStop,
    FirmwareRestart,
    BedMeshCalibrate,
    LoadBedMesh { profile: String },
    SaveBedMesh { profile: String },
    ProbeAccuracy,
    QueryProbe,
    PidTuneHotend { target: f64 },
    PidTuneBed { target: f64 },
    InputShaperCalibrate,
    SaveConfig,
    /// Priming sequence run before a print.
    StartSequence,
    /// Cool-down and present sequence run after a print.
    EndSequence,
    /// Raw G-code, sent as is.
    Raw { script: String },
}

impl fmt::Display for PrinterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrinterCommand::SetHotendTemperature { target } => {
                write!(f, "hotend temperature set to {target}°C")
            }
            PrinterCommand::SetBedTemperature { target } => {
                write!(f, "bed temperature set to {target}°C")
            }
            PrinterCommand::MoveAxis { axis, distance, .. } => {
                let sign = if *distance > 0.0 { "+" } else { "" };
                write!(f, "moved {axis} {sign}{distance}mm")
            }
            PrinterCommand::Home { axes } if axes.is_empty() => f.write_str("homed all axes"),
            PrinterCommand::Home { axes } => {
                let letters: String = axes.iter().map(Axis::letter).collect();
                write!(f, "homed {letters}")
            }
            PrinterCommand::Extrude { amount, .. } if *amount < 0.0 => {
                write!(f, "retracted {}mm of filament", amount.abs())
            }
            PrinterCommand::Extrude { amount, .. } => {
                write!(f, "extruded {amount}mm of filament")
            }
            PrinterCommand::SetFanSpeed { percent } => write!(f, "fan speed set to {percent}%"),
            PrinterCommand::StartPrint { filename } => write!(f, "started print: {filename}"),
            PrinterCommand::PausePrint => f.write_str("print paused"),
            PrinterCommand::ResumePrint => f.write_str("print resumed"),
            PrinterCommand::CancelPrint => f.write_str("print cancelled"),
            PrinterCommand::EmergencyStop => f.write_str("EMERGENCY STOP"),
            PrinterCommand::FirmwareRestart => f.write_str("firmware restarted"),
            PrinterCommand::BedMeshCalibrate => f.write_str("bed mesh calibration started"),
            PrinterCommand::LoadBedMesh { profile } => write!(f, "bed mesh '{profile}' loaded"),
            PrinterCommand::SaveBedMesh { profile } => write!(f, "bed mesh '{profile}' saved"),
            PrinterCommand::ProbeAccuracy => f.write_str("probe accuracy test started"),
            PrinterCommand::QueryProbe => f.write_str("probe queried"),
            PrinterCommand::PidTuneHotend { target } => {
                write!(f, "hotend PID calibration started at {target}°C")
            }
            PrinterCommand::PidTuneBed { target } => {
                write!(f, "bed PID calibration started at {target}°C")
            }
            PrinterCommand::InputShaperCalibrate => f.write_str("input shaper calibration started"),
            PrinterCommand::SaveConfig => f.write_str("configuration saved"),
            PrinterCommand::StartSequence => f.write_str("start sequence executed"),
            PrinterCommand::EndSequence => f.write_str("end sequence executed"),
            PrinterCommand::Raw { script } => write!(f, "> {script}"),
        }
    }
}

/// An encoded command, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// Body of `POST /printer/gcode/script`.
    Script(String),
    /// `POST /printer/print/start`.
    StartPrint { filename: String },
    /// `POST /printer/emergency_stop`.
    EmergencyStop,
    /// `POST /printer/firmware_restart`.
    FirmwareRestart,
}

/// A command rejected by the profile limits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("hotend temperature must be between {min}°C and {max}°C, got {requested}°C")]
    HotendOutOfRange { requested: f64, min: f64, max: f64 },
    #[error("minimum extrusion temperature is {min_extrude}°C, got {requested}°C")]
    BelowMinExtrude { requested: f64, min_extrude: f64 },
    #[error("bed temperature must be between {min}°C and {max}°C, got {requested}°C")]
    BedOutOfRange { requested: f64, min: f64, max: f64 },
    #[error("extrusion of {requested}mm exceeds the {max}mm extrude-only limit")]
    ExtrudeTooLong { requested: f64, max: f64 },
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("G-code script is empty")]
    EmptyScript,
    #[error("file name is empty")]
    EmptyFilename,
}

impl CommandError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Check a command against the profile without encoding it.
pub fn validate(profile: &PrinterProfile, command: &PrinterCommand) -> Result<(), CommandError> {
    encode(profile, command).map(|_| ())
}

/// Validate and encode one command.
pub fn encode(profile: &PrinterProfile, command: &PrinterCommand) -> Result<Encoded, CommandError> {
    let script = match command {
        PrinterCommand::SetHotendTemperature { target } => {
            let range = profile.hotend.range();
            if !range.contains(*target) {
                return Err(CommandError::HotendOutOfRange {
                    requested: *target,
                    min: range.min,
                    max: range.max,
                });
            }
            if *target > 0.0 && *target < profile.hotend.min_extrude_temp {
                return Err(CommandError::BelowMinExtrude {
                    requested: *target,
                    min_extrude: profile.hotend.min_extrude_temp,
                });
            }
            format!("M104 S{target}")
        }
        PrinterCommand::SetBedTemperature { target } => {
            if !profile.bed.contains(*target) {
                return Err(CommandError::BedOutOfRange {
                    requested: *target,
                    min: profile.bed.min,
                    max: profile.bed.max,
                });
            }
            format!("M140 S{target}")
        }
        PrinterCommand::MoveAxis {
            axis,
            distance,
            feedrate,
        } => {
            finite("distance", *distance)?;
            let feedrate = feedrate.unwrap_or_else(|| profile.default_feedrate(*axis));
            finite("feedrate", feedrate)?;
            format!("G91\nG1 {}{distance} F{feedrate}\nG90", axis.letter())
        }
        PrinterCommand::Home { axes } => home_script(axes),
        PrinterCommand::Extrude { amount, feedrate } => {
            finite("amount", *amount)?;
            let max = profile.extruder.max_extrude_only_distance;
            if amount.abs() > max {
                return Err(CommandError::ExtrudeTooLong {
                    requested: *amount,
                    max,
                });
            }
            let feedrate = feedrate.unwrap_or_else(|| profile.default_extrude_feedrate());
            finite("feedrate", feedrate)?;
            format!("M83\nG1 E{amount} F{feedrate}\nM82")
        }
        PrinterCommand::SetFanSpeed { percent } => {
            finite("fan speed", *percent)?;
            format!("M106 S{}", fan_value(*percent))
        }
        PrinterCommand::StartPrint { filename } => {
            if filename.trim().is_empty() {
                return Err(CommandError::EmptyFilename);
            }
            return Ok(Encoded::StartPrint {
                filename: filename.clone(),
            });
        }
        PrinterCommand::EmergencyStop => return Ok(Encoded::EmergencyStop),
        PrinterCommand::FirmwareRestart => return Ok(Encoded::FirmwareRestart),
        PrinterCommand::PausePrint => "PAUSE".to_string(),
        PrinterCommand::ResumePrint => "RESUME".to_string(),
        PrinterCommand::CancelPrint => "CANCEL_PRINT".to_string(),
        PrinterCommand::BedMeshCalibrate => "BED_MESH_CALIBRATE".to_string(),
        PrinterCommand::LoadBedMesh { profile } => {
            format!("BED_MESH_PROFILE LOAD={}", mesh_profile(profile))
        }
        PrinterCommand::SaveBedMesh { profile } => {
            format!("BED_MESH_PROFILE SAVE={}", mesh_profile(profile))
        }
        PrinterCommand::ProbeAccuracy => "PROBE_ACCURACY".to_string(),
        PrinterCommand::QueryProbe => "QUERY_PROBE".to_string(),
        PrinterCommand::PidTuneHotend { target } => {
            finite("PID target", *target)?;
            format!("PID_CALIBRATE HEATER=extruder TARGET={target}")
        }
        PrinterCommand::PidTuneBed { target } => {
            finite("PID target", *target)?;
            format!("PID_CALIBRATE HEATER=heater_bed TARGET={target}")
        }
        PrinterCommand::InputShaperCalibrate => "SHAPER_CALIBRATE".to_string(),
        PrinterCommand::SaveConfig => "SAVE_CONFIG".to_string(),
        PrinterCommand::StartSequence => start_sequence(profile),
        PrinterCommand::EndSequence => end_sequence(profile),
        PrinterCommand::Raw { script } => {
            if script.trim().is_empty() {
                return Err(CommandError::EmptyScript);
            }
            script.clone()
        }
    };

    Ok(Encoded::Script(script))
}

/// Map a fan percentage onto the 0-255 PWM range.
pub fn fan_value(percent: f64) -> u8 {
    (percent.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8
}

fn finite(what: &'static str, value: f64) -> Result<(), CommandError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CommandError::NotFinite(what))
    }
}

fn home_script(axes: &[Axis]) -> String {
    if axes.is_empty() {
        return "G28".to_string();
    }
    let mut script = String::from("G28");
    for axis in Axis::ALL.iter().filter(|a| axes.contains(a)) {
        script.push(' ');
        script.push(axis.letter());
    }
    script
}

fn mesh_profile(name: &str) -> &str {
    if name.trim().is_empty() {
        DEFAULT_MESH_PROFILE
    } else {
        name
    }
}

fn start_sequence(profile: &PrinterProfile) -> String {
    let z_feed = profile.default_feedrate(Axis::Z);
    [
        "G28".to_string(),
        format!("BED_MESH_PROFILE LOAD={DEFAULT_MESH_PROFILE}"),
        format!("G1 Z15.0 F{z_feed}"),
        "G92 E0".to_string(),
        "G1 X10.1 Y20 Z0.3 F3000.0".to_string(),
        "G1 X10.1 Y200.0 Z0.3 F1500.0 E15".to_string(),
        "G1 X10.4 Y200.0 Z0.3 F3000.0".to_string(),
        "G1 X10.4 Y20 Z0.3 F1500.0 E30".to_string(),
        "G92 E0".to_string(),
        "G1 Z2.0 F3000".to_string(),
    ]
    .join("\n")
}

fn end_sequence(profile: &PrinterProfile) -> String {
    let present_y = profile.axes.y.max - 20.0;
    [
        "G91".to_string(),
        "G1 E-2 F2700".to_string(),
        "G1 E-2 Z0.2 F2400".to_string(),
        "G1 X5 Y5 F3000".to_string(),
        "G1 Z10".to_string(),
        "G90".to_string(),
        format!("G1 X0 Y{present_y}"),
        "M106 S0".to_string(),
        "M104 S0".to_string(),
        "M140 S0".to_string(),
        "M84 X Y E".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(command: PrinterCommand) -> String {
        match encode(&PrinterProfile::default(), &command).unwrap() {
            Encoded::Script(s) => s,
            other => panic!("expected script, got {other:?}"),
        }
    }

    #[test]
    fn hotend_limits() {
        let profile = PrinterProfile::default();
        for target in [-1.0, 281.0, 1000.0, f64::NAN] {
            assert!(matches!(
                encode(&profile, &PrinterCommand::SetHotendTemperature { target }),
                Err(CommandError::HotendOutOfRange { .. })
            ));
        }
        for target in [1.0, 100.0, 169.9] {
            assert!(matches!(
                encode(&profile, &PrinterCommand::SetHotendTemperature { target }),
                Err(CommandError::BelowMinExtrude { .. })
            ));
        }
        assert_eq!(
            script(PrinterCommand::SetHotendTemperature { target: 0.0 }),
            "M104 S0"
        );
        assert_eq!(
            script(PrinterCommand::SetHotendTemperature { target: 210.0 }),
            "M104 S210"
        );
    }

    #[test]
    fn bed_limits() {
        let profile = PrinterProfile::default();
        assert!(matches!(
            encode(&profile, &PrinterCommand::SetBedTemperature { target: 121.0 }),
            Err(CommandError::BedOutOfRange { .. })
        ));
        assert_eq!(
            script(PrinterCommand::SetBedTemperature { target: 60.0 }),
            "M140 S60"
        );
    }

    #[test]
    fn moves_use_axis_feedrates() {
        assert_eq!(
            script(PrinterCommand::MoveAxis {
                axis: Axis::X,
                distance: 10.0,
                feedrate: None
            }),
            "G91\nG1 X10 F18000\nG90"
        );
        assert_eq!(
            script(PrinterCommand::MoveAxis {
                axis: Axis::Z,
                distance: -0.5,
                feedrate: None
            }),
            "G91\nG1 Z-0.5 F480\nG90"
        );
        assert_eq!(
            script(PrinterCommand::MoveAxis {
                axis: Axis::Y,
                distance: 1.0,
                feedrate: Some(600.0)
            }),
            "G91\nG1 Y1 F600\nG90"
        );
    }

    #[test]
    fn homing_scope() {
        assert_eq!(script(PrinterCommand::Home { axes: vec![] }), "G28");
        assert_eq!(
            script(PrinterCommand::Home {
                axes: vec![Axis::Y, Axis::X]
            }),
            "G28 X Y"
        );
    }

    #[test]
    fn extrusion_limits_and_modes() {
        let profile = PrinterProfile::default();
        assert!(matches!(
            encode(
                &profile,
                &PrinterCommand::Extrude {
                    amount: -250.0,
                    feedrate: None
                }
            ),
            Err(CommandError::ExtrudeTooLong { .. })
        ));
        assert_eq!(
            script(PrinterCommand::Extrude {
                amount: 5.0,
                feedrate: None
            }),
            "M83\nG1 E5 F4800\nM82"
        );
    }

    #[test]
    fn fan_mapping_is_linear() {
        assert_eq!(fan_value(0.0), 0);
        assert_eq!(fan_value(50.0), 128);
        assert_eq!(fan_value(100.0), 255);
        assert_eq!(fan_value(150.0), 255);
        assert_eq!(script(PrinterCommand::SetFanSpeed { percent: 100.0 }), "M106 S255");
    }

    #[test]
    fn dedicated_endpoints() {
        let profile = PrinterProfile::default();
        assert_eq!(
            encode(&profile, &PrinterCommand::EmergencyStop).unwrap(),
            Encoded::EmergencyStop
        );
        assert_eq!(
            encode(
                &profile,
                &PrinterCommand::StartPrint {
                    filename: "benchy.gcode".into()
                }
            )
            .unwrap(),
            Encoded::StartPrint {
                filename: "benchy.gcode".into()
            }
        );
        assert_eq!(
            encode(
                &profile,
                &PrinterCommand::StartPrint {
                    filename: " ".into()
                }
            ),
            Err(CommandError::EmptyFilename)
        );
    }

    #[test]
    fn macros() {
        assert_eq!(
            script(PrinterCommand::PidTuneBed { target: 60.0 }),
            "PID_CALIBRATE HEATER=heater_bed TARGET=60"
        );
        assert_eq!(
            script(PrinterCommand::LoadBedMesh {
                profile: String::new()
            }),
            "BED_MESH_PROFILE LOAD=default"
        );
        assert_eq!(script(PrinterCommand::CancelPrint), "CANCEL_PRINT");
    }

    #[test]
    fn sequences_follow_profile() {
        let start = script(PrinterCommand::StartSequence);
        assert!(start.starts_with("G28\n"));
        assert!(start.contains("G1 Z15.0 F480"));

        let end = script(PrinterCommand::EndSequence);
        assert!(end.contains("G1 X0 Y220"));
        assert!(end.ends_with("M84 X Y E"));
    }

    #[test]
    fn raw_rejects_empty() {
        let profile = PrinterProfile::default();
        assert_eq!(
            encode(
                &profile,
                &PrinterCommand::Raw {
                    script: "  ".into()
                }
            ),
            Err(CommandError::EmptyScript)
        );
    }

    #[test]
    fn display_reads_as_log_line() {
        let cmd = PrinterCommand::MoveAxis {
            axis: Axis::Z,
            distance: 5.0,
            feedrate: None,
        };
        assert_eq!(cmd.to_string(), "moved Z +5mm");
        assert_eq!(
            PrinterCommand::Extrude {
                amount: -3.0,
                feedrate: None
            }
            .to_string(),
            "retracted 3mm of filament"
        );
    }
}
