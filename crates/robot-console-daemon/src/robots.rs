//! Static robot/command table.
//!
//! Commands are opaque argument vectors; nothing here knows what a robot
//! does with them.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;
use crate::error::ConsoleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotCommand {
    pub label: String,
    pub command_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotConfig {
    pub id: String,
    pub name: String,
    pub image_key: String,
    pub validation_script: Vec<String>,
    pub commands: Vec<RobotCommand>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RobotSummary {
    pub id: String,
    pub name: String,
    pub image_key: String,
}

#[derive(Debug, Clone)]
pub struct RobotTable {
    robots: Vec<RobotConfig>,
}

impl RobotTable {
    pub fn new(robots: Vec<RobotConfig>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for robot in &robots {
            if robot.id.trim().is_empty() {
                return Err(ConfigError::Invalid("robot id must not be empty".into()));
            }
            if !seen.insert(robot.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate robot id '{}'",
                    robot.id
                )));
            }
            if robot.validation_script.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "robot '{}' has an empty validation script",
                    robot.id
                )));
            }
            if let Some(cmd) = robot.commands.iter().find(|c| c.command_args.is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "command '{}' of robot '{}' has no arguments",
                    cmd.label, robot.id
                )));
            }
        }
        Ok(Self { robots })
    }

    /// Load a JSON array of robot objects.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let robots: Vec<RobotConfig> =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(robots)
    }

    /// The stock fleet, with scripts resolved under `scripts_dir`.
    pub fn builtin(scripts_dir: &Path) -> Self {
        let script = |name: &str| scripts_dir.join(name).to_string_lossy().into_owned();
        let validate = script("validate_robot.sh");
        let run = script("run_command.sh");

        let robot = |id: &str, name: &str, commands: &[(&str, &str, &str)]| RobotConfig {
            id: id.to_string(),
            name: name.to_string(),
            image_key: id.to_string(),
            validation_script: vec![validate.clone(), name.to_string()],
            commands: commands
                .iter()
                .map(|(label, task, secs)| RobotCommand {
                    label: label.to_string(),
                    command_args: vec![run.clone(), task.to_string(), secs.to_string()],
                })
                .collect(),
        };

        Self {
            robots: vec![
                robot(
                    "zippy6",
                    "Zippy6",
                    &[
                        ("Home System", "Home_Zippy6", "3"),
                        ("Calibrate Axis", "Calibrate_Zippy6", "5"),
                        ("Log Data", "Log_Zippy6", "2"),
                    ],
                ),
                robot(
                    "zippy10",
                    "Zippy10",
                    &[
                        ("Quick Scan", "Scan_Zippy10", "4"),
                        ("Deep Clean", "Clean_Zippy10", "6"),
                    ],
                ),
                robot(
                    "zippy40",
                    "Zippy40",
                    &[
                        ("Heavy Lift", "Lift_Zippy40", "8"),
                        ("Safety Check", "Safety_Zippy40", "2"),
                        ("Diagnose", "Diag_Zippy40", "5"),
                    ],
                ),
                robot(
                    "zippyx",
                    "ZippyX",
                    &[
                        ("Expert Mode", "Expert_ZippyX", "10"),
                        ("Update Firmware", "Update_ZippyX", "15"),
                    ],
                ),
            ],
        }
    }

    pub fn robots(&self) -> &[RobotConfig] {
        &self.robots
    }

    pub fn summaries(&self) -> Vec<RobotSummary> {
        self.robots
            .iter()
            .map(|r| RobotSummary {
                id: r.id.clone(),
                name: r.name.clone(),
                image_key: r.image_key.clone(),
            })
            .collect()
    }

    pub fn get(&self, robot_id: &str) -> Result<&RobotConfig, ConsoleError> {
        self.robots
            .iter()
            .find(|r| r.id == robot_id)
            .ok_or_else(|| ConsoleError::robot_not_found(robot_id))
    }

    pub fn commands(&self, robot_id: &str) -> Result<&[RobotCommand], ConsoleError> {
        self.get(robot_id).map(|r| r.commands.as_slice())
    }

    /// Resolve a command by position. The index is signed because it comes
    /// straight off the wire.
    pub fn resolve(&self, robot_id: &str, index: i64) -> Result<&RobotCommand, ConsoleError> {
        let robot = self.get(robot_id)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| robot.commands.get(i))
            .ok_or_else(|| {
                ConsoleError::InvalidArgument(format!(
                    "Invalid command index {index} for robot '{robot_id}' ({} commands)",
                    robot.commands.len()
                ))
            })
    }
}
