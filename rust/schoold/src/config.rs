//! Process and workspace configuration.
//!
//! Process settings come from the environment. Workspace settings live in the
//! `settings` table as one JSON object per section; saved values are merged
//! over the defaults so a partially written section still loads.

use crate::db;
use chrono::Weekday;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub const LOG_ENV: &str = "SCHOOLD_LOG";
pub const WORKSPACE_ENV: &str = "SCHOOLD_WORKSPACE";

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string()),
            workspace: std::env::var_os(WORKSPACE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Timetable,
    Marks,
    Attendance,
}

impl SetupSection {
    pub const ALL: [SetupSection; 3] = [Self::Timetable, Self::Marks, Self::Attendance];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timetable" => Some(Self::Timetable),
            "marks" => Some(Self::Marks),
            "attendance" => Some(Self::Attendance),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Timetable => "timetable",
            Self::Marks => "marks",
            Self::Attendance => "attendance",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Timetable => "setup.timetable",
            Self::Marks => "setup.marks",
            Self::Attendance => "setup.attendance",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Timetable => json!({
            "days": ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
            "periodsPerDay": 8
        }),
        SetupSection::Marks => json!({
            "passThresholdPercent": 35.0,
            "defaultTotalMarks": 100.0
        }),
        SetupSection::Attendance => json!({
            "countLateAsPresent": true
        }),
    }
}

/// Parses a weekday name (`"mon"`, `"Monday"`) into its short canonical form.
pub fn canonical_day(raw: &str) -> Option<String> {
    raw.trim().parse::<Weekday>().ok().map(|d| d.to_string())
}

fn parse_number_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_days(v: &Value) -> Result<Vec<String>, String> {
    let arr = v.as_array().ok_or_else(|| "days must be an array".to_string())?;
    if arr.is_empty() {
        return Err("days must not be empty".to_string());
    }
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for d in arr {
        let day = d
            .as_str()
            .and_then(canonical_day)
            .ok_or_else(|| format!("unknown day: {}", d))?;
        if out.contains(&day) {
            return Err(format!("duplicate day: {}", day));
        }
        out.push(day);
    }
    Ok(out)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Timetable => match k.as_str() {
                "days" => {
                    obj.insert(k.clone(), json!(parse_days(v)?));
                }
                "periodsPerDay" => {
                    let n = parse_number_range(v, k, 1.0, 16.0)?;
                    if n.fract() != 0.0 {
                        return Err(format!("{} must be an integer", k));
                    }
                    obj.insert(k.clone(), json!(n as u32));
                }
                _ => return Err(format!("unknown timetable field: {}", k)),
            },
            SetupSection::Marks => match k.as_str() {
                "passThresholdPercent" => {
                    obj.insert(k.clone(), json!(parse_number_range(v, k, 0.0, 100.0)?));
                }
                "defaultTotalMarks" => {
                    obj.insert(k.clone(), json!(parse_number_range(v, k, 1.0, 1000.0)?));
                }
                _ => return Err(format!("unknown marks field: {}", k)),
            },
            SetupSection::Attendance => match k.as_str() {
                "countLateAsPresent" => {
                    let b = v
                        .as_bool()
                        .ok_or_else(|| format!("{} must be boolean", k))?;
                    obj.insert(k.clone(), Value::Bool(b));
                }
                _ => return Err(format!("unknown attendance field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(e) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(section = section.name(), error = %e, "ignoring saved settings");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConfig {
    pub days: Vec<String>,
    pub periods_per_day: u32,
    pub pass_threshold_percent: f64,
    pub default_total_marks: f64,
    pub count_late_as_present: bool,
}

impl Default for SchoolConfig {
    fn default() -> Self {
        Self {
            days: ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            periods_per_day: 8,
            pass_threshold_percent: 35.0,
            default_total_marks: 100.0,
            count_late_as_present: true,
        }
    }
}

impl SchoolConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let timetable = load_section(conn, SetupSection::Timetable)?;
        let marks = load_section(conn, SetupSection::Marks)?;
        let attendance = load_section(conn, SetupSection::Attendance)?;
        let defaults = Self::default();
        Ok(Self {
            days: timetable["days"]
                .as_array()
                .map(|a| a.iter().filter_map(|d| d.as_str().map(String::from)).collect())
                .unwrap_or(defaults.days),
            periods_per_day: timetable["periodsPerDay"]
                .as_u64()
                .map(|n| n as u32)
                .unwrap_or(defaults.periods_per_day),
            pass_threshold_percent: marks["passThresholdPercent"]
                .as_f64()
                .unwrap_or(defaults.pass_threshold_percent),
            default_total_marks: marks["defaultTotalMarks"]
                .as_f64()
                .unwrap_or(defaults.default_total_marks),
            count_late_as_present: attendance["countLateAsPresent"]
                .as_bool()
                .unwrap_or(defaults.count_late_as_present),
        })
    }

    pub fn periods(&self) -> Vec<u32> {
        (1..=self.periods_per_day).collect()
    }
}
