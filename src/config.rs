//! Planner configuration, read from JSON.

use crate::calendar::{WorkCalendar, WorkCalendarConfig};
use crate::capacity::CalendarCapacity;
use crate::effort::EffortDuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("work calendar requires at least one working day")]
    NoWorkingDays,
    #[error("invalid daily hours {hours} for {resource_id}")]
    InvalidHours { resource_id: String, hours: f64 },
}

/// Settings shared by every replan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub calendar: WorkCalendarConfig,
    /// Hours a resource works on a working day unless overridden.
    pub default_daily_hours: f64,
    /// Per-resource overrides of `default_daily_hours`.
    pub resource_daily_hours: BTreeMap<String, f64>,
    /// Consecutive days without any capacity after which end-date planning
    /// gives up with `NoCapacity`.
    pub max_idle_days: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            calendar: WorkCalendarConfig::default(),
            default_daily_hours: 8.0,
            resource_daily_hours: BTreeMap::new(),
            max_idle_days: 366,
        }
    }
}

impl PlannerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.calendar.working_days().is_empty() {
            return Err(ConfigError::NoWorkingDays);
        }
        Self::daily_effort("default", self.default_daily_hours)?;
        for (resource_id, hours) in &self.resource_daily_hours {
            Self::daily_effort(resource_id, *hours)?;
        }
        Ok(())
    }

    pub fn work_calendar(&self) -> Result<WorkCalendar, ConfigError> {
        WorkCalendar::from_config(&self.calendar)
    }

    /// Calendar-backed capacity provider described by this configuration.
    pub fn capacity(&self) -> Result<CalendarCapacity, ConfigError> {
        let default_daily = Self::daily_effort("default", self.default_daily_hours)?;
        let mut capacity = CalendarCapacity::new(self.work_calendar()?, default_daily);
        for (resource_id, hours) in &self.resource_daily_hours {
            capacity = capacity.with_resource(resource_id.clone(), Self::daily_effort(resource_id, *hours)?);
        }
        Ok(capacity)
    }

    fn daily_effort(resource_id: &str, hours: f64) -> Result<EffortDuration, ConfigError> {
        if hours > 24.0 {
            return Err(ConfigError::InvalidHours {
                resource_id: resource_id.to_string(),
                hours,
            });
        }
        EffortDuration::from_hours_f64(hours).ok_or_else(|| ConfigError::InvalidHours {
            resource_id: resource_id.to_string(),
            hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = PlannerConfig::from_json_str(r#"{ "max_idle_days": 30 }"#).unwrap();
        assert_eq!(config.max_idle_days, 30);
        assert_eq!(config.default_daily_hours, 8.0);
        assert_eq!(config.calendar.working_days().len(), 5);
    }

    #[test]
    fn rejects_calendar_without_working_days() {
        let json = r#"{ "calendar": { "working_days": [] } }"#;
        assert!(matches!(
            PlannerConfig::from_json_str(json),
            Err(ConfigError::NoWorkingDays)
        ));
    }

    #[test]
    fn rejects_impossible_daily_hours() {
        let json = r#"{ "resource_daily_hours": { "ana": 30.0 } }"#;
        assert!(matches!(
            PlannerConfig::from_json_str(json),
            Err(ConfigError::InvalidHours { .. })
        ));
    }
}
