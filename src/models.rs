//! Warning feed data model.
//!
//! `Warning` is built from one feed entry and derives its start/end instants
//! once, at deserialization time. `WeatherInfo` is the whole document of a
//! single poll; category maps are ordered by key so that iteration (and
//! therefore dispatch order) is deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::helpers::millis_to_datetime;

/// One weather warning for a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Warning {
    /// Key of the category map the warning was read under. Zero until the
    /// warning has passed the location matcher.
    pub category_id: i64,
    pub location: String,
    pub start: DateTime<Utc>,
    /// `None` when the feed leaves the end open.
    pub end: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: i64,
    pub level: i32,
    pub state: String,
    pub state_short: String,
    pub event: String,
    pub headline: String,
    pub description: String,
    pub instruction: String,
    pub altitude_start: Option<i64>,
    pub altitude_end: Option<i64>,
}

// --- DWD JSON entry ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WarningRecord {
    region_name: String,
    start: i64,
    end: Option<i64>,
    #[serde(rename = "type")]
    kind: i64,
    level: i32,
    state: Option<String>,
    state_short: Option<String>,
    event: String,
    headline: Option<String>,
    description: Option<String>,
    instruction: Option<String>,
    altitude_start: Option<i64>,
    altitude_end: Option<i64>,
}

impl WarningRecord {
    fn into_warning(self) -> Result<Warning, String> {
        let start = millis_to_datetime(self.start)
            .ok_or_else(|| format!("start {} is out of range", self.start))?;
        let end = match self.end {
            Some(ms) => {
                Some(millis_to_datetime(ms).ok_or_else(|| format!("end {} is out of range", ms))?)
            }
            None => None,
        };

        Ok(Warning {
            category_id: 0,
            location: self.region_name,
            start,
            end,
            kind: self.kind,
            level: self.level,
            state: self.state.unwrap_or_default(),
            state_short: self.state_short.unwrap_or_default(),
            event: self.event,
            headline: self.headline.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            instruction: self.instruction.unwrap_or_default(),
            altitude_start: self.altitude_start,
            altitude_end: self.altitude_end,
        })
    }
}

impl<'de> Deserialize<'de> for Warning {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WarningRecord::deserialize(deserializer)?
            .into_warning()
            .map_err(serde::de::Error::custom)
    }
}

impl Warning {
    /// Key used by consumers to recognise the same warning across polls.
    pub fn unique_id(&self) -> String {
        format!("{}/{}", self.location, self.event)
    }

    /// The span the warning is issued for.
    pub fn period(&self) -> (DateTime<Utc>, Option<DateTime<Utc>>) {
        (self.start, self.end)
    }
}

/// Sort warnings by location, then by start instant.
pub fn sort_warnings(warnings: &mut [Warning]) {
    warnings.sort_by(|a, b| {
        a.location
            .cmp(&b.location)
            .then_with(|| a.start.cmp(&b.start))
    });
}

/// The full warning document published at one point in time.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherInfo {
    /// Publication time, epoch milliseconds.
    pub time: i64,
    pub warnings: BTreeMap<i64, Vec<Warning>>,
    #[serde(rename = "vorabInformation")]
    pub preliminary: BTreeMap<i64, Vec<Warning>>,
    #[serde(default)]
    pub copyright: String,
}

impl WeatherInfo {
    /// Publication time as a UTC instant (epoch if out of range).
    pub fn timestamp(&self) -> DateTime<Utc> {
        millis_to_datetime(self.time).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Number of active and preliminary warnings in the document.
    pub fn warning_count(&self) -> (usize, usize) {
        let count = |m: &BTreeMap<i64, Vec<Warning>>| m.values().map(Vec::len).sum();
        (count(&self.warnings), count(&self.preliminary))
    }
}
