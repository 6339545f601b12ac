//! # NetCDF File Information Module
//!
//! Inspects a monthly input before it is split: dimensions, variables,
//! attributes and, most importantly, the time axis. When the month is known
//! the time axis is checked against the `days * 4` six-hourly timesteps the
//! splitter will ask for.

use crate::timestep::{HOURS_PER_STEP, YearMonth};
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Time dimension names tried when none is given, in order
pub const TIME_DIMENSION_CANDIDATES: [&str; 2] = ["valid_time", "time"];

/// Information about a NetCDF dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfDimensionInfo {
    pub name: String,
    pub length: usize,
    pub is_unlimited: bool,
}

/// Information about a NetCDF variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfVariableInfo {
    pub name: String,
    pub data_type: String,
    pub dimensions: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub shape: Vec<usize>,
}

/// The time axis of a monthly file and how it compares to the expected one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeAxisInfo {
    pub dimension: String,
    pub length: usize,
    /// `days_in_month * 4`, when the month is known
    pub expected: Option<usize>,
    pub units: Option<String>,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    /// Problems found while checking the axis; empty when consistent
    pub issues: Vec<String>,
}

impl TimeAxisInfo {
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Complete information about a NetCDF file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetCdfInfo {
    pub path: String,
    pub period: Option<String>,
    pub dimensions: Vec<NetCdfDimensionInfo>,
    pub variables: Vec<NetCdfVariableInfo>,
    pub global_attributes: BTreeMap<String, String>,
    pub file_size: Option<u64>,
    pub time_axis: Option<TimeAxisInfo>,
}

/// A parsed CF time unit such as `hours since 1900-01-01 00:00:00.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CfTimeUnits {
    pub seconds_per_unit: f64,
    pub reference: NaiveDateTime,
}

impl CfTimeUnits {
    /// Converts an offset in these units to a timestamp, rounded to the second.
    pub fn decode(&self, value: f64) -> Option<NaiveDateTime> {
        if !value.is_finite() {
            return None;
        }
        let seconds = (value * self.seconds_per_unit).round();
        if seconds.abs() > i64::MAX as f64 {
            return None;
        }
        self.reference
            .checked_add_signed(TimeDelta::try_seconds(seconds as i64)?)
    }
}

/// Parses CF-convention time units (`<unit> since <reference>`).
///
/// ```rust
/// use era5split::info::parse_cf_time_units;
///
/// let units = parse_cf_time_units("hours since 1900-01-01 00:00:00.0").unwrap();
/// assert_eq!(units.seconds_per_unit, 3600.0);
/// assert_eq!(units.decode(1_037_256.0).unwrap().to_string(), "2018-05-01 00:00:00");
/// ```
pub fn parse_cf_time_units(units: &str) -> Option<CfTimeUnits> {
    let (unit, reference) = units.trim().split_once(" since ")?;
    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "second" | "seconds" | "sec" | "secs" | "s" => 1.0,
        "minute" | "minutes" | "min" | "mins" => 60.0,
        "hour" | "hours" | "hr" | "hrs" | "h" => 3600.0,
        "day" | "days" | "d" => 86400.0,
        _ => return None,
    };
    Some(CfTimeUnits {
        seconds_per_unit,
        reference: parse_reference_time(reference)?,
    })
}

fn parse_reference_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let s = s
        .strip_suffix(" UTC")
        .or_else(|| s.strip_suffix('Z'))
        .unwrap_or(s)
        .replacen('T', " ", 1);

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Opens `path` and collects its structure.
///
/// `time_dimension` overrides the automatic choice among
/// [`TIME_DIMENSION_CANDIDATES`]. With a `period`, the time axis is checked
/// against the timesteps of that month.
pub fn inspect(path: &Path, time_dimension: Option<&str>, period: Option<YearMonth>) -> Result<NetCdfInfo> {
    debug!("Opening NetCDF file: {}", path.display());
    let file = netcdf::open(path)
        .with_context(|| format!("Failed to open NetCDF file: {}", path.display()))?;

    let file_size = std::fs::metadata(path).ok().map(|m| m.len());

    let dimensions: Vec<NetCdfDimensionInfo> = file
        .dimensions()
        .map(|dim| NetCdfDimensionInfo {
            name: dim.name().to_string(),
            length: dim.len(),
            is_unlimited: dim.is_unlimited(),
        })
        .collect();

    let mut variables = Vec::new();
    for var in file.variables() {
        let attributes = var
            .attributes()
            .filter_map(|attr| {
                let value = attr.value().ok()?;
                Some((attr.name().to_string(), format_attribute_value(&value)))
            })
            .collect();

        variables.push(NetCdfVariableInfo {
            name: var.name().to_string(),
            data_type: format!("{:?}", var.vartype()),
            dimensions: var.dimensions().iter().map(|d| d.name().to_string()).collect(),
            attributes,
            shape: var.dimensions().iter().map(|d| d.len()).collect(),
        });
    }

    let global_attributes = file
        .attributes()
        .filter_map(|attr| {
            let value = attr.value().ok()?;
            Some((attr.name().to_string(), format_attribute_value(&value)))
        })
        .collect();

    let time_name = match time_dimension {
        Some(name) => {
            if file.dimension(name).is_none() {
                return Err(anyhow!("Time dimension '{}' not found in {}", name, path.display()));
            }
            Some(name.to_string())
        }
        None => TIME_DIMENSION_CANDIDATES
            .iter()
            .find(|name| file.dimension(name).is_some())
            .map(|name| name.to_string()),
    };

    let time_axis = match time_name {
        Some(name) => Some(read_time_axis(&file, &name, period)?),
        None => {
            debug!("No time dimension found in {}", path.display());
            None
        }
    };

    file.close().context("Failed to close NetCDF file")?;

    Ok(NetCdfInfo {
        path: path.display().to_string(),
        period: period.map(|p| p.label()),
        dimensions,
        variables,
        global_attributes,
        file_size,
        time_axis,
    })
}

fn read_time_axis(file: &netcdf::File, name: &str, period: Option<YearMonth>) -> Result<TimeAxisInfo> {
    let length = file.dimension(name).map(|d| d.len()).unwrap_or(0);
    let expected = period.map(|p| p.total_timesteps());

    let mut axis = TimeAxisInfo {
        dimension: name.to_string(),
        length,
        expected,
        units: None,
        first: None,
        last: None,
        issues: Vec::new(),
    };

    if let Some(expected) = expected
        && expected != length
    {
        axis.issues.push(format!(
            "time dimension '{}' has {} steps, expected {}",
            name, length, expected
        ));
    }

    // the coordinate variable shares the dimension's name
    let Some(var) = file.variable(name) else {
        return Ok(axis);
    };
    axis.units = var
        .attribute("units")
        .and_then(|attr| attr.value().ok())
        .and_then(|value| match value {
            netcdf::AttributeValue::Str(s) => Some(s),
            _ => None,
        });

    let Some(units) = axis.units.as_deref().and_then(parse_cf_time_units) else {
        return Ok(axis);
    };
    if length == 0 {
        return Ok(axis);
    }

    let values: Vec<f64> = var
        .get_values(..)
        .with_context(|| format!("Failed to read time variable '{}'", name))?;
    let times: Vec<NaiveDateTime> = values.iter().filter_map(|v| units.decode(*v)).collect();
    if times.len() != values.len() {
        axis.issues.push("some time values could not be decoded".to_string());
    }
    axis.first = times.first().copied();
    axis.last = times.last().copied();

    let step = TimeDelta::hours(HOURS_PER_STEP as i64);
    if let Some(bad) = times.windows(2).position(|w| w[1] - w[0] != step) {
        axis.issues.push(format!(
            "time step {} is not {} hours after step {}",
            bad + 2,
            HOURS_PER_STEP,
            bad + 1
        ));
    }

    if let (Some(period), Some(first)) = (period, axis.first) {
        let month_start = NaiveDate::from_ymd_opt(period.year(), period.month(), 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0));
        if month_start != Some(first) {
            axis.issues.push(format!(
                "first time {} is not the start of {}",
                first,
                period.label()
            ));
        }
    }

    Ok(axis)
}

/// Format netcdf attribute value for display
fn format_attribute_value(value: &netcdf::AttributeValue) -> String {
    match value {
        netcdf::AttributeValue::Str(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

/// Print NetCDF info in human-readable format
pub fn print_file_info_human(info: &NetCdfInfo) {
    println!("NetCDF File Information:");
    println!("  Path: {}", info.path);
    if let Some(size) = info.file_size {
        println!("  File Size: {}", crate::output::format_megabytes(size));
    }
    println!("  Dimensions: {} total", info.dimensions.len());
    for dim in &info.dimensions {
        println!(
            "    {} ({}{})",
            dim.name,
            dim.length,
            if dim.is_unlimited { ", unlimited" } else { "" }
        );
    }
    println!("  Variables: {} total", info.variables.len());
    for var in &info.variables {
        println!(
            "    {} ({}) - dimensions: [{}]",
            var.name,
            var.data_type,
            var.dimensions.join(", ")
        );
        for (name, value) in &var.attributes {
            println!("      @{}: {}", name, value);
        }
    }
    if !info.global_attributes.is_empty() {
        println!("  Global Attributes:");
        for (name, value) in &info.global_attributes {
            println!("    @{}: {}", name, value);
        }
    }

    match &info.time_axis {
        Some(axis) => {
            println!("  Time Axis: {} ({} steps)", axis.dimension, axis.length);
            if let Some(expected) = axis.expected {
                println!("    Expected: {} steps", expected);
            }
            if let (Some(first), Some(last)) = (axis.first, axis.last) {
                println!("    Range: {} to {}", first, last);
            }
            if axis.is_consistent() {
                println!("    Status: OK");
            } else {
                for issue in &axis.issues {
                    println!("    Issue: {}", issue);
                }
            }
        }
        None => println!("  Time Axis: not found"),
    }
}

/// Print NetCDF info in JSON format
pub fn print_file_info_json(info: &NetCdfInfo) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(info)?);
    Ok(())
}

/// Print NetCDF info in YAML format
pub fn print_file_info_yaml(info: &NetCdfInfo) -> Result<()> {
    let yaml = serde_yaml::to_string(info).context("Failed to serialize NetCDF info to YAML")?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Writes a small ERA5-like file with a `valid_time` axis.
    fn write_monthly_file(path: &Path, hours: &[f64]) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("valid_time", hours.len()).unwrap();
        file.add_dimension("latitude", 2).unwrap();
        file.add_dimension("longitude", 3).unwrap();
        file.add_attribute("Conventions", "CF-1.7").unwrap();

        {
            let mut time = file.add_variable::<f64>("valid_time", &["valid_time"]).unwrap();
            time.put_attribute("units", "hours since 1900-01-01 00:00:00.0").unwrap();
            time.put_values(hours, ..).unwrap();
        }
        {
            let mut t = file
                .add_variable::<f32>("t", &["valid_time", "latitude", "longitude"])
                .unwrap();
            t.put_attribute("units", "K").unwrap();
            let data = vec![273.15f32; hours.len() * 6];
            t.put_values(&data, ..).unwrap();
        }
    }

    // 2018-02-01 00:00 in hours since 1900-01-01
    const FEB_2018_START: f64 = 1_035_120.0;

    fn february_hours(steps: usize) -> Vec<f64> {
        (0..steps).map(|i| FEB_2018_START + 6.0 * i as f64).collect()
    }

    #[test]
    fn test_parse_cf_time_units() {
        let units = parse_cf_time_units("hours since 1900-01-01 00:00:00.0").unwrap();
        assert_eq!(
            units.decode(FEB_2018_START).unwrap(),
            NaiveDate::from_ymd_opt(2018, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );

        let units = parse_cf_time_units("seconds since 1970-01-01").unwrap();
        assert_eq!(units.decode(86_400.0).unwrap().to_string(), "1970-01-02 00:00:00");

        let units = parse_cf_time_units("days since 2000-01-01T00:00:00Z").unwrap();
        assert_eq!(units.seconds_per_unit, 86400.0);

        assert!(parse_cf_time_units("fortnights since 1900-01-01").is_none());
        assert!(parse_cf_time_units("hours").is_none());
        assert!(parse_cf_time_units("hours since yesterday").is_none());
    }

    #[test]
    fn test_inspect_consistent_month() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("era5_201802.nc");
        write_monthly_file(&path, &february_hours(112));

        let period = YearMonth::new(2018, 2).unwrap();
        let info = inspect(&path, None, Some(period)).unwrap();

        assert_eq!(info.dimensions.len(), 3);
        assert!(info.variables.iter().any(|v| v.name == "t" && v.shape == vec![112, 2, 3]));
        assert_eq!(info.global_attributes.get("Conventions").map(String::as_str), Some("CF-1.7"));
        assert!(info.file_size.unwrap() > 0);

        let axis = info.time_axis.unwrap();
        assert_eq!(axis.dimension, "valid_time");
        assert_eq!(axis.length, 112);
        assert_eq!(axis.expected, Some(112));
        assert_eq!(axis.last.unwrap().to_string(), "2018-02-28 18:00:00");
        assert!(axis.is_consistent(), "{:?}", axis.issues);
    }

    #[test]
    fn test_inspect_reports_short_axis() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("era5_201802.nc");
        write_monthly_file(&path, &february_hours(100));

        let period = YearMonth::new(2018, 2).unwrap();
        let axis = inspect(&path, None, Some(period)).unwrap().time_axis.unwrap();
        assert!(!axis.is_consistent());
        assert!(axis.issues[0].contains("expected 112"));
    }

    #[test]
    fn test_inspect_reports_wrong_month_and_spacing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("era5_201802.nc");
        let mut hours = february_hours(8);
        hours[5] += 1.0;
        write_monthly_file(&path, &hours);

        // checked against March, the February start is wrong too
        let period = YearMonth::new(2018, 3).unwrap();
        let axis = inspect(&path, None, Some(period)).unwrap().time_axis.unwrap();
        assert!(axis.issues.iter().any(|i| i.contains("not 6 hours")));
        assert!(axis.issues.iter().any(|i| i.contains("not the start of 2018-03")));
    }

    #[test]
    fn test_inspect_explicit_time_dimension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("era5_201802.nc");
        write_monthly_file(&path, &february_hours(4));

        assert!(inspect(&path, Some("time"), None).is_err());
        let axis = inspect(&path, Some("valid_time"), None)
            .unwrap()
            .time_axis
            .unwrap();
        assert_eq!(axis.expected, None);
        assert!(axis.is_consistent());
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        assert!(inspect(&dir.path().join("missing.nc"), None, None).is_err());
    }
}
