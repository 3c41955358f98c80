//! Output formatting for thermostat snapshots.

use std::fmt::{Display, Write as _};

use anyhow::Result;
use eco_core::{PropertySnapshot, PropertyState, ThermostatSnapshot};
use serde::Serialize;
use eco_types::{DeviceSettings, ErrorCode, ScheduleMode};
use time::format_description::well_known::Rfc3339;

/// Render `snapshot` as aligned `label: value` lines.
pub fn format_snapshot_text(snapshot: &ThermostatSnapshot) -> String {
    let mut out = String::new();
    line(&mut out, "Name", &snapshot.name, |name| name.clone());
    line(&mut out, "Battery", &snapshot.battery_level, |b| format!("{b}%"));
    line(&mut out, "Target", &snapshot.temperature, |t| t.target.to_string());
    line(&mut out, "Room", &snapshot.temperature, |t| t.room.to_string());

    line(&mut out, "Mode", &snapshot.settings, |s| {
        mode_name(s.schedule_mode).to_string()
    });
    line(&mut out, "Limits", &snapshot.settings, |s| {
        format!("{} - {}", s.temperature_min, s.temperature_max)
    });
    line(&mut out, "Frost", &snapshot.settings, |s| {
        s.frost_protection_temperature.to_string()
    });
    line(&mut out, "Vacation", &snapshot.settings, vacation);
    line(&mut out, "Child safety", &snapshot.settings, |s| {
        on_off(s.child_safety()).to_string()
    });
    line(&mut out, "Adaptive", &snapshot.settings, |s| {
        on_off(s.adaptive_learning()).to_string()
    });

    line(&mut out, "Clock", &snapshot.clock, |c| match c.to_datetime() {
        Ok(at) => at.format(&Rfc3339).unwrap_or_else(|_| at.to_string()),
        Err(e) => format!("invalid ({e})"),
    });
    line(&mut out, "Errors", &snapshot.errors, |codes| error_list(codes));
    line(&mut out, "Firmware", &snapshot.firmware_revision, |v| v.clone());
    line(&mut out, "Hardware", &snapshot.hardware_revision, |v| v.clone());
    out
}

/// Output of `read`: where the valve was reached, then its properties.
#[derive(Debug, Serialize)]
pub struct DeviceReport<'a> {
    pub address: &'a str,
    pub mac_address: Option<&'a str>,
    #[serde(flatten)]
    pub snapshot: &'a ThermostatSnapshot,
}

/// Render a [`DeviceReport`] as aligned text.
pub fn format_report_text(report: &DeviceReport<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<14}{}", "Address:", report.address);
    if let Some(mac) = report.mac_address.filter(|mac| *mac != report.address) {
        let _ = writeln!(out, "{:<14}{}", "MAC:", mac);
    }
    out.push_str(&format_snapshot_text(report.snapshot));
    out
}

/// Render a [`DeviceReport`] as pretty-printed JSON.
pub fn format_report_json(report: &DeviceReport<'_>) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render `snapshot` as pretty-printed JSON.
pub fn format_snapshot_json(snapshot: &ThermostatSnapshot) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// One line of `watch` output.
pub fn format_watch_line(snapshot: &ThermostatSnapshot) -> String {
    let temperature = |pick: fn(&eco_types::TemperatureReading) -> String| {
        snapshot
            .temperature
            .value
            .as_ref()
            .map(pick)
            .unwrap_or_else(|| "--".to_string())
    };
    let battery = snapshot
        .battery_level
        .value
        .map(|b| format!("{b}%"))
        .unwrap_or_else(|| "--".to_string());
    let errors = snapshot
        .errors
        .value
        .as_deref()
        .map(error_list)
        .unwrap_or_else(|| "--".to_string());

    format!(
        "room {} | target {} | battery {} | errors {}",
        temperature(|t| t.room.to_string()),
        temperature(|t| t.target.to_string()),
        battery,
        errors
    )
}

fn line<V>(
    out: &mut String,
    label: &str,
    property: &PropertySnapshot<V>,
    render: impl FnOnce(&V) -> String,
) {
    let value = match &property.value {
        Some(value) => with_state(render(value), property.state),
        None => "unknown".to_string(),
    };
    let _ = writeln!(out, "{:<14}{}", format!("{label}:"), value);
}

fn with_state(rendered: impl Display, state: PropertyState) -> String {
    match state {
        PropertyState::Stale => format!("{rendered} (stale)"),
        _ => rendered.to_string(),
    }
}

pub(crate) fn mode_name(mode: ScheduleMode) -> &'static str {
    match mode {
        ScheduleMode::Manual => "manual",
        ScheduleMode::Scheduled => "scheduled",
        ScheduleMode::Vacation => "vacation",
        ScheduleMode::Hold => "hold",
    }
}

fn vacation(settings: &DeviceSettings) -> String {
    let mut text = settings.vacation_temperature.to_string();
    if let (Some(start), Some(end)) = (settings.vacation_start, settings.vacation_end) {
        let _ = write!(text, " ({} to {})", start.date(), end.date());
    }
    text
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn error_list(codes: &[ErrorCode]) -> String {
    if codes.is_empty() {
        return "none".to_string();
    }
    codes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
