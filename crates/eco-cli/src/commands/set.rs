//! Set command implementation.

use anyhow::{Context, Result, bail};
use eco_core::thermostat::{FROST_PROTECTION_RANGE, LIMIT_RANGE, TARGET_RANGE, VACATION_RANGE};
use eco_core::{Command, Thermostat};
use eco_types::ScheduleMode;

use crate::cli::{DeviceArgs, Setting};
use crate::config::Config;
use crate::format::mode_name;
use crate::util::{connect, parse_celsius, parse_schedule_mode, parse_switch, require_success};

/// A parsed setting change, validated before connecting.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Change {
    Temperature(Setting, f32),
    Switch(Setting, bool),
    Mode(ScheduleMode),
}

impl Change {
    fn parse(setting: Setting, value: &str) -> Result<Self> {
        match setting {
            Setting::ChildSafety | Setting::AdaptiveLearning => {
                Ok(Change::Switch(setting, parse_switch(value)?))
            }
            Setting::Mode => Ok(Change::Mode(parse_schedule_mode(value)?)),
            _ => Ok(Change::Temperature(setting, parse_celsius(value)?)),
        }
    }

    fn validate(self) -> Result<()> {
        let Change::Temperature(setting, celsius) = self else {
            return Ok(());
        };
        let (min, max) = match setting {
            Setting::TargetTemperature => TARGET_RANGE,
            Setting::TemperatureMin | Setting::TemperatureMax => LIMIT_RANGE,
            Setting::FrostProtection => FROST_PROTECTION_RANGE,
            _ => VACATION_RANGE,
        };
        if !(min..=max).contains(&celsius) {
            bail!(
                "{} must be between {min:.1} and {max:.1} °C",
                label(setting)
            );
        }
        Ok(())
    }

    /// Whether the change is applied on top of the current settings.
    fn edits_settings(self) -> bool {
        !matches!(self, Change::Temperature(Setting::TargetTemperature, _))
    }

    fn command(self, thermostat: &Thermostat) -> eco_core::Result<Command> {
        match self {
            Change::Temperature(Setting::TargetTemperature, c) => {
                thermostat.set_target_temperature(c)
            }
            Change::Temperature(Setting::TemperatureMin, c) => thermostat.set_temperature_min(c),
            Change::Temperature(Setting::TemperatureMax, c) => thermostat.set_temperature_max(c),
            Change::Temperature(Setting::FrostProtection, c) => thermostat.set_frost_protection(c),
            Change::Temperature(_, c) => thermostat.set_vacation_temperature(c),
            Change::Switch(Setting::ChildSafety, on) => thermostat.set_child_safety(on),
            Change::Switch(_, on) => thermostat.set_adaptive_learning(on),
            Change::Mode(mode) => thermostat.set_schedule_mode(mode),
        }
    }

    fn describe(self) -> String {
        match self {
            Change::Temperature(setting, c) => format!("{} set to {c:.1}°C", label(setting)),
            Change::Switch(setting, on) => {
                format!("{} {}", label(setting), if on { "enabled" } else { "disabled" })
            }
            Change::Mode(mode) => format!("{} set to {}", label(Setting::Mode), mode_name(mode)),
        }
    }
}

fn label(setting: Setting) -> &'static str {
    match setting {
        Setting::TargetTemperature => "Target temperature",
        Setting::TemperatureMin => "Minimum temperature",
        Setting::TemperatureMax => "Maximum temperature",
        Setting::FrostProtection => "Frost protection",
        Setting::VacationTemperature => "Vacation temperature",
        Setting::ChildSafety => "Child safety lock",
        Setting::AdaptiveLearning => "Adaptive learning",
        Setting::Mode => "Schedule mode",
    }
}

pub async fn cmd_set(
    args: &DeviceArgs,
    config: &Config,
    setting: Setting,
    value: &str,
    quiet: bool,
) -> Result<()> {
    let change = Change::parse(setting, value)?;
    // Catch out-of-range values before connecting.
    change.validate()?;

    let mut device = connect(args, config).await?;
    let thermostat = device.thermostat().clone();

    // Writes carry whole payloads, so read the current value first.
    let current = if change.edits_settings() {
        Command::read(thermostat.settings().clone())
    } else {
        Command::read(thermostat.temperature().clone())
    };
    device.submit(current);
    let read = device.flush().await;
    if let Err(e) = require_success(read) {
        device.disconnect().await.ok();
        return Err(e);
    }

    let result = match change.command(&thermostat) {
        Ok(command) => {
            device.submit(command);
            require_success(device.flush().await)
        }
        Err(e) => Err(e.into()),
    };
    device.disconnect().await.ok();
    result.with_context(|| format!("Could not change {}", label(setting).to_lowercase()))?;

    if !quiet {
        println!("{}", change.describe());
    }
    Ok(())
}
