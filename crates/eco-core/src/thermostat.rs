//! Property handles for one valve and the commands that drive them.

use std::sync::Arc;

use eco_types::{
    DeviceClock, DeviceSettings, ErrorCode, ScheduleMode, Temperature, TemperatureReading,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::properties::{
    BatteryLevel, ClockProperty, ErrorsProperty, FirmwareRevisionProperty,
    HardwareRevisionProperty, NameProperty, SettingsProperty, TemperatureProperty,
};
use crate::property::{Property, PropertySnapshot, PropertyState};

/// Accepted target temperature range in °C.
pub const TARGET_RANGE: (f32, f32) = (5.0, 30.0);
/// Accepted min/max limit range in °C.
pub const LIMIT_RANGE: (f32, f32) = (5.0, 30.0);
/// Accepted frost protection range in °C.
pub const FROST_PROTECTION_RANGE: (f32, f32) = (5.0, 10.0);
/// Accepted vacation temperature range in °C.
pub const VACATION_RANGE: (f32, f32) = (5.0, 20.0);

/// Shared property handles for one Danfoss Eco valve.
///
/// Cloning a `Thermostat` clones the handles, not the values: both copies
/// observe the same cached state.
#[derive(Debug, Clone, Default)]
pub struct Thermostat {
    battery: Arc<BatteryLevel>,
    temperature: Arc<TemperatureProperty>,
    settings: Arc<SettingsProperty>,
    errors: Arc<ErrorsProperty>,
    name: Arc<NameProperty>,
    clock: Arc<ClockProperty>,
    firmware_revision: Arc<FirmwareRevisionProperty>,
    hardware_revision: Arc<HardwareRevisionProperty>,
}

impl Thermostat {
    /// Fresh handles with every property unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Battery level.
    pub fn battery(&self) -> &Arc<BatteryLevel> {
        &self.battery
    }

    /// Target and room temperature.
    pub fn temperature(&self) -> &Arc<TemperatureProperty> {
        &self.temperature
    }

    /// Device settings.
    pub fn settings(&self) -> &Arc<SettingsProperty> {
        &self.settings
    }

    /// Active error codes.
    pub fn errors(&self) -> &Arc<ErrorsProperty> {
        &self.errors
    }

    /// Device name.
    pub fn name(&self) -> &Arc<NameProperty> {
        &self.name
    }

    /// Device clock.
    pub fn clock(&self) -> &Arc<ClockProperty> {
        &self.clock
    }

    /// Firmware revision.
    pub fn firmware_revision(&self) -> &Arc<FirmwareRevisionProperty> {
        &self.firmware_revision
    }

    /// Hardware revision.
    pub fn hardware_revision(&self) -> &Arc<HardwareRevisionProperty> {
        &self.hardware_revision
    }

    /// Read commands refreshing every property.
    pub fn poll_commands(&self) -> Vec<Command> {
        vec![
            Command::read(self.battery.clone()),
            Command::read(self.temperature.clone()),
            Command::read(self.settings.clone()),
            Command::read(self.errors.clone()),
            Command::read(self.name.clone()),
            Command::read(self.clock.clone()),
            Command::read(self.firmware_revision.clone()),
            Command::read(self.hardware_revision.clone()),
        ]
    }

    /// Stage a new target temperature and build its write command.
    ///
    /// The room temperature byte is carried over from the last reading.
    pub fn set_target_temperature(&self, celsius: f32) -> Result<Command> {
        let target = checked_temperature("target temperature", celsius, TARGET_RANGE)?;
        let room = self
            .temperature
            .value()
            .map(|reading| reading.room)
            .unwrap_or_default();
        self.temperature.stage(TemperatureReading { target, room });
        Ok(Command::write(self.temperature.clone()))
    }

    /// Apply `edit` to the current settings and build the write command.
    ///
    /// Edits accumulate on a staged value until it is written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueUnknown`] if the settings have not been read yet.
    pub fn update_settings(&self, edit: impl FnOnce(&mut DeviceSettings)) -> Result<Command> {
        self.try_update_settings(|s| {
            edit(s);
            Ok(())
        })
    }

    /// Lock or unlock the valve buttons.
    pub fn set_child_safety(&self, enabled: bool) -> Result<Command> {
        self.update_settings(|s| s.set_child_safety(enabled))
    }

    /// Enable or disable adaptive learning.
    pub fn set_adaptive_learning(&self, enabled: bool) -> Result<Command> {
        self.update_settings(|s| s.set_adaptive_learning(enabled))
    }

    /// Set the lowest accepted target temperature.
    pub fn set_temperature_min(&self, celsius: f32) -> Result<Command> {
        let min = checked_temperature("temperature min", celsius, LIMIT_RANGE)?;
        self.try_update_settings(|s| {
            if min > s.temperature_max {
                return Err(Error::InvalidValue(format!(
                    "temperature min {min} is above temperature max {}",
                    s.temperature_max
                )));
            }
            s.temperature_min = min;
            Ok(())
        })
    }

    /// Set the highest accepted target temperature.
    pub fn set_temperature_max(&self, celsius: f32) -> Result<Command> {
        let max = checked_temperature("temperature max", celsius, LIMIT_RANGE)?;
        self.try_update_settings(|s| {
            if max < s.temperature_min {
                return Err(Error::InvalidValue(format!(
                    "temperature max {max} is below temperature min {}",
                    s.temperature_min
                )));
            }
            s.temperature_max = max;
            Ok(())
        })
    }

    /// Switch the operating mode.
    ///
    /// Vacation mode uses the vacation temperature and dates already stored
    /// in the settings.
    pub fn set_schedule_mode(&self, mode: ScheduleMode) -> Result<Command> {
        self.update_settings(|s| s.schedule_mode = mode)
    }

    /// Set the frost protection temperature.
    pub fn set_frost_protection(&self, celsius: f32) -> Result<Command> {
        let frost = checked_temperature("frost protection", celsius, FROST_PROTECTION_RANGE)?;
        self.update_settings(|s| s.frost_protection_temperature = frost)
    }

    /// Set the vacation temperature.
    pub fn set_vacation_temperature(&self, celsius: f32) -> Result<Command> {
        let vacation = checked_temperature("vacation temperature", celsius, VACATION_RANGE)?;
        self.update_settings(|s| s.vacation_temperature = vacation)
    }

    /// Stage the device clock for `now` and build its write command.
    pub fn sync_clock(&self, now: OffsetDateTime) -> Result<Command> {
        let clock = DeviceClock::from_datetime(now)?;
        debug!(local_time = clock.local_time, utc_offset = clock.utc_offset, "Syncing clock");
        self.clock.stage(clock);
        Ok(Command::write(self.clock.clone()))
    }

    /// Copy out every cached value.
    pub fn snapshot(&self) -> ThermostatSnapshot {
        let errors = self.errors.snapshot();
        ThermostatSnapshot {
            battery_level: self.battery.snapshot(),
            temperature: self.temperature.snapshot(),
            settings: self.settings.snapshot(),
            errors: PropertySnapshot {
                value: errors.value.map(|e| e.codes()),
                state: errors.state,
            },
            name: self.name.snapshot(),
            clock: self.clock.snapshot(),
            firmware_revision: self.firmware_revision.snapshot(),
            hardware_revision: self.hardware_revision.snapshot(),
        }
    }

    fn try_update_settings(
        &self,
        edit: impl FnOnce(&mut DeviceSettings) -> Result<()>,
    ) -> Result<Command> {
        let mut settings = self
            .settings
            .staged()
            .or_else(|| self.settings.value())
            .ok_or(Error::ValueUnknown {
                property: self.settings.name(),
            })?;
        edit(&mut settings)?;
        self.settings.stage(settings);
        Ok(Command::write(self.settings.clone()))
    }
}

fn checked_temperature(what: &str, celsius: f32, (min, max): (f32, f32)) -> Result<Temperature> {
    Temperature::from_celsius(celsius)
        .filter(|t| t.within(min, max))
        .ok_or_else(|| {
            Error::InvalidValue(format!("{what} must be between {min} and {max} °C, got {celsius}"))
        })
}

/// Serialisable view of a [`Thermostat`].
#[derive(Debug, Clone, Serialize)]
pub struct ThermostatSnapshot {
    /// Battery level in percent.
    pub battery_level: PropertySnapshot<u8>,
    /// Target and room temperature.
    pub temperature: PropertySnapshot<TemperatureReading>,
    /// Device settings.
    pub settings: PropertySnapshot<DeviceSettings>,
    /// Active error codes.
    pub errors: PropertySnapshot<Vec<ErrorCode>>,
    /// Device name.
    pub name: PropertySnapshot<String>,
    /// Device clock.
    pub clock: PropertySnapshot<DeviceClock>,
    /// Firmware revision string.
    pub firmware_revision: PropertySnapshot<String>,
    /// Hardware revision string.
    pub hardware_revision: PropertySnapshot<String>,
}

impl ThermostatSnapshot {
    /// Names of properties whose last refresh failed.
    pub fn stale(&self) -> Vec<&'static str> {
        [
            ("battery_level", self.battery_level.state),
            ("temperature", self.temperature.state),
            ("settings", self.settings.state),
            ("errors", self.errors.state),
            ("device_name", self.name.state),
            ("current_time", self.clock.state),
            ("firmware_revision", self.firmware_revision.state),
            ("hardware_revision", self.hardware_revision.state),
        ]
        .into_iter()
        .filter(|(_, state)| *state == PropertyState::Stale)
        .map(|(name, _)| name)
        .collect()
    }
}
