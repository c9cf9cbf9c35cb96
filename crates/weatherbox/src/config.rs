//! Station configuration, read from a JSON file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::link::MAX_BUSES;
use crate::particulate::ParticulateSettings;

#[derive(Debug, Display, From)]
pub enum ConfigError {
    #[display("cannot read configuration: {_0}")]
    Io(std::io::Error),
    #[display("invalid configuration: {_0}")]
    Parse(serde_json::Error),
    #[from(skip)]
    #[display("sensor {sensor} references unknown bus {bus}")]
    UnknownBus { sensor: String, bus: u8 },
    #[from(skip)]
    #[display("sensor {sensor}: {field} must be nonzero")]
    ZeroInterval { sensor: String, field: &'static str },
    #[from(skip)]
    #[display("bus {_0} configured twice")]
    DuplicateBus(u8),
    #[from(skip)]
    #[display("{_0} buses configured, at most {} supported", MAX_BUSES)]
    TooManyBuses(usize),
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buses: Vec<BusConfig>,
    pub sensors: Vec<SensorConfig>,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buses: vec![
                BusConfig { id: 0, device: PathBuf::from("/dev/i2c-0") },
                BusConfig { id: 1, device: PathBuf::from("/dev/i2c-1") },
            ],
            sensors: vec![SensorConfig::default()],
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusConfig {
    pub id: u8,
    /// Device node, e.g. `/dev/i2c-1`.
    pub device: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Sps30,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub name: String,
    pub kind: SensorKind,
    pub bus: u8,
    pub address: u8,
    pub enabled: bool,
    pub sampling_period_secs: u64,
    pub warm_up_secs: u64,
    pub store_interval_secs: u64,
    pub init_timeout_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            name: "sps30".into(),
            kind: SensorKind::Sps30,
            bus: 1,
            address: sps30::DEFAULT_ADDRESS,
            enabled: true,
            sampling_period_secs: 1,
            warm_up_secs: 30,
            store_interval_secs: 60,
            init_timeout_secs: 60,
        }
    }
}

impl SensorConfig {
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn particulate_settings(&self) -> ParticulateSettings {
        ParticulateSettings {
            sampling_period: Duration::from_secs(self.sampling_period_secs),
            warm_up: Duration::from_secs(self.warm_up_secs),
            init_timeout: Duration::from_secs(self.init_timeout_secs),
            ..ParticulateSettings::default()
        }
    }
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buses.len() > MAX_BUSES {
            return Err(ConfigError::TooManyBuses(self.buses.len()));
        }
        let mut ids = HashSet::new();
        for bus in &self.buses {
            if !ids.insert(bus.id) {
                return Err(ConfigError::DuplicateBus(bus.id));
            }
        }

        for sensor in &self.sensors {
            if !ids.contains(&sensor.bus) {
                return Err(ConfigError::UnknownBus { sensor: sensor.name.clone(), bus: sensor.bus });
            }
            let zero = [
                ("sampling_period_secs", sensor.sampling_period_secs),
                ("store_interval_secs", sensor.store_interval_secs),
                ("init_timeout_secs", sensor.init_timeout_secs),
            ]
            .into_iter()
            .find(|(_, v)| *v == 0);
            if let Some((field, _)) = zero {
                return Err(ConfigError::ZeroInterval { sensor: sensor.name.clone(), field });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_describes_one_sps30_on_bus_1() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.buses.len(), 2);
        assert_eq!(config.sensors[0].bus, 1);
        assert_eq!(config.sensors[0].address, 0x69);

        let settings = config.sensors[0].particulate_settings();
        assert_eq!(settings.warm_up, Duration::from_secs(30));
        assert_eq!(settings.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_json(
            r#"{
                "buses": [{ "id": 3, "device": "/dev/i2c-3" }],
                "sensors": [{ "name": "outdoor", "bus": 3, "warm_up_secs": 0 }]
            }"#,
        )
        .unwrap();

        let sensor = &config.sensors[0];
        assert_eq!(sensor.name, "outdoor");
        assert_eq!(sensor.kind, SensorKind::Sps30);
        assert_eq!(sensor.address, 0x69);
        assert!(sensor.enabled);
        assert_eq!(sensor.warm_up_secs, 0);
        assert_eq!(sensor.store_interval(), Duration::from_secs(60));
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn sensor_on_unknown_bus_is_rejected() {
        let err = Config::from_json(r#"{ "sensors": [{ "bus": 7 }] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownBus { bus: 7, .. }));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let err =
            Config::from_json(r#"{ "sensors": [{ "sampling_period_secs": 0 }] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { field: "sampling_period_secs", .. }));

        let err =
            Config::from_json(r#"{ "sensors": [{ "store_interval_secs": 0 }] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroInterval { field: "store_interval_secs", .. }));
    }

    #[test]
    fn duplicate_buses_are_rejected() {
        let err = Config::from_json(
            r#"{ "buses": [{ "id": 1, "device": "a" }, { "id": 1, "device": "b" }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateBus(1)));
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let err = Config::from_json(r#"{ "sensors": [{ "kind": "bme280" }] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
