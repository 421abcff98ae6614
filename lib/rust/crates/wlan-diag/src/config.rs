// Copyright 2021 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::{
        correlate::CorrelationConfig,
        error::ConfigError,
        register::MapOptions,
        timeline::{TimelineConfig, DEFAULT_RETRY_BURST_THRESHOLD},
    },
    serde::{Deserialize, Serialize},
    std::{
        collections::{BTreeMap, BTreeSet},
        fs::File,
        io::BufReader,
        path::Path,
        time::Duration,
    },
    wlan_capture::{ClockOffset, MacAddr},
};

fn default_retry_burst_threshold() -> usize {
    DEFAULT_RETRY_BURST_THRESHOLD
}

fn default_window_ms() -> u64 {
    1000
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationSettings {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    /// Monitor clock minus device clock. There is no default: zero has to be stated.
    pub clock_offset_ns: i64,
}

/// Overrides of the built-in ignore lists and hints. Absent lists keep the defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapSettings {
    pub ignored_registers: Option<BTreeSet<String>>,
    pub ignored_fields: Option<BTreeSet<String>>,
    /// Merged over the default hints.
    #[serde(default)]
    pub hints: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiagnosticConfig {
    pub ap: MacAddr,
    pub station: MacAddr,
    #[serde(default = "default_retry_burst_threshold")]
    pub retry_burst_threshold: usize,
    pub correlation: CorrelationSettings,
    #[serde(default)]
    pub map: MapSettings,
}

impl DiagnosticConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DiagnosticConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let config: DiagnosticConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ap == self.station {
            return Err(ConfigError::Invalid(format!(
                "AP and station share the address {}",
                self.ap
            )));
        }
        if self.correlation.window_ms == 0 {
            return Err(ConfigError::Invalid("correlation window must not be zero".to_string()));
        }
        Ok(())
    }

    pub fn timeline_config(&self) -> TimelineConfig {
        TimelineConfig {
            ap: self.ap,
            station: self.station,
            retry_burst_threshold: self.retry_burst_threshold,
        }
    }

    pub fn correlation_config(&self) -> CorrelationConfig {
        CorrelationConfig::new(ClockOffset::from_nanos(self.correlation.clock_offset_ns))
            .with_window(Duration::from_millis(self.correlation.window_ms))
    }

    pub fn map_options(&self) -> MapOptions {
        let mut options = MapOptions::default();
        if let Some(registers) = &self.map.ignored_registers {
            options.ignored_registers = registers.clone();
        }
        if let Some(fields) = &self.map.ignored_fields {
            options.ignored_fields = fields.clone();
        }
        options.hints.extend(self.map.hints.iter().map(|(k, v)| (k.clone(), v.clone())));
        options
    }
}
