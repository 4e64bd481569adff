/*
 * This file is part of iito.
 *
 * Copyright (C) 2025 iito contributors
 *
 * iito is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * iito is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with iito. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{IitoError, Result};

/// Config source meaning "read standard input"
pub const STDIN_SOURCE: &str = "-";

/// Top-level configuration.
///
/// Both sections map a driver type name to an object of instance name to
/// driver-specific options. Key order follows the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: Map<String, Value>,
    #[serde(default)]
    pub output: Map<String, Value>,
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(IitoError::config("top level must be an object"));
        }
        if value.get("output").is_none() {
            return Err(IitoError::MissingConfig("output".to_string()));
        }
        if value.get("input").is_none() {
            warn!("Configuration does not define any inputs");
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Load a configuration from a file, or from standard input when `source` is `-`
pub fn load(source: &str) -> Result<Config> {
    let text = if source == STDIN_SOURCE {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        let path = Path::new(source);
        fs::read_to_string(path).map_err(|source| IitoError::FileRead {
            path: path.to_path_buf(),
            source,
        })?
    };

    Config::parse(&text)
}

/// Instances of one driver: the value under a driver name must be an object
pub fn instances<'a>(driver: &str, devs: &'a Value) -> Result<&'a Map<String, Value>> {
    devs.as_object()
        .ok_or_else(|| IitoError::invalid_config(driver, "expected an object of instances"))
}

/// Deserialize the typed options of one instance
pub fn options<T: DeserializeOwned>(name: &str, data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|e| IitoError::invalid_config(name, e.to_string()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathOptions {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdevOptions {
    pub subsystem: String,
    pub sysname: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SysfsOptions {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedOptions {
    pub sysname: Option<String>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupOptions {
    #[serde(rename = "match")]
    pub patterns: Option<OneOrMany>,
    pub class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// The part of an output instance shared by all drivers
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    #[serde(rename = "if")]
    pub condition: String,
    pub then: Map<String, Value>,
}

/// Split a rule condition into its invert flag and input reference
pub fn parse_reference(condition: &str) -> (bool, &str) {
    match condition.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, condition),
    }
}
