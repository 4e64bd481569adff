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

//! Generic sysfs writer
//!
//! Writes `trigger` and `brightness` below a fixed directory. The directory
//! must exist at probe time; there is no hotplug tracking.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::config::{self, SysfsOptions};
use crate::engine::Context;
use crate::error::{IitoError, Result};
use crate::output::state::{TargetState, BRIGHTNESS, TRIGGER};
use crate::output::{Output, OutputDriver, Rule};
use crate::sysfs::{led_dir, read_max_brightness, write_attribute};

pub struct SysfsOutput {
    name: String,
    dir: PathBuf,
    max_brightness: i64,
    states: Vec<TargetState>,
    off: TargetState,
}

impl SysfsOutput {
    pub fn open(name: &str, dir: &Path, rules: &[Rule]) -> Result<Self> {
        let max_brightness = read_max_brightness(dir).map_err(|e| {
            IitoError::HardwareNotFound(format!(
                "unable to determine brightness range for \"{}\": {}",
                name, e
            ))
        })?;

        for attr in [TRIGGER, BRIGHTNESS] {
            let path = dir.join(attr);
            OpenOptions::new().write(true).open(&path).map_err(|e| {
                IitoError::HardwareNotFound(format!("unable to open {}: {}", path.display(), e))
            })?;
        }

        let states = rules
            .iter()
            .map(|rule| TargetState::parse(name, &rule.state, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            max_brightness,
            states,
            off: TargetState::off(),
        })
    }
}

impl OutputDriver for SysfsOutput {
    fn apply(&mut self, rule: Option<usize>) -> Result<()> {
        let state = rule.map(|idx| &self.states[idx]).unwrap_or(&self.off);
        let brightness = state.brightness.resolve(self.max_brightness);

        write_attribute(&self.dir.join(TRIGGER), &state.trigger)?;
        write_attribute(&self.dir.join(BRIGHTNESS), &brightness.to_string())?;

        debug!("{}: Set trigger:{} brightness:{}", self.name, state.trigger, brightness);
        Ok(())
    }
}

/// Options: `path`, defaulting to the LED class directory of the instance name
pub fn probe(ctx: &mut Context, name: &str, rules: Vec<Rule>, data: &Value) -> Result<()> {
    let opts: SysfsOptions = config::options(name, data)?;
    let dir = opts.path.unwrap_or_else(|| led_dir(name));

    let driver = SysfsOutput::open(name, &dir, &rules)?;
    ctx.add_output(Output::new(name, rules, Box::new(driver)));
    Ok(())
}
