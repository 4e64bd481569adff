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

//! Inputs: named boolean sources sampled by output rules
//!
//! Inputs are created once while probing the configuration and live for the
//! whole process. Rules refer to them through [`InputId`] handles, which are
//! indices into the [`InputRegistry`].

pub mod path;
pub mod device;

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config;
use crate::device::DeviceRecord;
use crate::engine::Context;
use crate::error::{IitoError, Result};

/// Name of the builtin input that always samples true
pub const TRUE_INPUT: &str = "true";

/// Handle to an input registered in an [`InputRegistry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputId(pub usize);

/// A boolean source
pub trait InputDevice {
    fn name(&self) -> &str;

    /// Sample the current state, optionally narrowed by a property
    fn sample(&self, property: Option<&str>) -> Result<bool>;

    /// Offer a hotplug event. Returns `true` when the event concerns this
    /// input and dependent outputs must be re-evaluated.
    fn handle_event(&mut self, _record: &DeviceRecord) -> bool {
        false
    }
}

struct TrueInput;

impl InputDevice for TrueInput {
    fn name(&self) -> &str {
        TRUE_INPUT
    }

    fn sample(&self, _property: Option<&str>) -> Result<bool> {
        Ok(true)
    }
}

/// Insertion-ordered collection of inputs
pub struct InputRegistry {
    devices: Vec<Box<dyn InputDevice>>,
}

impl InputRegistry {
    /// A registry holding only the builtin `true` input
    pub fn new() -> Self {
        Self {
            devices: vec![Box::new(TrueInput)],
        }
    }

    pub fn register(&mut self, device: Box<dyn InputDevice>) -> InputId {
        self.devices.push(device);
        InputId(self.devices.len() - 1)
    }

    /// Resolve a `name[:property]` reference.
    ///
    /// The name is everything before the first `:`. It must equal a registered
    /// name exactly; with duplicates the first registered input wins.
    pub fn resolve(&self, reference: &str) -> Result<(InputId, Option<String>)> {
        let (name, property) = match reference.split_once(':') {
            Some((name, property)) => (name, Some(property.to_string())),
            None => (reference, None),
        };

        match self.devices.iter().position(|dev| dev.name() == name) {
            Some(idx) => Ok((InputId(idx), property)),
            None => {
                debug!("Found no input device matching \"{}\"", reference);
                Err(IitoError::InputNotFound(reference.to_string()))
            }
        }
    }

    pub fn get(&self, id: InputId) -> &dyn InputDevice {
        self.devices[id.0].as_ref()
    }

    pub fn get_mut(&mut self, id: InputId) -> &mut dyn InputDevice {
        self.devices[id.0].as_mut()
    }

    pub fn name(&self, id: InputId) -> &str {
        self.get(id).name()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl Default for InputRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Constructor of one input instance: `(context, instance name, options)`
pub type InputProbe = fn(&mut Context, &str, &Value) -> Result<()>;

lazy_static! {
    static ref INPUT_DRIVERS: HashMap<&'static str, InputProbe> = {
        let mut drivers: HashMap<&'static str, InputProbe> = HashMap::new();
        drivers.insert("path", path::probe);
        drivers.insert("udev", device::probe);
        drivers
    };
}

fn probe_driver(ctx: &mut Context, driver: &str, devs: &Value) -> Result<()> {
    let probe = *INPUT_DRIVERS.get(driver).ok_or_else(|| {
        error!("Unknown input type \"{}\"", driver);
        IitoError::UnknownDriver {
            kind: "input",
            name: driver.to_string(),
        }
    })?;

    for (name, data) in config::instances(driver, devs)? {
        debug!("Probing {} input \"{}\"", driver, name);

        probe(ctx, name, data).map_err(|e| {
            error!("Failed probing {} input \"{}\": {}", driver, name, e);
            e
        })?;
    }

    Ok(())
}

/// Probe every input declared in the `input` section
pub fn probe(ctx: &mut Context, section: &Map<String, Value>) -> Result<()> {
    for (driver, devs) in section {
        probe_driver(ctx, driver, devs)?;
    }

    info!("Successfully probed {} inputs", ctx.inputs().len());
    Ok(())
}
