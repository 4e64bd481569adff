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

//! Device presence input
//!
//! Without a property, samples whether the device exists. With a property,
//! samples a sysfs attribute of the device as a boolean. An absent device
//! samples false for every property.

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{self, UdevOptions};
use crate::device::{DeviceRecord, Presence};
use crate::engine::{Context, Owner, WatchKind};
use crate::error::Result;
use crate::input::InputDevice;

pub struct UdevInput {
    name: String,
    presence: Presence,
}

impl UdevInput {
    pub fn new(name: &str, presence: Presence) -> Self {
        Self {
            name: name.to_string(),
            presence,
        }
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }
}

/// Interpret an attribute value as a boolean.
///
/// Missing values are false, `0` and `1` are taken literally, and anything
/// else, including an empty value, is true.
pub fn attribute_state(input: &str, property: &str, value: Option<&str>) -> bool {
    match value {
        None => {
            debug!("{}: Interpreting absence of property \"{}\" as false", input, property);
            false
        }
        Some("0") => false,
        Some("1") => true,
        Some(other) => {
            warn!(
                "{}: Interpreting available, but non-boolean, value of \"{}\" ({}), as true",
                input, property, other
            );
            true
        }
    }
}

impl InputDevice for UdevInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&self, property: Option<&str>) -> Result<bool> {
        if !self.presence.is_present() {
            return Ok(false);
        }

        match property {
            None => Ok(true),
            Some(prop) => {
                let value = self.presence.attribute(prop);
                Ok(attribute_state(&self.name, prop, value.as_deref()))
            }
        }
    }

    fn handle_event(&mut self, record: &DeviceRecord) -> bool {
        self.presence.accept(record)
    }
}

/// Options: `subsystem` (required), `sysname` defaulting to the instance name
pub fn probe(ctx: &mut Context, name: &str, data: &Value) -> Result<()> {
    let opts: UdevOptions = config::options(name, data).map_err(|e| {
        error!("{}: Invalid options: {}", name, e);
        e
    })?;
    let sysname = opts.sysname.unwrap_or_else(|| name.to_string());

    let presence = Presence::open(ctx.devices(), &opts.subsystem, &sysname);
    let id = ctx
        .inputs_mut()
        .register(Box::new(UdevInput::new(name, presence)));
    ctx.watch(
        Owner::Input(id),
        WatchKind::Device {
            subsystem: opts.subsystem,
            sysname,
        },
    );
    Ok(())
}
