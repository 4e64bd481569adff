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

//! Process-wide state and event dispatch
//!
//! The [`Context`] owns every input and output for the lifetime of the
//! process. Drivers register watch requests while probing; the reactor turns
//! those into filesystem watches and udev monitors and feeds the resulting
//! events back through [`Context::handle_path_event`] and
//! [`Context::handle_device_event`].

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::Config;
use crate::device::{DeviceRecord, DeviceSource};
use crate::error::Result;
use crate::input::{self, InputId, InputRegistry};
use crate::output::{self, Output, OutputId};

/// Who receives the events of a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Input(InputId),
    Output(OutputId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchKind {
    /// Creation or deletion of a filesystem path
    Path(PathBuf),
    /// Hotplug events of one device
    Device { subsystem: String, sysname: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watch {
    pub owner: Owner,
    pub kind: WatchKind,
}

pub struct Context {
    devices: Box<dyn DeviceSource>,
    inputs: InputRegistry,
    outputs: Vec<Output>,
    watches: Vec<Watch>,
}

impl Context {
    pub fn new(devices: Box<dyn DeviceSource>) -> Self {
        Self {
            devices,
            inputs: InputRegistry::new(),
            outputs: Vec::new(),
            watches: Vec::new(),
        }
    }

    pub fn devices(&self) -> &dyn DeviceSource {
        self.devices.as_ref()
    }

    pub fn inputs(&self) -> &InputRegistry {
        &self.inputs
    }

    pub fn inputs_mut(&mut self) -> &mut InputRegistry {
        &mut self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn add_output(&mut self, output: Output) -> OutputId {
        self.outputs.push(output);
        OutputId(self.outputs.len() - 1)
    }

    /// Request events for `kind` to be delivered to `owner`
    pub fn watch(&mut self, owner: Owner, kind: WatchKind) {
        self.watches.push(Watch { owner, kind });
    }

    pub fn watches(&self) -> &[Watch] {
        &self.watches
    }

    /// Provision all inputs, then all outputs. Any error is fatal.
    pub fn probe(&mut self, config: &Config) -> Result<()> {
        input::probe(self, &config.input)?;
        output::probe(self, &config.output)
    }

    /// Re-evaluate every output, or only those with a rule on `filter`.
    /// The first failing output aborts the pass.
    pub fn update(&mut self, filter: Option<InputId>) -> Result<()> {
        let inputs = &self.inputs;
        for output in self.outputs.iter_mut() {
            if let Some(id) = filter {
                if !output.uses(id) {
                    continue;
                }
            }
            output.update(inputs)?;
        }
        Ok(())
    }

    /// A watched path of input `id` was created or deleted
    pub fn handle_path_event(&mut self, id: InputId) -> Result<()> {
        debug!("{}: Path changed", self.inputs.name(id));
        self.update(Some(id))
    }

    pub fn handle_device_event(&mut self, owner: Owner, record: &DeviceRecord) -> Result<()> {
        match owner {
            Owner::Input(id) => {
                if self.inputs.get_mut(id).handle_event(record) {
                    self.update(Some(id))
                } else {
                    Ok(())
                }
            }
            Owner::Output(id) => self.outputs[id.0].handle_event(record),
        }
    }

    /// Active rule of every output, one line each
    pub fn status(&self) -> Vec<String> {
        self.outputs
            .iter()
            .map(|output| output.describe_active(&self.inputs))
            .collect()
    }

    pub fn dump(&self) {
        info!("Output status:");
        for line in self.status() {
            info!("{}", line);
        }
    }
}
