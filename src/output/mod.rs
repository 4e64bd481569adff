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

//! Outputs and their rules
//!
//! Each output owns an ordered rule list. Evaluation is first-match: rules are
//! sampled in configuration order and the first one whose input state differs
//! from its invert flag is applied. When nothing matches the driver's default
//! state is applied instead.

pub mod led;
pub mod state;
pub mod sysfs;

use std::collections::HashMap;

use lazy_static::lazy_static;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::config::{self, parse_reference, OutputConfig, RuleConfig};
use crate::device::DeviceRecord;
use crate::engine::Context;
use crate::error::{IitoError, Result};
use crate::input::{InputId, InputRegistry};

/// Handle to an output registered in a [`Context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub usize);

#[derive(Debug, Clone)]
pub struct Rule {
    pub invert: bool,
    pub input: InputId,
    pub property: Option<String>,
    pub state: Map<String, Value>,
}

impl Rule {
    /// Resolve a configured rule against the registered inputs
    pub fn from_config(inputs: &InputRegistry, cfg: &RuleConfig) -> Result<Self> {
        let (invert, reference) = parse_reference(&cfg.condition);
        let (input, property) = inputs.resolve(reference)?;

        Ok(Self {
            invert,
            input,
            property,
            state: cfg.then.clone(),
        })
    }

    /// `[!]input[:property]`
    pub fn describe(&self, inputs: &InputRegistry) -> String {
        format!(
            "{}{}{}{}",
            if self.invert { "!" } else { "" },
            inputs.name(self.input),
            if self.property.is_some() { ":" } else { "" },
            self.property.as_deref().unwrap_or("")
        )
    }

    /// Sample the input and apply the invert flag
    pub fn matches(&self, inputs: &InputRegistry) -> Result<bool> {
        let state = inputs
            .get(self.input)
            .sample(self.property.as_deref())?;
        Ok(state ^ self.invert)
    }
}

/// Outcome of offering a hotplug event to an output driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotplug {
    /// Not about this output's device
    Ignored,
    /// Snapshot updated, nothing else to do
    Tracked,
    /// Device (re)appeared; the active state must be written again
    Arrived,
}

/// Hardware side of an output
pub trait OutputDriver {
    /// Write the state of rule `rule` (an index into the output's rules), or
    /// the default state for `None`
    fn apply(&mut self, rule: Option<usize>) -> Result<()>;

    fn handle_event(&mut self, _record: &DeviceRecord) -> Hotplug {
        Hotplug::Ignored
    }
}

pub struct Output {
    name: String,
    rules: Vec<Rule>,
    active: Option<usize>,
    driver: Box<dyn OutputDriver>,
}

impl Output {
    pub fn new(name: &str, rules: Vec<Rule>, driver: Box<dyn OutputDriver>) -> Self {
        Self {
            name: name.to_string(),
            rules,
            active: None,
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Index of the applied rule; `None` while the default state is applied
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_rule(&self) -> Option<&Rule> {
        self.active.map(|idx| &self.rules[idx])
    }

    pub fn uses(&self, input: InputId) -> bool {
        self.rules.iter().any(|rule| rule.input == input)
    }

    /// Re-evaluate the rules and apply the first match or the default.
    ///
    /// A sampling or apply error aborts the evaluation and leaves the active
    /// rule untouched.
    pub fn update(&mut self, inputs: &InputRegistry) -> Result<()> {
        debug!("{}: Update", self.name);

        for (idx, rule) in self.rules.iter().enumerate() {
            let matched = rule.matches(inputs).map_err(|e| {
                error!("{}: Failed to sample \"{}\": {}", self.name, rule.describe(inputs), e);
                e
            })?;
            if !matched {
                continue;
            }

            debug!("{}: Apply rule \"{}\"", self.name, rule.describe(inputs));
            return match self.driver.apply(Some(idx)) {
                Ok(()) => {
                    self.active = Some(idx);
                    Ok(())
                }
                Err(e) => {
                    error!(
                        "{}: Failed to apply rule \"{}\": {}",
                        self.name,
                        rule.describe(inputs),
                        e
                    );
                    Err(e)
                }
            };
        }

        debug!("{}: Apply default rule", self.name);
        match self.driver.apply(None) {
            Ok(()) => {
                self.active = None;
                Ok(())
            }
            Err(e) => {
                error!("{}: Failed to apply default rule: {}", self.name, e);
                Err(e)
            }
        }
    }

    /// Write the active state again without re-sampling
    pub fn reapply(&mut self) -> Result<()> {
        debug!("{}: Re-apply {:?}", self.name, self.active);
        self.driver.apply(self.active).map_err(|e| {
            error!("{}: Failed to re-apply active state: {}", self.name, e);
            e
        })
    }

    /// Offer a hotplug event; re-applies the active state on arrival
    pub fn handle_event(&mut self, record: &DeviceRecord) -> Result<()> {
        match self.driver.handle_event(record) {
            Hotplug::Arrived => self.reapply(),
            Hotplug::Tracked | Hotplug::Ignored => Ok(()),
        }
    }

    /// One status line, e.g. `led0: active rule: !door:present`
    pub fn describe_active(&self, inputs: &InputRegistry) -> String {
        match self.active_rule() {
            Some(rule) => format!("{}: active rule: {}", self.name, rule.describe(inputs)),
            None => format!("{}: active rule: none", self.name),
        }
    }
}

/// Constructor of one output instance: `(context, name, rules, options)`.
/// A constructor may register any number of outputs.
pub type OutputProbe = fn(&mut Context, &str, Vec<Rule>, &Value) -> Result<()>;

lazy_static! {
    static ref OUTPUT_DRIVERS: HashMap<&'static str, OutputProbe> = {
        let mut drivers: HashMap<&'static str, OutputProbe> = HashMap::new();
        drivers.insert("sysfs", sysfs::probe);
        drivers.insert("led", led::probe);
        drivers.insert("led-group", led::probe_group);
        drivers
    };
}

fn probe_rules(ctx: &Context, name: &str, data: &Value) -> Result<Vec<Rule>> {
    let cfg: OutputConfig = config::options(name, data)?;
    cfg.rules
        .iter()
        .map(|rule| Rule::from_config(ctx.inputs(), rule))
        .collect()
}

fn probe_driver(ctx: &mut Context, driver: &str, devs: &Value) -> Result<()> {
    let probe = *OUTPUT_DRIVERS.get(driver).ok_or_else(|| {
        error!("Unknown output type \"{}\"", driver);
        IitoError::UnknownDriver {
            kind: "output",
            name: driver.to_string(),
        }
    })?;

    for (name, data) in config::instances(driver, devs)? {
        debug!("Probing {} output \"{}\"", driver, name);

        let rules = probe_rules(ctx, name, data).map_err(|e| {
            error!("Failed parsing rules of {} output \"{}\": {}", driver, name, e);
            e
        })?;

        probe(ctx, name, rules, data).map_err(|e| {
            error!("Failed probing {} output \"{}\": {}", driver, name, e);
            e
        })?;
    }

    Ok(())
}

/// Probe every output declared in the `output` section
pub fn probe(ctx: &mut Context, section: &Map<String, Value>) -> Result<()> {
    for (driver, devs) in section {
        probe_driver(ctx, driver, devs)?;
    }

    info!("Successfully probed {} outputs", ctx.outputs().len());
    Ok(())
}
