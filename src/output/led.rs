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

//! Hotplug-aware LED writer and LED groups
//!
//! An [`LedOutput`] tracks its device through a [`Presence`]. While the LED
//! is absent, applying a state succeeds without writing anything. When the
//! LED is added back, `max_brightness` is read again and the active state is
//! written again, so a reconnected LED shows the right state without waiting
//! for an input to change.
//!
//! Every apply first resets the LED to `trigger=none, brightness=0`. Outputs
//! updated by the same event therefore restart time-based triggers together
//! and blink in step.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{self, GroupOptions, LedOptions};
use crate::device::{DeviceRecord, Presence, ACTION_ADD};
use crate::engine::{Context, Owner, WatchKind};
use crate::error::{IitoError, Result};
use crate::output::state::{TargetState, BRIGHTNESS, DEFAULT_TRIGGER, TRIGGER};
use crate::output::{Hotplug, Output, OutputDriver, Rule};

/// Device class LEDs are looked up in unless configured otherwise
pub const LED_CLASS: &str = "leds";

const MAX_BRIGHTNESS: &str = "max_brightness";

pub struct LedOutput {
    name: String,
    presence: Presence,
    max_brightness: i64,
    states: Vec<TargetState>,
    off: TargetState,
}

fn max_brightness(presence: &Presence) -> Result<i64> {
    let raw = presence.attribute(MAX_BRIGHTNESS).ok_or_else(|| {
        IitoError::HardwareNotFound(format!("{}: no {}", presence.sysname(), MAX_BRIGHTNESS))
    })?;
    raw.trim().parse::<i64>().map_err(|e| {
        IitoError::invalid_config(MAX_BRIGHTNESS, format!("unable to parse \"{}\": {}", raw, e))
    })
}

impl LedOutput {
    /// Attach to a present LED; absence at this point is a provisioning error
    pub fn open(name: &str, presence: Presence, rules: &[Rule]) -> Result<Self> {
        if !presence.is_present() {
            return Err(IitoError::HardwareNotFound(format!(
                "LED \"{}\" ({}) is not present",
                presence.sysname(),
                presence.subsystem()
            )));
        }

        let max_brightness = max_brightness(&presence)?;
        let states = rules
            .iter()
            .map(|rule| TargetState::parse(name, &rule.state, true))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            presence,
            max_brightness,
            states,
            off: TargetState::off(),
        })
    }

    pub fn max_brightness(&self) -> i64 {
        self.max_brightness
    }
}

impl OutputDriver for LedOutput {
    fn apply(&mut self, rule: Option<usize>) -> Result<()> {
        if !self.presence.is_present() {
            debug!("{}: Not present, nothing to apply", self.name);
            return Ok(());
        }

        let state = rule.map(|idx| &self.states[idx]).unwrap_or(&self.off);
        let brightness = state.brightness.resolve(self.max_brightness);

        self.presence.set_attribute(TRIGGER, DEFAULT_TRIGGER)?;
        self.presence.set_attribute(BRIGHTNESS, "0")?;

        self.presence.set_attribute(TRIGGER, &state.trigger)?;
        self.presence.set_attribute(BRIGHTNESS, &brightness.to_string())?;

        for (key, value) in &state.attributes {
            self.presence.set_attribute(key, value)?;
        }

        debug!("{}: Set trigger:{} brightness:{}", self.name, state.trigger, brightness);
        Ok(())
    }

    fn handle_event(&mut self, record: &DeviceRecord) -> Hotplug {
        if !self.presence.accept(record) {
            return Hotplug::Ignored;
        }

        if record.action.as_deref() != Some(ACTION_ADD) {
            return Hotplug::Tracked;
        }

        match max_brightness(&self.presence) {
            Ok(max) => self.max_brightness = max,
            Err(e) => warn!(
                "{}: Keeping max_brightness {} after re-add: {}",
                self.name, self.max_brightness, e
            ),
        }
        Hotplug::Arrived
    }
}

fn provision(ctx: &mut Context, name: &str, class: &str, sysname: &str, rules: Vec<Rule>) -> Result<()> {
    let presence = Presence::open(ctx.devices(), class, sysname);
    let driver = LedOutput::open(name, presence, &rules)?;

    let id = ctx.add_output(Output::new(name, rules, Box::new(driver)));
    ctx.watch(
        Owner::Output(id),
        WatchKind::Device {
            subsystem: class.to_string(),
            sysname: sysname.to_string(),
        },
    );
    Ok(())
}

/// Options: `sysname` defaulting to the instance name, `class` defaulting to `leds`
pub fn probe(ctx: &mut Context, name: &str, rules: Vec<Rule>, data: &Value) -> Result<()> {
    let opts: LedOptions = config::options(name, data)?;
    let sysname = opts.sysname.unwrap_or_else(|| name.to_string());
    let class = opts.class.unwrap_or_else(|| LED_CLASS.to_string());

    provision(ctx, name, &class, &sysname, rules)
}

/// One LED output per existing device matching `match` (a name, glob or list
/// of them, defaulting to the instance name). Each output is named after its
/// device and shares the instance's rules. Devices appearing later are not
/// picked up.
pub fn probe_group(ctx: &mut Context, name: &str, rules: Vec<Rule>, data: &Value) -> Result<()> {
    let opts: GroupOptions = config::options(name, data)?;
    let patterns = opts
        .patterns
        .map(|p| p.into_vec())
        .unwrap_or_else(|| vec![name.to_string()]);
    if patterns.is_empty() {
        return Err(IitoError::invalid_config("match", "empty"));
    }
    let class = opts.class.unwrap_or_else(|| LED_CLASS.to_string());

    let sysnames = ctx.devices().enumerate(&class, &patterns)?;
    if sysnames.is_empty() {
        return Err(IitoError::HardwareNotFound(format!(
            "no {} device matches {:?}",
            class, patterns
        )));
    }

    for sysname in sysnames {
        debug!("{}: Adding group member \"{}\"", name, sysname);
        provision(ctx, &sysname, &class, &sysname, rules.clone())?;
    }
    Ok(())
}
