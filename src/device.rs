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

//! Device presence tracking
//!
//! A [`Presence`] follows one device identified by `(subsystem, sysname)`. It
//! starts from whatever the [`DeviceSource`] reports at probe time and is then
//! driven exclusively by hotplug events: every event for the tracked sysname
//! replaces the cached [`DeviceRecord`] wholesale.
//!
//! A device is present iff a snapshot exists and the action of the last event
//! is not `remove`. Snapshots taken by lookup carry no action and count as
//! present.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{IitoError, Result};
use crate::sysfs;

/// Action string reported by the kernel when a device goes away
pub const ACTION_REMOVE: &str = "remove";
/// Action string reported by the kernel when a device appears
pub const ACTION_ADD: &str = "add";

/// Owned snapshot of a device, either looked up or received as an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub subsystem: String,
    pub sysname: String,
    pub syspath: PathBuf,
    pub action: Option<String>,
}

impl DeviceRecord {
    pub fn new(subsystem: &str, sysname: &str, syspath: impl Into<PathBuf>) -> Self {
        Self {
            subsystem: subsystem.to_string(),
            sysname: sysname.to_string(),
            syspath: syspath.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn from_udev(dev: &udev::Device) -> Self {
        Self {
            subsystem: dev
                .subsystem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            sysname: dev.sysname().to_string_lossy().into_owned(),
            syspath: dev.syspath().to_path_buf(),
            action: dev.action().map(|a| a.to_string_lossy().into_owned()),
        }
    }

    pub fn is_removal(&self) -> bool {
        self.action.as_deref() == Some(ACTION_REMOVE)
    }

    /// Read a sysfs attribute of this device; `None` if it does not exist
    pub fn attribute(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.syspath.join(key))
            .ok()
            .map(|v| v.trim_end().to_string())
    }

    pub fn set_attribute(&self, key: &str, value: &str) -> Result<()> {
        sysfs::write_attribute(&self.syspath.join(key), value)
    }
}

/// Lookup and enumeration of devices
#[cfg_attr(test, mockall::automock)]
pub trait DeviceSource {
    /// Snapshot of the device if it currently exists
    fn lookup(&self, subsystem: &str, sysname: &str) -> Option<DeviceRecord>;

    /// Sysnames of all existing devices in `subsystem` matching any of the
    /// shell-glob `patterns`, sorted
    fn enumerate(&self, subsystem: &str, patterns: &[String]) -> Result<Vec<String>>;
}

/// [`DeviceSource`] backed by libudev
#[derive(Debug, Default, Clone, Copy)]
pub struct UdevSource;

impl DeviceSource for UdevSource {
    fn lookup(&self, subsystem: &str, sysname: &str) -> Option<DeviceRecord> {
        match udev::Device::from_subsystem_sysname(subsystem.to_string(), sysname.to_string()) {
            Ok(dev) => Some(DeviceRecord::from_udev(&dev)),
            Err(e) => {
                debug!(subsystem, sysname, error = %e, "Device not available");
                None
            }
        }
    }

    fn enumerate(&self, subsystem: &str, patterns: &[String]) -> Result<Vec<String>> {
        // libudev treats an empty sysname filter as "match everything"
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let mut enumerator = udev::Enumerator::new()?;
        enumerator.match_subsystem(subsystem)?;
        for pattern in patterns {
            enumerator.match_sysname(pattern)?;
        }

        let mut names: Vec<String> = enumerator
            .scan_devices()?
            .map(|dev| dev.sysname().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Presence monitor for a single device
#[derive(Debug)]
pub struct Presence {
    subsystem: String,
    sysname: String,
    snapshot: Option<DeviceRecord>,
}

impl Presence {
    pub fn open(source: &dyn DeviceSource, subsystem: &str, sysname: &str) -> Self {
        let snapshot = source.lookup(subsystem, sysname);
        if snapshot.is_none() {
            debug!("(udev) {}({}): Not available", sysname, subsystem);
        }

        Self {
            subsystem: subsystem.to_string(),
            sysname: sysname.to_string(),
            snapshot,
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn sysname(&self) -> &str {
        &self.sysname
    }

    pub fn snapshot(&self) -> Option<&DeviceRecord> {
        self.snapshot.as_ref()
    }

    pub fn is_present(&self) -> bool {
        self.snapshot.as_ref().is_some_and(|s| !s.is_removal())
    }

    /// Action of the most recent accepted event
    pub fn last_action(&self) -> Option<&str> {
        self.snapshot.as_ref().and_then(|s| s.action.as_deref())
    }

    /// Consume a monitor event. Events for other devices are ignored and
    /// `false` is returned; otherwise the snapshot is replaced.
    pub fn accept(&mut self, record: &DeviceRecord) -> bool {
        if record.sysname != self.sysname {
            debug!(
                "(udev) {}({}): Ignoring unrelated event from \"{}\"",
                self.sysname, self.subsystem, record.sysname
            );
            return false;
        }

        debug!(
            "(udev) {}({}): {}",
            self.sysname,
            self.subsystem,
            record.action.as_deref().unwrap_or("snapshot")
        );
        self.snapshot = Some(record.clone());
        true
    }

    /// Attribute of the current snapshot, `None` when absent or missing
    pub fn attribute(&self, key: &str) -> Option<String> {
        if !self.is_present() {
            return None;
        }
        self.snapshot.as_ref().and_then(|s| s.attribute(key))
    }

    /// Write an attribute; refuses with `NotPresent` when the device is gone
    pub fn set_attribute(&self, key: &str, value: &str) -> Result<()> {
        match &self.snapshot {
            Some(snapshot) if !snapshot.is_removal() => snapshot.set_attribute(key, value),
            _ => Err(IitoError::NotPresent(self.sysname.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source_with(dir: &TempDir) -> MockDeviceSource {
        let syspath = dir.path().to_path_buf();
        let mut source = MockDeviceSource::new();
        source
            .expect_lookup()
            .returning(move |subsystem, sysname| {
                Some(DeviceRecord::new(subsystem, sysname, syspath.clone()))
            });
        source
    }

    #[test]
    fn test_open_absent_device() {
        let mut source = MockDeviceSource::new();
        source.expect_lookup().returning(|_, _| None);

        let presence = Presence::open(&source, "power_supply", "AC");
        assert!(!presence.is_present());
        assert_eq!(presence.attribute("online"), None);
        assert!(matches!(
            presence.set_attribute("online", "1"),
            Err(IitoError::NotPresent(_))
        ));
    }

    #[test]
    fn test_open_present_device_without_action() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("online"), "1\n").unwrap();

        let presence = Presence::open(&source_with(&dir), "power_supply", "AC");
        assert!(presence.is_present());
        assert_eq!(presence.last_action(), None);
        assert_eq!(presence.attribute("online").as_deref(), Some("1"));
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut presence = Presence::open(&source_with(&dir), "power_supply", "AC");

        let other = DeviceRecord::new("power_supply", "BAT0", dir.path()).with_action(ACTION_REMOVE);
        assert!(!presence.accept(&other));
        assert!(presence.is_present());
    }

    #[test]
    fn test_remove_event_hides_stale_attributes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("online"), "1\n").unwrap();
        let mut presence = Presence::open(&source_with(&dir), "power_supply", "AC");

        let removed = DeviceRecord::new("power_supply", "AC", dir.path()).with_action(ACTION_REMOVE);
        assert!(presence.accept(&removed));
        assert!(!presence.is_present());
        assert_eq!(presence.last_action(), Some(ACTION_REMOVE));
        assert_eq!(presence.attribute("online"), None);
        assert!(matches!(
            presence.set_attribute("online", "0"),
            Err(IitoError::NotPresent(_))
        ));

        let added = DeviceRecord::new("power_supply", "AC", dir.path()).with_action(ACTION_ADD);
        assert!(presence.accept(&added));
        assert!(presence.is_present());
        assert_eq!(presence.attribute("online").as_deref(), Some("1"));
    }

    #[test]
    fn test_set_attribute_writes_through_snapshot() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("brightness"), "0\n").unwrap();
        let presence = Presence::open(&source_with(&dir), "leds", "led0");

        presence.set_attribute("brightness", "7").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("brightness")).unwrap(), "7\n");
    }

    #[test]
    fn test_udev_enumerate_without_patterns_matches_nothing() {
        assert!(UdevSource.enumerate("leds", &[]).unwrap().is_empty());
    }
}
