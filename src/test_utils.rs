/*
 * Test utilities and mock helpers for iito
 *
 * Fake inputs and output drivers driven through shared cells, and a fake
 * sysfs tree standing in for udev.
 */

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::device::{DeviceRecord, DeviceSource};
use crate::error::{IitoError, Result};
use crate::input::{InputDevice, InputId, InputRegistry};
use crate::output::OutputDriver;

/// Property that makes a [`Flag`] fail sampling
pub const BROKEN_PROPERTY: &str = "broken";

/// Input whose state is set from the test
pub struct Flag {
    name: String,
    state: Rc<Cell<bool>>,
}

impl Flag {
    pub fn new(name: &str, state: bool) -> Self {
        Self {
            name: name.to_string(),
            state: Rc::new(Cell::new(state)),
        }
    }

    pub fn state(&self) -> Rc<Cell<bool>> {
        self.state.clone()
    }
}

impl InputDevice for Flag {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&self, property: Option<&str>) -> Result<bool> {
        match property {
            Some(BROKEN_PROPERTY) => Err(IitoError::InvalidProperty {
                input: self.name.clone(),
                property: BROKEN_PROPERTY.to_string(),
            }),
            _ => Ok(self.state.get()),
        }
    }
}

/// Register a [`Flag`] and hand back its state cell
pub fn flag(inputs: &mut InputRegistry, name: &str, init: bool) -> (Rc<Cell<bool>>, InputId) {
    let flag = Flag::new(name, init);
    let state = flag.state();
    (state, inputs.register(Box::new(flag)))
}

/// Output driver logging every successful apply
pub struct Recorder {
    log: Rc<RefCell<Vec<Option<usize>>>>,
    failing: Rc<Cell<bool>>,
}

impl Recorder {
    pub fn new() -> (Self, Rc<RefCell<Vec<Option<usize>>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let recorder = Self {
            log: log.clone(),
            failing: Rc::new(Cell::new(false)),
        };
        (recorder, log)
    }

    /// While set, every apply fails without being logged
    pub fn failing(&self) -> Rc<Cell<bool>> {
        self.failing.clone()
    }
}

impl OutputDriver for Recorder {
    fn apply(&mut self, rule: Option<usize>) -> Result<()> {
        if self.failing.get() {
            return Err(IitoError::NotPresent("recorder".to_string()));
        }
        self.log.borrow_mut().push(rule);
        Ok(())
    }
}

/// Create `root/name` laid out like an LED class device
pub fn fake_led(root: &Path, name: &str, max_brightness: i64) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("trigger"), "none\n").unwrap();
    fs::write(dir.join("brightness"), "0\n").unwrap();
    fs::write(dir.join("max_brightness"), format!("{}\n", max_brightness)).unwrap();
    dir
}

/// Shell-style matching supporting `*` and `?`
pub fn glob_match(pattern: &str, name: &str) -> bool {
    fn walk(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => walk(&p[1..], n) || (!n.is_empty() && walk(p, &n[1..])),
            (Some('?'), Some(_)) => walk(&p[1..], &n[1..]),
            (Some(a), Some(b)) if a == b => walk(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    walk(&p, &n)
}

/// [`DeviceSource`] over a directory; every subdirectory is a device of
/// any subsystem
pub struct FakeSource {
    root: PathBuf,
}

impl FakeSource {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl DeviceSource for FakeSource {
    fn lookup(&self, subsystem: &str, sysname: &str) -> Option<DeviceRecord> {
        let syspath = self.root.join(sysname);
        syspath
            .is_dir()
            .then(|| DeviceRecord::new(subsystem, sysname, syspath))
    }

    fn enumerate(&self, _subsystem: &str, patterns: &[String]) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if patterns.iter().any(|p| glob_match(p, &name)) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("led*", "led0"));
        assert!(glob_match("led?", "led1"));
        assert!(glob_match("*::kbd_backlight", "tpacpi::kbd_backlight"));
        assert!(!glob_match("led?", "led10"));
        assert!(!glob_match("mmc*", "led0"));
    }
}
