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

//! Attribute file helpers shared by the output drivers and the presence monitor.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IitoError, Result};

/// Default class directory for LED devices
pub const LED_CLASS_DIR: &str = "/sys/class/leds";

pub fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim_end().to_string())
}

/// Read a single attribute, mapping failures to `FileRead`
pub fn read_attribute(path: &Path) -> Result<String> {
    read_trimmed(path).map_err(|source| IitoError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a single attribute value followed by a newline.
///
/// The file must already exist; attributes are never created. A short write or
/// a failed flush is reported as `FileWrite`.
pub fn write_attribute(path: &Path, value: &str) -> Result<()> {
    let wrap = |source| IitoError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(wrap)?;
    file.write_all(format!("{}\n", value).as_bytes()).map_err(wrap)?;
    file.flush().map_err(wrap)
}

/// Read `max_brightness` below an LED directory
pub fn read_max_brightness(dir: &Path) -> Result<i64> {
    let path = dir.join("max_brightness");
    let raw = read_attribute(&path)?;
    raw.trim().parse::<i64>().map_err(|e| {
        IitoError::invalid_config(
            path.display().to_string(),
            format!("unable to parse \"{}\": {}", raw, e),
        )
    })
}

/// Default location of a named LED
pub fn led_dir(name: &str) -> PathBuf {
    Path::new(LED_CLASS_DIR).join(name)
}
