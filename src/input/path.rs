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

//! Path existence input
//!
//! Samples whether a filesystem path exists. The reactor keeps a watch on the
//! path for the lifetime of the process, so outputs are re-evaluated whenever
//! the path is created or removed.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::{self, PathOptions};
use crate::engine::{Context, Owner, WatchKind};
use crate::error::{IitoError, Result};
use crate::input::InputDevice;

pub struct PathInput {
    name: String,
    path: PathBuf,
}

impl PathInput {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputDevice for PathInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample(&self, property: Option<&str>) -> Result<bool> {
        match property {
            None | Some("present") => Ok(self.path.exists()),
            Some("absent") => Ok(!self.path.exists()),
            Some(other) => Err(IitoError::InvalidProperty {
                input: self.name.clone(),
                property: other.to_string(),
            }),
        }
    }
}

/// Options: `path`, defaulting to the instance name
pub fn probe(ctx: &mut Context, name: &str, data: &Value) -> Result<()> {
    let opts: PathOptions = config::options(name, data)?;
    let path = opts.path.unwrap_or_else(|| PathBuf::from(name));

    let id = ctx
        .inputs_mut()
        .register(Box::new(PathInput::new(name, path.clone())));
    ctx.watch(Owner::Input(id), WatchKind::Path(path));
    Ok(())
}
