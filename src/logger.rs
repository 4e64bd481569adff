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

use std::path::Path;

use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::error::{IitoError, Result};

const JOURNAL_SOCKET: &str = "/run/systemd/journal/socket";

/// Directive used while verbose logging is toggled on
pub const DEBUG_DIRECTIVE: &str = "debug";

fn filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| IitoError::invalid_config("log-level", e.to_string()))
}

/// Runtime switch between the configured filter and full debug output
pub struct Verbosity {
    handle: reload::Handle<EnvFilter, Registry>,
    configured: String,
    debug: bool,
}

impl Verbosity {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>, configured: &str) -> Self {
        Self {
            handle,
            configured: configured.to_string(),
            debug: false,
        }
    }

    /// Directive currently in effect
    pub fn current(&self) -> &str {
        if self.debug {
            DEBUG_DIRECTIVE
        } else {
            &self.configured
        }
    }

    pub fn toggle(&mut self) -> Result<()> {
        let next = if self.debug {
            self.configured.as_str()
        } else {
            DEBUG_DIRECTIVE
        };

        self.handle
            .reload(filter(next)?)
            .map_err(|e| IitoError::config(format!("unable to change log level: {}", e)))?;
        self.debug = !self.debug;

        info!("Log level set to \"{}\"", self.current());
        Ok(())
    }
}

/// Install the global subscriber.
///
/// Logs go to the systemd journal when `journal` is set and the journal
/// socket exists, to stderr otherwise.
pub fn init_logging(level: &str, journal: bool) -> Result<Verbosity> {
    let (filter_layer, handle) = reload::Layer::new(filter(level)?);

    let journald = if journal && Path::new(JOURNAL_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
                None
            }
        }
    } else {
        None
    };

    let fmt = journald.is_none().then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
    });
    let target = if journald.is_some() { "systemd journal" } else { "stderr" };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(journald)
        .with(fmt)
        .try_init()
        .map_err(|e| IitoError::config(format!("unable to initialise logging: {}", e)))?;

    info!("Logging to {} at level \"{}\"", target, level);
    Ok(Verbosity::new(handle, level))
}
