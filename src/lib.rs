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

//! iito - reflect the state of inputs onto outputs
//!
//! Inputs are boolean sources such as the existence of a path or the
//! presence and attributes of a udev device. Outputs are LEDs driven through
//! sysfs. Each output carries an ordered list of rules; whenever an input
//! changes, the first matching rule of every dependent output is applied.

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod input;
pub mod logger;
pub mod output;
pub mod reactor;
pub mod sysfs;

#[cfg(test)]
pub mod test_utils;
