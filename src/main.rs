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

use anyhow::Context as _;
use clap::Parser;
use tokio::task::LocalSet;
use tracing::{error, info};

use iito::config;
use iito::device::UdevSource;
use iito::engine::Context;
use iito::logger;
use iito::reactor::Reactor;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "iitod")]
#[command(version)]
#[command(about = "Reflect the state of inputs onto LEDs")]
#[command(long_about = "Reflect the state of inputs onto LEDs

Inputs (paths, udev devices) and outputs (sysfs LEDs) are declared in a JSON
configuration. Every output carries an ordered list of rules; the first rule
whose input matches decides the output's state.

Signals:
  SIGUSR1  toggle debug logging
  SIGUSR2  log the active rule of every output")]
struct Cli {
    /// Configuration file, `-` to read standard input
    #[arg(value_name = "CONFIG")]
    config: String,

    /// Log filter, e.g. `info` or `iito=debug`
    #[arg(short = 'l', long, env = "IITO_LOG", default_value = "info")]
    log_level: String,

    /// Log to stderr even when the systemd journal is available
    #[arg(long)]
    no_journal: bool,

    /// Probe and apply the initial state, then exit
    #[arg(long)]
    dry_run: bool,
}

fn startup(cli: &Cli) -> anyhow::Result<Context> {
    let cfg = config::load(&cli.config)
        .with_context(|| format!("Unable to load config \"{}\"", cli.config))?;

    let mut ctx = Context::new(Box::new(UdevSource));
    ctx.probe(&cfg).context("Unable to probe devices")?;
    ctx.update(None)
        .context("Unable to set initial output states")?;

    Ok(ctx)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let verbosity = match logger::init_logging(&cli.log_level, !cli.no_journal) {
        Ok(verbosity) => verbosity,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    info!("STARTUP: iitod {} starting", VERSION);

    let ctx = match startup(&cli) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    if cli.dry_run {
        ctx.dump();
        return;
    }

    let local = LocalSet::new();
    let result = local
        .run_until(async move {
            let mut reactor = Reactor::new(ctx, Some(verbosity));
            reactor.install()?;
            reactor.run().await
        })
        .await;

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
    info!("SHUTDOWN: iitod terminated");
}
