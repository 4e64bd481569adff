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

//! Event loop
//!
//! Filesystem watchers and udev monitors only forward events into one
//! channel. Everything that touches the [`Context`] happens on the reactor
//! task, one event at a time.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::io::unix::AsyncFd;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::device::DeviceRecord;
use crate::engine::{Context, Owner, WatchKind};
use crate::error::{IitoError, Result};
use crate::input::InputId;
use crate::logger::Verbosity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The watched path of an input may have been created or deleted.
    /// `changed` lists the reported paths on the way to it; it is empty
    /// when the watcher lost events.
    Path { input: InputId, changed: Vec<PathBuf> },
    /// A udev monitor reported an event
    Device(DeviceRecord),
}

pub struct Reactor {
    ctx: Context,
    verbosity: Option<Verbosity>,
    tx: mpsc::UnboundedSender<Event>,
    rx: Option<mpsc::UnboundedReceiver<Event>>,
    paths: HashMap<InputId, PathWatch>,
    subscribers: HashMap<String, Vec<Owner>>,
}

/// Directory to watch for creation and deletion of `target`.
///
/// This is the parent of `target`, or its nearest existing ancestor while
/// the parent does not exist yet. It is always watched non-recursively.
pub fn watch_anchor(target: &Path) -> PathBuf {
    let parent = target.parent().unwrap_or(target);
    parent
        .ancestors()
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| Path::new("/"))
        .to_path_buf()
}

/// Whether a change of `changed` can alter the existence of `target`
pub fn affects(changed: &Path, target: &Path) -> bool {
    changed == target || target.starts_with(changed)
}

/// Non-recursive watch on the anchor of one input path.
///
/// Creating a directory below the anchor or removing the anchor moves the
/// watch; [`PathWatch::rearm`] follows it one step at a time.
pub struct PathWatch {
    target: PathBuf,
    anchor: PathBuf,
    watcher: RecommendedWatcher,
}

impl PathWatch {
    pub fn new(id: InputId, target: PathBuf, tx: mpsc::UnboundedSender<Event>) -> Result<Self> {
        let describe = target.display().to_string();
        let watched = target.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let changed = if event.need_rescan() {
                        Vec::new()
                    } else {
                        let changed: Vec<PathBuf> = event
                            .paths
                            .into_iter()
                            .filter(|p| affects(p, &watched))
                            .collect();
                        if changed.is_empty() {
                            return;
                        }
                        changed
                    };
                    let _ = tx.send(Event::Path { input: id, changed });
                }
                Err(e) => warn!("Watch error on {}: {}", watched.display(), e),
            }
        })
        .map_err(|e| IitoError::watch(describe.clone(), e))?;

        let anchor = watch_anchor(&target);
        watcher
            .watch(&anchor, RecursiveMode::NonRecursive)
            .map_err(|e| IitoError::watch(describe.clone(), e))?;
        debug!("Watching {} through {}", describe, anchor.display());

        Ok(Self {
            target,
            anchor,
            watcher,
        })
    }

    pub fn anchor(&self) -> &Path {
        &self.anchor
    }

    /// Move the watch to the current anchor of the target. With `force`
    /// the watch is re-registered even when the anchor path is unchanged,
    /// since the directory behind it may have been replaced.
    pub fn rearm(&mut self, force: bool) -> Result<bool> {
        let anchor = watch_anchor(&self.target);
        if anchor == self.anchor && !force {
            return Ok(false);
        }

        // The old anchor may be gone together with its watch
        if let Err(e) = self.watcher.unwatch(&self.anchor) {
            debug!("Unwatching {}: {}", self.anchor.display(), e);
        }
        self.watcher
            .watch(&anchor, RecursiveMode::NonRecursive)
            .map_err(|e| IitoError::watch(self.target.display().to_string(), e))?;

        debug!(
            "Watching {} through {}",
            self.target.display(),
            anchor.display()
        );
        self.anchor = anchor;
        Ok(true)
    }

    /// Follow the anchor after the watcher reported `changed`
    fn follow(&mut self, changed: &[PathBuf]) -> Result<bool> {
        let force = changed.is_empty() || changed.iter().any(|p| *p == self.anchor);
        self.rearm(force)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl only reads and updates the status flags of a descriptor
    // owned by the caller.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl Reactor {
    pub fn new(ctx: Context, verbosity: Option<Verbosity>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ctx,
            verbosity,
            tx,
            rx: Some(rx),
            paths: HashMap::new(),
            subscribers: HashMap::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Set up every watch requested while probing. Device monitors are
    /// spawned as local tasks, so this must run inside a `LocalSet`.
    pub fn install(&mut self) -> Result<()> {
        let watches = self.ctx.watches().to_vec();

        for watch in watches {
            match (watch.owner, watch.kind) {
                (Owner::Input(id), WatchKind::Path(path)) => self.watch_path(id, &path)?,
                (owner, WatchKind::Device { subsystem, sysname }) => {
                    debug!("Subscribing {:?} to {}({})", owner, sysname, subsystem);
                    self.subscribers.entry(subsystem).or_default().push(owner);
                }
                (owner, WatchKind::Path(path)) => {
                    warn!("Ignoring path watch on {} for {:?}", path.display(), owner)
                }
            }
        }

        let subsystems: Vec<String> = self.subscribers.keys().cloned().collect();
        for subsystem in subsystems {
            self.monitor(&subsystem)?;
        }

        info!(
            "Watching {} paths and {} subsystems",
            self.paths.len(),
            self.subscribers.len()
        );
        Ok(())
    }

    fn watch_path(&mut self, id: InputId, path: &Path) -> Result<()> {
        let watch = PathWatch::new(id, absolute(path)?, self.tx.clone())?;
        self.paths.insert(id, watch);
        Ok(())
    }

    fn monitor(&self, subsystem: &str) -> Result<()> {
        let socket = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem(subsystem))
            .and_then(|builder| builder.listen())
            .map_err(|e| IitoError::watch(format!("udev subsystem \"{}\"", subsystem), e))?;
        set_nonblocking(socket.as_raw_fd())?;

        let mut fd = AsyncFd::new(socket)?;
        let tx = self.tx.clone();
        let name = subsystem.to_string();

        tokio::task::spawn_local(async move {
            loop {
                let mut guard = match fd.readable_mut().await {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!("(udev) {}: Monitor failed: {}", name, e);
                        return;
                    }
                };

                for event in guard.get_inner_mut().iter() {
                    if tx.send(Event::Device(DeviceRecord::from_udev(&event))).is_err() {
                        return;
                    }
                }
                guard.clear_ready();
            }
        });

        debug!("(udev) {}: Monitoring", subsystem);
        Ok(())
    }

    /// Handle one event. Failures are logged; the loop keeps running.
    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Path { input: id, changed } => {
                if let Some(watch) = self.paths.get_mut(&id) {
                    if let Err(e) = watch.follow(&changed) {
                        error!("{}: {}", self.ctx.inputs().name(id), e);
                    }
                }
                if let Err(e) = self.ctx.handle_path_event(id) {
                    error!("{}: Update failed: {}", self.ctx.inputs().name(id), e);
                }
            }
            Event::Device(record) => {
                let owners = match self.subscribers.get(&record.subsystem) {
                    Some(owners) => owners.clone(),
                    None => return,
                };
                for owner in owners {
                    if let Err(e) = self.ctx.handle_device_event(owner, &record) {
                        error!("(udev) {}: Event handling failed: {}", record.sysname, e);
                    }
                }
            }
        }
    }

    fn toggle_verbosity(&mut self) {
        match self.verbosity.as_mut() {
            Some(verbosity) => {
                if let Err(e) = verbosity.toggle() {
                    error!("{}", e);
                }
            }
            None => warn!("Log level cannot be changed"),
        }
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(mut self) -> Result<()> {
        let mut rx = self
            .rx
            .take()
            .ok_or_else(|| IitoError::config("reactor already running"))?;

        let mut usr1 = signal(SignalKind::user_defined1())?;
        let mut usr2 = signal(SignalKind::user_defined2())?;
        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;

        info!("Entering event loop");
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = usr1.recv() => self.toggle_verbosity(),
                _ = usr2.recv() => self.ctx.dump(),
                _ = term.recv() => {
                    info!("SIGNAL: Received SIGTERM, shutting down");
                    break;
                }
                _ = int.recv() => {
                    info!("SIGNAL: Received SIGINT, shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    #[cfg(test)]
    fn subscribe(&mut self, subsystem: &str, owner: Owner) {
        self.subscribers
            .entry(subsystem.to_string())
            .or_default()
            .push(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MockDeviceSource, Presence, ACTION_ADD};
    use crate::input::device::UdevInput;
    use crate::output::{Output, Rule};
    use crate::test_utils::{flag, Recorder};
    use serde_json::Map;
    use std::fs;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn rule(input: InputId) -> Rule {
        Rule {
            invert: false,
            input,
            property: None,
            state: Map::new(),
        }
    }

    fn channel() -> (mpsc::UnboundedSender<Event>, mpsc::UnboundedReceiver<Event>) {
        mpsc::unbounded_channel()
    }

    /// Wait for the watcher to report `path`, or lost events
    fn wait_for(rx: &mut mpsc::UnboundedReceiver<Event>, path: &Path) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match rx.try_recv() {
                Ok(Event::Path { changed, .. }) => {
                    if changed.is_empty() || changed.iter().any(|p| p == path) {
                        return true;
                    }
                }
                Ok(_) => {}
                Err(mpsc::error::TryRecvError::Empty) => thread::sleep(Duration::from_millis(10)),
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
        false
    }

    #[test]
    fn test_anchor_is_parent_when_present() {
        let dir = TempDir::new().unwrap();
        assert_eq!(watch_anchor(&dir.path().join("flag")), dir.path());
    }

    #[test]
    fn test_anchor_climbs_to_existing_ancestor() {
        let dir = TempDir::new().unwrap();
        assert_eq!(watch_anchor(&dir.path().join("a/b/flag")), dir.path());

        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        assert_eq!(
            watch_anchor(&dir.path().join("a/b/flag")),
            dir.path().join("a/b")
        );
    }

    #[test]
    fn test_watch_descends_as_parents_appear() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = channel();
        let mut watch = PathWatch::new(InputId(0), dir.path().join("a/b/flag"), tx).unwrap();
        assert_eq!(watch.anchor(), dir.path());

        fs::create_dir(dir.path().join("a")).unwrap();
        assert!(wait_for(&mut rx, &dir.path().join("a")));
        assert!(watch.follow(&[dir.path().join("a")]).unwrap());
        assert_eq!(watch.anchor(), dir.path().join("a"));

        fs::create_dir(dir.path().join("a/b")).unwrap();
        assert!(wait_for(&mut rx, &dir.path().join("a/b")));
        assert!(watch.follow(&[dir.path().join("a/b")]).unwrap());
        assert_eq!(watch.anchor(), dir.path().join("a/b"));

        fs::write(dir.path().join("a/b/flag"), "").unwrap();
        assert!(wait_for(&mut rx, &dir.path().join("a/b/flag")));
        assert!(!watch.follow(&[dir.path().join("a/b/flag")]).unwrap());
    }

    #[test]
    fn test_watch_survives_parent_recreation() {
        let dir = TempDir::new().unwrap();
        let parent = dir.path().join("iito");
        let target = parent.join("door");
        fs::create_dir(&parent).unwrap();
        let (tx, mut rx) = channel();
        let mut watch = PathWatch::new(InputId(0), target.clone(), tx).unwrap();
        assert_eq!(watch.anchor(), parent);

        fs::remove_dir(&parent).unwrap();
        assert!(wait_for(&mut rx, &parent));
        assert!(watch.follow(&[parent.clone()]).unwrap());
        assert_eq!(watch.anchor(), dir.path());

        fs::create_dir(&parent).unwrap();
        assert!(wait_for(&mut rx, &parent));
        assert!(watch.follow(&[parent.clone()]).unwrap());
        assert_eq!(watch.anchor(), parent);

        fs::write(&target, "").unwrap();
        assert!(wait_for(&mut rx, &target));
    }

    #[test]
    fn test_rearm_forced_on_same_anchor() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = channel();
        let mut watch = PathWatch::new(InputId(0), dir.path().join("flag"), tx).unwrap();

        assert!(!watch.rearm(false).unwrap());
        assert!(watch.rearm(true).unwrap());
        assert!(watch.follow(&[]).unwrap());
        assert_eq!(watch.anchor(), dir.path());
    }

    #[test]
    fn test_affects() {
        let target = Path::new("/run/iito/door");
        assert!(affects(Path::new("/run/iito/door"), target));
        assert!(affects(Path::new("/run/iito"), target));
        assert!(!affects(Path::new("/run/iito/window"), target));
        assert!(!affects(Path::new("/run/iito/door/inner"), target));
    }

    #[test]
    fn test_dispatch_path_event_updates_dependents() {
        let mut ctx = Context::new(Box::new(MockDeviceSource::new()));
        let (state, a) = flag(ctx.inputs_mut(), "a", false);
        let (rec, log) = Recorder::new();
        ctx.add_output(Output::new("led0", vec![rule(a)], Box::new(rec)));
        let mut reactor = Reactor::new(ctx, None);

        state.set(true);
        reactor.dispatch(Event::Path {
            input: a,
            changed: Vec::new(),
        });
        assert_eq!(*log.borrow(), vec![Some(0)]);
        assert_eq!(reactor.context().outputs()[0].active(), Some(0));
    }

    #[test]
    fn test_dispatch_failure_keeps_running() {
        let mut ctx = Context::new(Box::new(MockDeviceSource::new()));
        let (_, a) = flag(ctx.inputs_mut(), "a", true);
        let (rec, log) = Recorder::new();
        let failing = rec.failing();
        ctx.add_output(Output::new("led0", vec![rule(a)], Box::new(rec)));
        let mut reactor = Reactor::new(ctx, None);

        failing.set(true);
        reactor.dispatch(Event::Path {
            input: a,
            changed: Vec::new(),
        });
        failing.set(false);
        reactor.dispatch(Event::Path {
            input: a,
            changed: Vec::new(),
        });
        assert_eq!(*log.borrow(), vec![Some(0)]);
    }

    #[test]
    fn test_dispatch_device_event_to_subscribers() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("online"), "1\n").unwrap();

        let mut source = MockDeviceSource::new();
        source.expect_lookup().returning(|_, _| None);
        let mut ctx = Context::new(Box::new(source));
        let presence = Presence::open(ctx.devices(), "power_supply", "AC");
        let ac = ctx
            .inputs_mut()
            .register(Box::new(UdevInput::new("ac", presence)));
        let (rec, log) = Recorder::new();
        ctx.add_output(Output::new("led0", vec![rule(ac)], Box::new(rec)));

        let mut reactor = Reactor::new(ctx, None);
        reactor.subscribe("power_supply", Owner::Input(ac));

        let other = DeviceRecord::new("usb", "AC", dir.path()).with_action(ACTION_ADD);
        reactor.dispatch(Event::Device(other));
        assert!(log.borrow().is_empty());

        let added = DeviceRecord::new("power_supply", "AC", dir.path()).with_action(ACTION_ADD);
        reactor.dispatch(Event::Device(added));
        assert_eq!(*log.borrow(), vec![Some(0)]);
    }
}
