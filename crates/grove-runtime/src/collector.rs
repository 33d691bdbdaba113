//! Background maintenance thread
//!
//! Purging stale and surplus entries is kept off the lookup path: the
//! collector runs [`ClassInfoCache::maintain`] on a timer, and on request.

use crate::cache::ClassInfoCache;
use crate::call_site::CallSiteCache;
use crate::error::{CacheError, CacheResult};
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub stale: usize,
    pub evicted: usize,
    pub call_sites: usize,
}

enum Command {
    /// Run a pass now and report back
    Run(Sender<MaintenanceReport>),
    Shutdown,
}

pub struct Collector {
    commands: Sender<Command>,
    handle: Option<JoinHandle<()>>,
}

fn maintenance_pass(classes: &ClassInfoCache, call_sites: Option<&CallSiteCache>) -> MaintenanceReport {
    let purged = classes.maintain();
    MaintenanceReport {
        stale: purged.stale,
        evicted: purged.evicted,
        call_sites: call_sites.map_or(0, CallSiteCache::purge_stale),
    }
}

impl Collector {
    /// Start the maintenance thread, running a pass every `interval`
    pub fn spawn(
        classes: Arc<ClassInfoCache>,
        call_sites: Option<Arc<CallSiteCache>>,
        interval: Duration,
    ) -> CacheResult<Self> {
        let (commands, inbox) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("grove-cache-collector".to_string())
            .spawn(move || run_loop(&classes, call_sites.as_deref(), &inbox, interval))
            .map_err(CacheError::Spawn)?;
        tracing::debug!(?interval, "cache collector started");
        Ok(Self {
            commands,
            handle: Some(handle),
        })
    }

    /// Run a pass on the collector thread and wait for its report
    pub fn run_now(&self) -> CacheResult<MaintenanceReport> {
        let (reply, report) = channel::bounded(1);
        self.commands
            .send(Command::Run(reply))
            .map_err(|_| CacheError::CollectorStopped)?;
        report.recv().map_err(|_| CacheError::CollectorStopped)
    }

    /// Stop the thread and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("cache collector panicked");
            }
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    classes: &ClassInfoCache,
    call_sites: Option<&CallSiteCache>,
    inbox: &Receiver<Command>,
    interval: Duration,
) {
    let ticker = channel::tick(interval);
    loop {
        channel::select! {
            recv(inbox) -> command => match command {
                Ok(Command::Run(reply)) => {
                    let _ = reply.send(maintenance_pass(classes, call_sites));
                }
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(ticker) -> _ => {
                let report = maintenance_pass(classes, call_sites);
                tracing::trace!(?report, "periodic cache maintenance");
            }
        }
    }
    tracing::debug!("cache collector stopped");
}
