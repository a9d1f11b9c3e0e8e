//! The RIB daemon event loop.
//!
//! Every unit of work is a [`Command`] taken from one queue. Applying a
//! route update may leave routes waiting on next-hop resolution; the
//! resolver is polled after each update and any notices it returns are
//! queued behind the work already waiting, so they are handled on a later
//! turn of the loop.

use anyhow::Result;
use log::{debug, error, info, warn};
use rib_tables::{Outcome, ResolutionNotice, Rib, RibConfig, RouteEntry, TableError};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::update::RouteUpdate;

/// A unit of work for the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A route update read from line `line` of the script.
    Update { line: usize, update: RouteUpdate },
    /// A next hop resolved.
    Resolved(ResolutionNotice),
}

/// What the daemon did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DaemonStats {
    /// Updates that reached the final table.
    pub propagated: u64,
    /// Updates that lost to a better route.
    pub suppressed: u64,
    /// Updates parked until their next hop resolves.
    pub queued: u64,
    /// Lines that could not be parsed or applied.
    pub rejected: u64,
    /// Resolution notices applied.
    pub resolutions: u64,
}

impl DaemonStats {
    fn count(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Propagated => self.propagated += 1,
            Outcome::Suppressed => self.suppressed += 1,
            Outcome::Queued => self.queued += 1,
        }
    }
}

/// Owns a [`Rib`] and feeds it commands.
#[derive(Debug)]
pub struct RibDaemon {
    rib: Rib,
    stats: DaemonStats,
}

impl RibDaemon {
    /// Builds the RIB described by `config`.
    pub fn new(config: &RibConfig) -> Result<Self> {
        let rib = Rib::new(config)?;
        for table in rib.describe() {
            info!("  {}", table);
        }
        Ok(Self {
            rib,
            stats: DaemonStats::default(),
        })
    }

    /// The RIB being driven.
    pub fn rib(&self) -> &Rib {
        &self.rib
    }

    /// Counters so far.
    pub fn stats(&self) -> DaemonStats {
        self.stats
    }

    /// The routes in the final table.
    pub fn installed_routes(&self) -> Vec<RouteEntry> {
        self.rib.installed_routes()
    }

    /// Runs one command, queueing any resolutions it makes possible.
    ///
    /// # Errors
    ///
    /// Fails only on integrity violations; ordinary rejections are logged
    /// and counted.
    pub fn handle(&mut self, command: Command, queue: &UnboundedSender<Command>) -> Result<()> {
        match command {
            Command::Update { line, update } => {
                debug!("RibDaemon: line {}: {}", line, update);
                match update.apply(&mut self.rib) {
                    Ok(outcome) => self.stats.count(outcome),
                    Err(e) => self.reject(line, &update, e)?,
                }
                for notice in self.rib.take_resolutions() {
                    queue.send(Command::Resolved(notice))?;
                }
            }
            Command::Resolved(notice) => {
                debug!(
                    "RibDaemon: Next hop {} resolved for {} networks",
                    notice.nexthop,
                    notice.nets.len()
                );
                self.rib.apply_resolution(&notice)?;
                self.stats.resolutions += 1;
            }
        }
        Ok(())
    }

    fn reject(&mut self, line: usize, update: &RouteUpdate, e: TableError) -> Result<()> {
        if e.is_fatal() {
            error!("RibDaemon: line {}: {} failed: {}", line, update, e);
            return Err(e.into());
        }
        warn!("RibDaemon: line {}: {} rejected: {}", line, update, e);
        self.stats.rejected += 1;
        Ok(())
    }

    /// Replays an update script until it ends and all work is done.
    ///
    /// The next line is read only once the queue is empty, so every
    /// resolution an update makes possible lands before the next update.
    pub async fn run<R>(&mut self, reader: R) -> Result<DaemonStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let (tx, mut rx): (UnboundedSender<Command>, UnboundedReceiver<Command>) =
            mpsc::unbounded_channel();
        let mut lines = reader.lines();
        let mut line_no = 0;
        let mut eof = false;

        info!("RibDaemon: Starting event loop");
        loop {
            match rx.try_recv() {
                Ok(command) => {
                    self.handle(command, &tx)?;
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
            if eof {
                break;
            }

            match lines.next_line().await? {
                Some(text) => {
                    line_no += 1;
                    let text = text.trim();
                    if text.is_empty() || text.starts_with('#') {
                        continue;
                    }
                    match RouteUpdate::parse(text) {
                        Ok(update) => tx.send(Command::Update {
                            line: line_no,
                            update,
                        })?,
                        Err(e) => {
                            warn!("RibDaemon: line {}: unparsable update: {}", line_no, e);
                            self.stats.rejected += 1;
                        }
                    }
                }
                None => eof = true,
            }
        }

        info!(
            "RibDaemon: Event loop done, {} routes installed, {} still pending",
            self.rib.installed_routes().len(),
            self.rib.pending_routes()
        );
        Ok(self.stats)
    }

    /// Drops every route and reports how many there were.
    pub fn shutdown(&mut self) -> Result<usize> {
        Ok(self.rib.shutdown()?)
    }
}
