//! Background job table and its reconciliation against reaped children.
//!
//! The table is only read or written from the main loop. Children are reaped
//! in signal context (see [`signals`](super::signals)); their facts reach the
//! table once per loop iteration through
//! [`JobManager::do_job_notification`].

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

use log::{debug, error, info, warn};
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};

use crate::{
    core::job::{Job, Termination},
    shell::signals::{TerminationFact, TerminationLog},
};

/// Upper bound on drain passes in one notification, in case children keep
/// terminating faster than the log can hold them.
const MAX_DRAIN_PASSES: usize = 16;

#[derive(Default)]
pub struct JobManager {
    jobs: BTreeMap<Pid, Job>,
}

impl JobManager {
    /// Starts tracking a freshly spawned background child.
    pub fn create_job(&mut self, pid: Pid, input: &str) {
        if let Some(stale) = self.jobs.insert(pid, Job::new(pid, input)) {
            warn!(
                "pid {} reused while still tracked ({}): {}",
                pid,
                stale.state(),
                stale.input()
            );
        }
        debug!("tracking background job {}", pid);
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Applies termination facts to the table. Every tracked job that
    /// finished is reported and removed right away; facts for untracked pids
    /// are dropped.
    pub fn reconcile<I, W>(&mut self, facts: I, out: &mut W)
    where
        I: IntoIterator<Item = TerminationFact>,
        W: Write,
    {
        for fact in facts {
            let termination = match Termination::from_raw(fact.raw_status) {
                Some(termination) => termination,
                None => {
                    error!(
                        "undecodable status {:#x} for child {}",
                        fact.raw_status, fact.pid
                    );
                    continue;
                }
            };

            match self.jobs.remove(&fact.pid) {
                Some(mut job) => {
                    job.mark_terminated(termination);
                    info!("{} ({})", job, job.input());
                    let temp_result = writeln!(out, "{}", job);
                    log_if_err!(temp_result, "failed to report job {}", fact.pid);
                }
                None => debug!("dropping termination of untracked child {}", fact.pid),
            }
        }

        let temp_result = out.flush();
        log_if_err!(temp_result, "failed to flush job reports");
    }

    /// Drains `log` and reconciles its facts. When the log overflowed, the
    /// reaping handler is re-triggered so the children it had to leave behind
    /// are collected and drained too.
    pub fn do_job_notification<W: Write>(&mut self, log: &TerminationLog, out: &mut W) {
        for _ in 0..MAX_DRAIN_PASSES {
            let drained = log.take();
            self.reconcile(drained.facts, out);
            if !drained.saturated {
                return;
            }

            debug!("termination log saturated, collecting remaining children");
            let temp_result = signal::raise(Signal::SIGCHLD);
            log_if_err!(temp_result, "failed to re-raise SIGCHLD");
        }
    }

    /// Sends `SIGTERM` to every tracked job and forgets them all.
    pub fn terminate_all(&mut self) {
        for pid in self.jobs.keys() {
            match signal::kill(*pid, Signal::SIGTERM) {
                Ok(()) => info!("sent SIGTERM to background job {}", pid),
                // finished, but not yet reconciled
                Err(Errno::ESRCH) => debug!("background job {} already gone", pid),
                Err(e) => warn!("failed to terminate background job {}: {}", pid, e),
            }
        }

        self.jobs.clear();
    }
}

impl fmt::Debug for JobManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} jobs", self.jobs.len())?;
        for job in self.jobs.values() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}
