//! The job table: bookkeeping for every process group the shell has launched
//! and not yet reaped.

use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::system::interface::ProcessId;
use crate::system::signal::SignalNumber;
use crate::system::wait::WaitStatus;

/// Identifier the user refers to a job by (`%1`, `%2`, ...).
///
/// Unique among currently tracked jobs. Assignment restarts at 1 whenever the
/// table becomes empty; otherwise the highest id handed out so far is
/// incremented, so an id is only ever reused after its job is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u32);

impl JobId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

/// Lifecycle state of a job.
///
/// `Terminated` and `Completed` are terminal: once a job reaches either, the
/// only thing left to happen to it is removal by [`JobTable::sweep_and_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobState {
    Running,
    Stopped,
    /// Killed by a signal; carries the terminating signal number.
    Terminated(SignalNumber),
    /// Exited normally.
    Completed,
}

impl JobState {
    pub(crate) fn is_terminal(self) -> bool {
        matches!(self, JobState::Terminated(_) | JobState::Completed)
    }

    /// Translate a process-group-wide wait status into a job state.
    ///
    /// Returns `None` for status changes that do not move the job on their
    /// own (e.g. a continue notification).
    pub(crate) fn from_wait(status: &WaitStatus) -> Option<JobState> {
        if status.did_exit() {
            Some(JobState::Completed)
        } else if status.was_stopped() {
            Some(JobState::Stopped)
        } else if let Some(signal) = status.term_signal() {
            Some(JobState::Terminated(signal))
        } else {
            None
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Terminated(_) => "Terminated",
            JobState::Completed => "Completed",
        })
    }
}

/// One tracked process group.
///
/// The job *is* its process group: `pgid` never changes after creation and
/// holds exactly one job record at a time. The table is the sole owner of
/// these records; everything else refers to jobs by id or pgid.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    id: JobId,
    program_path: PathBuf,
    display_command: String,
    pgid: ProcessId,
    state: JobState,
    background: bool,
}

impl Job {
    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn pgid(&self) -> ProcessId {
        self.pgid
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn is_background(&self) -> bool {
        self.background
    }

    pub(crate) fn program_path(&self) -> &Path {
        &self.program_path
    }

    pub(crate) fn set_background(&mut self, background: bool) {
        self.background = background;
    }

    /// Move a non-terminal job to `state`. Terminal states are closed; the
    /// caller must not try to resurrect one.
    pub(crate) fn set_state(&mut self, state: JobState) {
        debug_assert!(!self.state.is_terminal());
        self.state = state;
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {}",
            self.id, self.pgid, self.state, self.display_command
        )?;
        if self.background {
            f.write_str(" &")?;
        }
        Ok(())
    }
}

/// Ordered collection of jobs; iteration order is insertion order.
pub(crate) struct JobTable {
    jobs: Vec<Job>,
    next_id: u32,
}

impl JobTable {
    pub(crate) fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 0,
        }
    }

    /// Allocate a job record with the next id. The record is not tracked
    /// until it is passed to [`JobTable::insert`].
    pub(crate) fn create(
        &mut self,
        program_path: PathBuf,
        display_command: String,
        pgid: ProcessId,
        state: JobState,
        background: bool,
    ) -> Job {
        if self.is_empty() {
            self.next_id = 1;
        } else {
            self.next_id += 1;
        }

        Job {
            id: JobId::new(self.next_id),
            program_path,
            display_command,
            pgid,
            state,
            background,
        }
    }

    pub(crate) fn insert(&mut self, job: Job) {
        self.jobs.push(job);
    }

    /// Apply an observed state change to the job owning `pgid`.
    ///
    /// Returns whether a job was found. A missing pgid is expected for
    /// children outside job control and is not an error. A job already in a
    /// terminal state is left untouched.
    pub(crate) fn mark(&mut self, pgid: ProcessId, state: JobState) -> bool {
        let Some(job) = self.lookup_by_pgid_mut(pgid) else {
            return false;
        };

        if !job.state.is_terminal() {
            job.state = state;
        }
        true
    }

    pub(crate) fn lookup_by_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == id)
    }

    pub(crate) fn lookup_by_id_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }

    pub(crate) fn lookup_by_pgid_mut(&mut self, pgid: ProcessId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.pgid == pgid)
    }

    /// Remove every job that has reached a terminal state, reporting each
    /// signal-terminated one to `output` exactly once. Jobs that completed
    /// normally are removed silently. The relative order of the remaining
    /// jobs is preserved.
    pub(crate) fn sweep_and_report(&mut self, mut output: impl Write) {
        self.jobs.retain(|job| {
            if let JobState::Terminated(signal) = job.state {
                let _ = writeln!(
                    output,
                    "[{}] {} terminated by signal {signal}",
                    job.id, job.pgid
                );
            }
            !job.state.is_terminal()
        });
    }

    /// Snapshot iterator over the live jobs in insertion order. Not to be
    /// held across a sweep.
    pub(crate) fn list(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// Empty the table, handing the records to the caller. Used by the
    /// shutdown path after its signal sweep.
    pub(crate) fn drain_all(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.jobs)
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// The table is shared between the main thread and the signal bridge; the
/// mutex is the critical-section mechanism that defers one while the other
/// mutates. Lock poisoning cannot leave the table in a broken state (no
/// operation panics midway), so a poisoned lock is simply taken over.
pub(crate) fn lock(table: &Mutex<JobTable>) -> MutexGuard<'_, JobTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{JobId, JobState, JobTable};
    use crate::system::interface::ProcessId;

    fn add_job(table: &mut JobTable, pgid: libc::pid_t, background: bool) -> JobId {
        let job = table.create(
            "/bin/sleep".into(),
            "sleep 30".to_string(),
            ProcessId::new(pgid),
            JobState::Running,
            background,
        );
        let id = job.id();
        table.insert(job);
        id
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let mut table = JobTable::new();
        let first = add_job(&mut table, 101, true);
        let second = add_job(&mut table, 102, true);
        let third = add_job(&mut table, 103, true);
        assert_eq!(
            vec![first.get(), second.get(), third.get()],
            vec![1, 2, 3]
        );

        // Removing a job in the middle must not free its id for reuse while
        // others are still live.
        table.mark(ProcessId::new(102), JobState::Completed);
        table.sweep_and_report(std::io::sink());
        let fourth = add_job(&mut table, 104, true);
        assert_eq!(fourth.get(), 4);

        let mut ids: Vec<u32> = table.list().map(|job| job.id().get()).collect();
        ids.dedup();
        assert_eq!(ids.len(), table.len());
    }

    #[test]
    fn id_assignment_restarts_at_one_when_empty() {
        let mut table = JobTable::new();
        add_job(&mut table, 201, true);
        add_job(&mut table, 202, true);

        table.mark(ProcessId::new(201), JobState::Completed);
        table.mark(ProcessId::new(202), JobState::Terminated(libc::SIGKILL));
        table.sweep_and_report(std::io::sink());
        assert!(table.is_empty());

        let reborn = add_job(&mut table, 203, true);
        assert_eq!(reborn.get(), 1);
    }

    #[test]
    fn mark_unknown_pgid_is_not_found() {
        let mut table = JobTable::new();
        add_job(&mut table, 301, false);
        assert!(!table.mark(ProcessId::new(999), JobState::Completed));
        assert_eq!(
            table
                .lookup_by_pgid_mut(ProcessId::new(301))
                .unwrap()
                .state(),
            JobState::Running
        );
    }

    #[test]
    fn terminal_states_are_closed() {
        let mut table = JobTable::new();
        add_job(&mut table, 401, false);
        let pgid = ProcessId::new(401);

        assert!(table.mark(pgid, JobState::Terminated(libc::SIGTERM)));
        // A late stop or completion notification must not move the job.
        assert!(table.mark(pgid, JobState::Stopped));
        assert!(table.mark(pgid, JobState::Completed));
        assert_eq!(
            table.lookup_by_pgid_mut(pgid).unwrap().state(),
            JobState::Terminated(libc::SIGTERM)
        );
    }

    #[test]
    fn sweep_reports_terminated_jobs_once() {
        let mut table = JobTable::new();
        add_job(&mut table, 501, true);
        table.mark(ProcessId::new(501), JobState::Terminated(libc::SIGKILL));

        let mut output = Vec::new();
        table.sweep_and_report(&mut output);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("[1] 501 terminated by signal {}\n", libc::SIGKILL)
        );
        assert!(table.is_empty());

        // A second sweep with no intervening state change is a no-op.
        let mut output = Vec::<u8>::new();
        table.sweep_and_report(&mut output);
        assert!(output.is_empty());
    }

    #[test]
    fn completed_jobs_are_swept_silently() {
        let mut table = JobTable::new();
        add_job(&mut table, 601, true);
        table.mark(ProcessId::new(601), JobState::Completed);

        let mut output = Vec::<u8>::new();
        table.sweep_and_report(&mut output);
        assert!(output.is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn sweep_preserves_order_of_survivors() {
        let mut table = JobTable::new();
        add_job(&mut table, 701, true);
        add_job(&mut table, 702, true);
        add_job(&mut table, 703, true);

        table.mark(ProcessId::new(702), JobState::Completed);
        table.sweep_and_report(std::io::sink());

        let ids: Vec<u32> = table.list().map(|job| job.id().get()).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn job_lines_render_like_the_jobs_builtin() {
        let mut table = JobTable::new();
        let mut job = table.create(
            "/bin/sleep".into(),
            "sleep 30".to_string(),
            ProcessId::new(4242),
            JobState::Running,
            true,
        );
        assert_eq!(job.to_string(), "[1] 4242 Running sleep 30 &");

        job.set_background(false);
        job.set_state(JobState::Stopped);
        assert_eq!(job.to_string(), "[1] 4242 Stopped sleep 30");
    }
}
