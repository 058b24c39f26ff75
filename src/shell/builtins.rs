//! The job control builtins, plus `cd`.
//!
//! Every error is reported as a single `command: message` line and the shell
//! keeps going; nothing here is fatal.

use std::env;
use std::io::{self, Write};
use std::sync::Mutex;

use super::{parse_job_ref, Shell};
use crate::common::Error;
use crate::exec;
use crate::jobs::{self, Job, JobId, JobState, JobTable};
use crate::log::user_error;
use crate::system::{
    killpg,
    signal::consts::{SIGCONT, SIGTERM},
};

pub(super) fn bg(shell: &Shell, args: &[String]) {
    if let Err(err) = try_bg(&shell.jobs, args) {
        user_error!("bg: {err}");
    }
}

/// Resume a stopped job in the background.
fn try_bg(jobs: &Mutex<JobTable>, args: &[String]) -> Result<(), Error> {
    let id = single_job_ref(args)?;
    let mut table = jobs::lock(jobs);

    let job = live_job_mut(&mut table, id)?;
    if job.state() == JobState::Running {
        return Err(Error::AlreadyRunning);
    }

    job.set_background(true);
    job.set_state(JobState::Running);
    killpg(job.pgid(), SIGCONT).map_err(Error::ContinueFailed)?;

    Ok(())
}

pub(super) fn fg(shell: &Shell, args: &[String]) {
    if let Err(err) = try_fg(shell, args) {
        user_error!("fg: {err}");
    }
}

/// Bring a job to the foreground, resuming it first if it is stopped, and
/// wait for its next state change.
fn try_fg(shell: &Shell, args: &[String]) -> Result<(), Error> {
    let id = single_job_ref(args)?;
    let mut table = jobs::lock(&shell.jobs);

    let job = live_job_mut(&mut table, id)?;
    job.set_background(false);
    if job.state() == JobState::Stopped {
        killpg(job.pgid(), SIGCONT).map_err(Error::ContinueFailed)?;
        job.set_state(JobState::Running);
    }
    let pgid = job.pgid();

    exec::foreground_wait(&mut table, &shell.term, pgid)
}

pub(super) fn kill(shell: &Shell, args: &[String]) {
    if let Err(err) = try_kill(&shell.jobs, args) {
        user_error!("kill: {err}");
    }
}

/// Send a termination signal to a job's process group. The job's state is
/// not touched here; the death is observed like any other state change.
fn try_kill(jobs: &Mutex<JobTable>, args: &[String]) -> Result<(), Error> {
    let id = single_job_ref(args)?;
    let table = jobs::lock(jobs);

    let job = table.lookup_by_id(id).ok_or(Error::NoSuchJob)?;
    killpg(job.pgid(), SIGTERM).map_err(Error::SignalFailed)?;

    Ok(())
}

pub(super) fn jobs(shell: &Shell, args: &[String]) {
    if args.len() > 1 {
        user_error!("jobs: too many arguments");
        return;
    }

    let table = jobs::lock(&shell.jobs);
    let stdout = io::stdout();
    let mut output = stdout.lock();
    for job in table.list().filter(|job| !job.state().is_terminal()) {
        let _ = writeln!(output, "{job}");
    }
}

pub(super) fn cd(args: &[String]) {
    if args.len() > 2 {
        user_error!("cd: too many arguments");
        return;
    }

    let directory = match args.get(1) {
        Some(directory) => directory.clone(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => return,
        },
    };

    if env::set_current_dir(&directory).is_err() {
        user_error!("cd: no such file or directory: {directory}");
        return;
    }
    env::set_var("PWD", &directory);
}

fn single_job_ref(args: &[String]) -> Result<JobId, Error> {
    if args.len() != 2 {
        return Err(Error::WrongArity);
    }
    parse_job_ref(&args[1])
}

/// Look up a job the user may still act on. A job that already reached a
/// terminal state only exists until the next sweep and is no longer
/// addressable.
fn live_job_mut(table: &mut JobTable, id: JobId) -> Result<&mut Job, Error> {
    table
        .lookup_by_id_mut(id)
        .filter(|job| !job.state().is_terminal())
        .ok_or(Error::NoSuchJob)
}
