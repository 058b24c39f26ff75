//! Launching commands as job-controlled process groups.

mod bridge;
mod terminal;

use std::{io, os::unix::process::CommandExt, path::Path, process::Command};

use crate::common::Error;
use crate::jobs::{JobState, JobTable};
use crate::log::{dev_info, dev_warn};
use crate::system::{
    _exit, fork,
    interface::ProcessId,
    setpgid,
    signal::{
        consts::{SIGCHLD, SIGINT, SIGTSTP},
        SignalHandler, SignalHandlerBehavior, SignalSet,
    },
    wait::{Wait, WaitError, WaitOptions},
    ForkResult,
};

pub(crate) use bridge::SignalBridge;
pub(crate) use terminal::TerminalArbiter;

/// Run `program` as a new job.
///
/// The child becomes the sole member of a fresh process group whose id is its
/// own pid, and the job is registered before state-change notifications can
/// observe it (the caller holds the table, and the signal mask stays blocked
/// from before the fork until the insert is done). Background jobs are
/// announced and left running; foreground jobs own the terminal while the
/// shell blocks on them.
pub(crate) fn launch(
    jobs: &mut JobTable,
    term: &TerminalArbiter,
    program: &Path,
    argv: &[String],
    background: bool,
) -> Result<(), Error> {
    let display_command = argv.join(" ");

    // Prepare the command fully up front; the child should do as little as
    // possible between fork and exec.
    let mut command = Command::new(program);
    command.args(&argv[1..]);
    if let Some(arg0) = argv.first() {
        command.arg0(arg0);
    }

    // Whether the user typed an explicit path decides who reports an exec
    // failure (the child here, or the resolution layer in the shell).
    let explicit_path = argv
        .first()
        .is_some_and(|arg0| arg0.starts_with('.') || arg0.starts_with('/'));

    let original_set = match SignalSet::full().and_then(|set| set.block()) {
        Ok(set) => Some(set),
        Err(err) => {
            dev_warn!("cannot block signals: {err}");
            None
        }
    };

    let fork_result = match fork() {
        Ok(result) => result,
        Err(err) => {
            restore_mask(original_set);
            return Err(Error::Fork(err));
        }
    };

    let ForkResult::Parent(child_pid) = fork_result else {
        // The child still shares the shell's signal stream socket; drop back
        // to the default dispositions before unblocking anything, so a stray
        // signal here cannot inject a bogus notification into the bridge.
        for signal in [SIGCHLD, SIGINT, SIGTSTP] {
            if let Ok(handler) = SignalHandler::register(signal, SignalHandlerBehavior::Default) {
                handler.forget();
            }
        }

        // Restore the signal mask before the exec.
        if let Some(set) = &original_set {
            if let Err(err) = set.set_mask() {
                dev_warn!("cannot restore signal mask: {err}");
            }
        }

        // The child becomes the leader of its own process group.
        let own = ProcessId::new(0);
        setpgid(own, own).ok();

        let err = command.exec();

        // Only reached when the exec failed. This process must never fall
        // back into the shell's code path.
        if explicit_path {
            println_ignore_io_error!("{}: No such file or directory", program.display());
        }
        _exit(err.raw_os_error().unwrap_or(1));
    };

    // Assign the group from the parent side as well, so neither ordering of
    // the race with the child loses the assignment. Failure means the child
    // already won, or already exited.
    setpgid(child_pid, child_pid).ok();

    let job = jobs.create(
        program.to_path_buf(),
        display_command,
        child_pid,
        JobState::Running,
        background,
    );
    let job_id = job.id();
    dev_info!(
        "launched {} as job {job_id} in process group {child_pid}",
        job.program_path().display(),
    );
    jobs.insert(job);

    let result = if background {
        println_ignore_io_error!("[{job_id}] {child_pid}");
        Ok(())
    } else {
        foreground_wait(jobs, term, child_pid)
    };

    restore_mask(original_set);

    result
}

fn restore_mask(original_set: Option<SignalSet>) {
    if let Some(set) = original_set {
        if let Err(err) = set.set_mask() {
            dev_warn!("cannot restore signal mask: {err}");
        }
    }
}

/// Block until the foreground job changes state and record the outcome.
///
/// The job's group owns the terminal for exactly the span of the wait; the
/// grant is dropped before the wait result is even inspected, so the shell
/// reclaims the terminal on the error path too.
pub(crate) fn foreground_wait(
    jobs: &mut JobTable,
    term: &TerminalArbiter,
    pgid: ProcessId,
) -> Result<(), Error> {
    let grant = term.foreground(pgid);
    let outcome = pgid.wait(WaitOptions::new().untraced());
    drop(grant);

    let (_, status) = outcome.map_err(|err| match err {
        WaitError::Io(err) => Error::Wait(err),
        WaitError::NotReady => Error::Wait(io::Error::new(
            io::ErrorKind::Other,
            "no status change to report",
        )),
    })?;

    if let Some(state) = JobState::from_wait(&status) {
        jobs.mark(pgid, state);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{foreground_wait, launch, TerminalArbiter};
    use crate::common::Error;
    use crate::jobs::{JobState, JobTable};
    use crate::system::{
        interface::ProcessId,
        killpg,
        signal::consts::{SIGCONT, SIGKILL},
        wait::{Wait, WaitOptions},
    };

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn background_launch_registers_a_running_job() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        launch(
            &mut jobs,
            &term,
            Path::new("/bin/sleep"),
            &strings(&["sleep", "30"]),
            true,
        )
        .unwrap();

        assert_eq!(jobs.len(), 1);
        let job = jobs.list().next().unwrap();
        assert_eq!(job.id().get(), 1);
        assert_eq!(job.state(), JobState::Running);
        assert!(job.is_background());
        let pgid = job.pgid();

        // Still running, so a sweep must leave the table alone.
        let mut output = Vec::<u8>::new();
        jobs.sweep_and_report(&mut output);
        assert!(output.is_empty());
        assert_eq!(jobs.len(), 1);

        killpg(pgid, SIGKILL).unwrap();
        pgid.wait(WaitOptions::new()).unwrap();
    }

    #[test]
    fn foreground_launch_records_the_exit() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        launch(
            &mut jobs,
            &term,
            Path::new("/bin/sleep"),
            &strings(&["sleep", "0"]),
            false,
        )
        .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs.list().next().unwrap().state(), JobState::Completed);

        // Normal completion is swept silently.
        let mut output = Vec::<u8>::new();
        jobs.sweep_and_report(&mut output);
        assert!(output.is_empty());
        assert!(jobs.is_empty());
    }

    #[test]
    fn foreground_launch_records_a_signal_death() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        launch(
            &mut jobs,
            &term,
            Path::new("/bin/sh"),
            &strings(&["sh", "-c", "kill -KILL $$"]),
            false,
        )
        .unwrap();

        let job = jobs.list().next().unwrap();
        assert_eq!(job.state(), JobState::Terminated(SIGKILL));
        let pgid = job.pgid();

        let mut output = Vec::new();
        jobs.sweep_and_report(&mut output);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            format!("[1] {pgid} terminated by signal {SIGKILL}\n")
        );
        assert!(jobs.is_empty());
    }

    #[test]
    fn foreground_launch_observes_a_stop() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        launch(
            &mut jobs,
            &term,
            Path::new("/bin/sh"),
            &strings(&["sh", "-c", "kill -STOP $$"]),
            false,
        )
        .unwrap();

        let job = jobs.list().next().unwrap();
        assert_eq!(job.state(), JobState::Stopped);
        assert!(!job.is_background());
        let pgid = job.pgid();

        // Wake the child back up and let it finish.
        killpg(pgid, SIGCONT).unwrap();
        pgid.wait(WaitOptions::new()).unwrap();
    }

    #[test]
    fn wait_errors_are_reported_and_not_fatal() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        // pid 1 is not our child, so the wait itself fails.
        let err = foreground_wait(&mut jobs, &term, ProcessId::new(1)).unwrap_err();
        assert!(matches!(err, Error::Wait(_)));
    }

    #[test]
    fn exec_failure_is_fatal_to_the_child_only() {
        let mut jobs = JobTable::new();
        let term = TerminalArbiter::detached();

        launch(
            &mut jobs,
            &term,
            Path::new("./does-not-exist"),
            &strings(&["./does-not-exist"]),
            false,
        )
        .unwrap();

        // The child reported and exited on its own; from the shell's side
        // the job simply completed.
        assert_eq!(jobs.list().next().unwrap().state(), JobState::Completed);
    }
}
