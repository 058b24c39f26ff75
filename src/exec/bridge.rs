use std::{
    io,
    sync::{Arc, Mutex},
    thread,
};

use crate::jobs::{self, JobState, JobTable};
use crate::log::{dev_error, dev_info, dev_warn};
use crate::system::interface::ProcessId;
use crate::system::signal::{
    consts::*, register_handlers, signal_name, SignalHandler, SignalStream,
};
use crate::system::wait::{Wait, WaitError, WaitOptions};

const ANY_CHILD: ProcessId = ProcessId::new(-1);

/// The asynchronous half of job control.
///
/// Child state changes arrive as `SIGCHLD`; the signal handler forwards the
/// `siginfo_t` over the [`SignalStream`] self-pipe, and a dedicated thread
/// applies the resulting transitions to the job table. The table mutex is
/// the deferral mechanism: whoever holds it has the bridge deferred, and the
/// bridge holds it for exactly one drain at a time.
///
/// `SIGINT` and `SIGTSTP` are routed here as well so the shell itself is
/// never killed or stopped from the keyboard; they are dropped on the floor.
/// Because all three dispositions are catching functions, `execve` resets
/// them to their defaults in launched children.
pub(crate) struct SignalBridge {
    _handlers: [SignalHandler; 3],
}

impl SignalBridge {
    pub(crate) fn spawn(jobs: Arc<Mutex<JobTable>>) -> io::Result<Self> {
        let stream = SignalStream::init()?;
        let handlers = register_handlers([SIGCHLD, SIGINT, SIGTSTP])?;

        thread::Builder::new()
            .name("signal-bridge".to_string())
            .spawn(move || loop {
                let info = match stream.recv() {
                    Ok(info) => info,
                    Err(err) => {
                        dev_error!("cannot receive signal information: {err}");
                        continue;
                    }
                };

                match info.signal() {
                    SIGCHLD => drain_child_notifications(&jobs),
                    signal => {
                        dev_info!(
                            "ignoring {} sent by process {}",
                            signal_name(signal),
                            info.pid()
                        );
                    }
                }
            })?;

        Ok(Self {
            _handlers: handlers,
        })
    }
}

/// Collect every pending child state change without blocking and apply each
/// one to the job table.
///
/// `SIGCHLD` coalesces, so a single notification can stand for several
/// changed children; the loop runs until the kernel has nothing left to
/// report. State changes for process groups the table does not know are
/// expected (children outside job control) and dropped silently.
fn drain_child_notifications(jobs: &Mutex<JobTable>) {
    let mut jobs = jobs::lock(jobs);

    loop {
        let (pid, status) = match ANY_CHILD.wait(WaitOptions::new().no_hang().untraced()) {
            Ok(result) => result,
            Err(WaitError::NotReady) => break,
            Err(WaitError::Io(err)) => {
                if err.raw_os_error() != Some(libc::ECHILD) {
                    dev_warn!("cannot drain child state changes: {err}");
                }
                break;
            }
        };

        if let Some(state) = JobState::from_wait(&status) {
            if !jobs.mark(pid, state) {
                dev_info!("state change for untracked process {pid}");
            }
        }
    }
}
