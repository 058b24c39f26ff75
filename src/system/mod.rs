use std::{io, os::unix::fs::PermissionsExt, path::Path};

use crate::cutils::cerr;

use self::interface::ProcessId;
use self::signal::SignalNumber;

pub mod interface;

pub mod signal;

pub mod term;

pub mod wait;

/// Check that `path` names an executable regular file.
///
/// Directories have the executable bit set as well, so a plain `access(2)`
/// check is not enough here.
pub(crate) fn can_execute<P: AsRef<Path>>(path: P) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & libc::S_IXUSR as u32 != 0,
        Err(_) => false,
    }
}

pub(crate) fn _exit(status: libc::c_int) -> ! {
    // SAFETY: `_exit` does not return, and performs no cleanup that could
    // observe broken invariants.
    unsafe { libc::_exit(status) }
}

pub(crate) enum ForkResult {
    // Parent process branch with the child process' PID.
    Parent(ProcessId),
    // Child process branch.
    Child,
}

unsafe fn inner_fork() -> io::Result<ForkResult> {
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

#[cfg(target_os = "linux")]
/// Create a new process.
pub(crate) fn fork() -> io::Result<ForkResult> {
    // SAFETY: `fork` is implemented using `clone` in linux so we don't need to worry about signal
    // safety.
    unsafe { inner_fork() }
}

#[cfg(not(target_os = "linux"))]
/// Create a new process.
///
/// # Safety
///
/// In a multithreaded program, only async-signal-safe functions are guaranteed to work in the
/// child process until a call to `execve` or a similar function is done.
pub(crate) unsafe fn fork() -> io::Result<ForkResult> {
    inner_fork()
}

/// Send a signal to a process with the specified ID.
pub(crate) fn kill(pid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::kill(pid.get(), signal) }).map(|_| ())
}

/// Send a signal to a process group with the specified ID.
pub(crate) fn killpg(pgid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pgid` is not a valid process ID or if
    // `signal` is not a valid signal code.
    cerr(unsafe { libc::killpg(pgid.get(), signal) }).map(|_| ())
}

/// Get the process group ID of the current process.
pub(crate) fn getpgrp() -> ProcessId {
    // SAFETY: `getpgrp` takes no arguments and always succeeds.
    ProcessId::new(unsafe { libc::getpgrp() })
}

/// Get a process group ID.
pub(crate) fn getpgid(pid: ProcessId) -> io::Result<ProcessId> {
    // SAFETY: This function cannot cause UB even if `pid` is not a valid process ID
    cerr(unsafe { libc::getpgid(pid.get()) }).map(ProcessId::new)
}

/// Set a process group ID.
pub(crate) fn setpgid(pid: ProcessId, pgid: ProcessId) -> io::Result<()> {
    // SAFETY: This function cannot cause UB even if `pid` or `pgid` are not valid process IDs.
    cerr(unsafe { libc::setpgid(pid.get(), pgid.get()) }).map(|_| ())
}

pub(crate) fn make_zeroed_sigaction() -> libc::sigaction {
    // SAFETY: since sigaction is a C struct, all-zeroes is a valid representation
    // We cannot use a "literal struct" initialization method since the exact representation
    // of libc::sigaction is not fixed
    unsafe { std::mem::zeroed() }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        os::unix::net::UnixStream,
        process::exit,
    };

    use super::{
        fork, getpgid, getpgrp,
        interface::ProcessId,
        kill, killpg, setpgid,
        signal::consts::SIGKILL,
        wait::{Wait, WaitOptions},
        ForkResult,
    };

    #[test]
    fn can_execute_finds_binaries_but_not_directories() {
        assert!(super::can_execute("/bin/sh"));
        assert!(!super::can_execute("/bin"));
        assert!(!super::can_execute("/definitely/not/here"));
    }

    #[test]
    fn pgid_test() {
        let pgrp = getpgrp();
        assert_eq!(getpgid(ProcessId::new(0)).unwrap(), pgrp);
        assert_eq!(
            getpgid(ProcessId::new(std::process::id() as libc::pid_t)).unwrap(),
            pgrp
        );

        match fork().unwrap() {
            ForkResult::Child => {
                // wait for the parent.
                std::thread::sleep(std::time::Duration::from_secs(1))
            }
            ForkResult::Parent(child_pid) => {
                // The child should be in our process group.
                assert_eq!(
                    getpgid(child_pid).unwrap(),
                    getpgid(ProcessId::new(0)).unwrap()
                );
                // Move the child to its own process group
                setpgid(child_pid, child_pid).unwrap();
                // The process group of the child should have changed.
                assert_eq!(getpgid(child_pid).unwrap(), child_pid);
                // Dispose of the child.
                kill(child_pid, SIGKILL).unwrap();
                child_pid.wait(WaitOptions::new()).unwrap();
            }
        }
    }

    #[test]
    fn kill_test() {
        let mut child = std::process::Command::new("/bin/sleep")
            .arg("1")
            .spawn()
            .unwrap();
        kill(ProcessId::new(child.id() as libc::pid_t), SIGKILL).unwrap();
        assert!(!child.wait().unwrap().success());
    }

    #[test]
    fn killpg_test() {
        // Create a socket so the children write to it if they aren't terminated by `killpg`.
        let (mut rx, mut tx) = UnixStream::pair().unwrap();

        let ForkResult::Parent(pid1) = fork().unwrap() else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        let ForkResult::Parent(pid2) = fork().unwrap() else {
            std::thread::sleep(std::time::Duration::from_secs(1));
            tx.write_all(&[42]).unwrap();
            exit(0);
        };

        drop(tx);

        let pgid = pid1;
        // Move the children to their own process group.
        setpgid(pid1, pgid).unwrap();
        setpgid(pid2, pgid).unwrap();
        // Send `SIGKILL` to the children process group.
        killpg(pgid, SIGKILL).unwrap();
        // Ensure that the children were terminated before writing.
        assert_eq!(
            rx.read_exact(&mut [0; 2]).unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
    }
}
