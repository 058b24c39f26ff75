use std::{
    ffi::c_int,
    fs::{File, OpenOptions},
    io,
    mem::MaybeUninit,
    os::fd::{AsRawFd, RawFd},
    sync::atomic::{AtomicBool, Ordering},
};

use libc::{c_void, sigaction, sigemptyset, sighandler_t, siginfo_t, sigset_t, SIGTTOU};

use crate::cutils::cerr;
use crate::system::{interface::ProcessId, make_zeroed_sigaction};

mod sealed {
    use std::os::fd::AsRawFd;

    pub(crate) trait Sealed {}

    impl<F: AsRawFd> Sealed for F {}
}

pub(crate) trait Terminal: sealed::Sealed {
    fn tcsetpgrp(&self, pgrp: ProcessId) -> io::Result<()>;
}

impl<F: AsRawFd> Terminal for F {
    /// Set the foreground process group ID associated with this terminal to `pgrp`.
    fn tcsetpgrp(&self, pgrp: ProcessId) -> io::Result<()> {
        // SAFETY: `tcsetpgrp` cannot cause UB for any file descriptor or pgrp value.
        cerr(unsafe { libc::tcsetpgrp(self.as_raw_fd(), pgrp.get()) }).map(|_| ())
    }
}

static GOT_SIGTTOU: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigttou(_signal: c_int, _info: *mut siginfo_t, _: *mut c_void) {
    GOT_SIGTTOU.store(true, Ordering::SeqCst);
}

/// Handle on the process' controlling terminal.
pub(crate) struct UserTerm {
    tty: File,
}

impl UserTerm {
    /// Open the user's terminal.
    pub(crate) fn open() -> io::Result<Self> {
        Ok(Self {
            tty: OpenOptions::new().read(true).write(true).open("/dev/tty")?,
        })
    }

    /// This is like `tcsetpgrp` but it only succeeds if we are in the foreground process group.
    ///
    /// A background process calling `tcsetpgrp` receives `SIGTTOU`; a scoped observer for that
    /// signal is installed around the call and the original action is restored unconditionally
    /// afterwards, so the calling process is never stopped by its own handoff.
    pub(crate) fn tcsetpgrp_nobg(&self, pgrp: ProcessId) -> io::Result<()> {
        let mut original_action = MaybeUninit::<sigaction>::uninit();

        let action = {
            let mut raw = make_zeroed_sigaction();
            // Call `on_sigttou` if `SIGTTOU` arrives.
            raw.sa_sigaction = on_sigttou as sighandler_t;
            // Exclude any other signals from the set
            raw.sa_mask = {
                let mut sa_mask = MaybeUninit::<sigset_t>::uninit();
                // SAFETY: `sa_mask` is a valid pointer to a `sigset_t`-sized allocation.
                unsafe { sigemptyset(sa_mask.as_mut_ptr()) };
                // SAFETY: `sigemptyset` initialized the set.
                unsafe { sa_mask.assume_init() }
            };
            raw.sa_flags = 0;
            raw
        };
        // Reset `GOT_SIGTTOU`.
        GOT_SIGTTOU.store(false, Ordering::SeqCst);
        // Set `action` as the action for `SIGTTOU` and store the original action in
        // `original_action` to restore it later.
        // SAFETY: `action` is initialized and `original_action` is a valid out-pointer.
        unsafe { sigaction(SIGTTOU, &action, original_action.as_mut_ptr()) };
        // Call `tcsetpgrp` until it succeeds and ignore interruptions if we did not receive
        // `SIGTTOU`.
        let result = loop {
            match self.tty.tcsetpgrp(pgrp) {
                Ok(()) => break Ok(()),
                Err(err) => {
                    let got_sigttou = GOT_SIGTTOU.load(Ordering::SeqCst);
                    if got_sigttou || err.kind() != io::ErrorKind::Interrupted {
                        break Err(err);
                    }
                }
            }
        };
        // Restore the original action.
        // SAFETY: `original_action` was initialized by the `sigaction` call above.
        unsafe { sigaction(SIGTTOU, original_action.as_ptr(), std::ptr::null_mut()) };

        result
    }
}

impl AsRawFd for UserTerm {
    fn as_raw_fd(&self) -> RawFd {
        self.tty.as_raw_fd()
    }
}
