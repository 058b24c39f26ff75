use crate::log::{dev_info, dev_warn};
use crate::system::{getpgrp, interface::ProcessId, term::UserTerm};

/// Arbiter for terminal foreground ownership.
///
/// At most one process group controls the terminal at a time: a grant hands
/// it to a job's group, and dropping the grant returns it to the shell's own
/// group. Only foreground operations take a grant; background jobs never
/// touch the terminal.
pub(crate) struct TerminalArbiter {
    tty: Option<UserTerm>,
    own_pgrp: ProcessId,
}

impl TerminalArbiter {
    pub(crate) fn new() -> Self {
        let tty = match UserTerm::open() {
            Ok(tty) => Some(tty),
            Err(err) => {
                // Non-interactive invocation; handoffs become no-ops, waits
                // still work.
                dev_info!("cannot open controlling terminal: {err}");
                None
            }
        };

        Self {
            tty,
            own_pgrp: getpgrp(),
        }
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self {
            tty: None,
            own_pgrp: getpgrp(),
        }
    }

    /// Hand the terminal to `pgrp` for the duration of the returned grant.
    pub(crate) fn foreground(&self, pgrp: ProcessId) -> ForegroundGrant<'_> {
        if let Some(tty) = &self.tty {
            if let Err(err) = tty.tcsetpgrp_nobg(pgrp) {
                dev_warn!("cannot hand terminal to process group {pgrp}: {err}");
            }
        }

        ForegroundGrant { arbiter: self }
    }
}

/// Scoped foreground ownership; reclaims the terminal for the shell on every
/// exit path of the wait it brackets.
pub(crate) struct ForegroundGrant<'a> {
    arbiter: &'a TerminalArbiter,
}

impl Drop for ForegroundGrant<'_> {
    fn drop(&mut self) {
        if let Some(tty) = &self.arbiter.tty {
            if let Err(err) = tty.tcsetpgrp_nobg(self.arbiter.own_pgrp) {
                dev_warn!("cannot reclaim terminal for the shell: {err}");
            }
        }
    }
}
