//! The interactive loop: reads commands, dispatches builtins, launches
//! everything else as jobs.

mod builtins;

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    sync::{Arc, Mutex},
};

use crate::common::Error;
use crate::exec::{self, SignalBridge, TerminalArbiter};
use crate::jobs::{self, JobId, JobState, JobTable};
use crate::log::{dev_info, user_error, user_warn};
use crate::system::{
    can_execute, kill,
    signal::consts::{SIGCONT, SIGHUP},
};

const SEARCH_DIRS: &[&str] = &["/bin", "/usr/bin"];

pub struct Shell {
    jobs: Arc<Mutex<JobTable>>,
    term: TerminalArbiter,
    _bridge: SignalBridge,
}

pub fn main() {
    crate::log::ShellLogger::new("jsh: ").into_global_logger();

    let mut shell = match Shell::new() {
        Ok(shell) => shell,
        Err(err) => {
            eprintln_ignore_io_error!("jsh: cannot initialize job control: {err}");
            process::exit(1);
        }
    };

    shell.run();
    shell.shutdown()
}

impl Shell {
    fn new() -> io::Result<Self> {
        let jobs = Arc::new(Mutex::new(JobTable::new()));
        let bridge = SignalBridge::spawn(Arc::clone(&jobs))?;

        Ok(Self {
            jobs,
            term: TerminalArbiter::new(),
            _bridge: bridge,
        })
    }

    fn run(&mut self) {
        let stdin = io::stdin();

        loop {
            {
                let mut stdout = io::stdout();
                let _ = write!(stdout, "> ");
                let _ = stdout.flush();
            }

            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) => break, // end of input
                Ok(_) => {}
                Err(err) => {
                    user_error!("cannot read input: {err}");
                    break;
                }
            }

            self.sweep();

            let mut tokens = tokenize(&line);
            let background = strip_ampersand(&mut tokens);
            if tokens.is_empty() {
                continue;
            }

            if tokens[0] == "exit" {
                if tokens.len() > 1 {
                    user_error!("exit: too many arguments");
                    continue;
                }
                break;
            }

            self.dispatch(tokens, background);
            self.sweep();
        }
    }

    /// Report and drop every job that reached a terminal state, so each one
    /// is announced exactly once.
    fn sweep(&self) {
        let mut jobs = jobs::lock(&self.jobs);
        jobs.sweep_and_report(io::stdout().lock());
    }

    fn dispatch(&mut self, tokens: Vec<String>, background: bool) {
        let command = tokens[0].clone();
        match command.as_str() {
            "bg" => builtins::bg(self, &tokens),
            "fg" => builtins::fg(self, &tokens),
            "jobs" => builtins::jobs(self, &tokens),
            "kill" => builtins::kill(self, &tokens),
            "cd" => builtins::cd(&tokens),
            _ => self.run_external(tokens, background),
        }
    }

    fn run_external(&mut self, tokens: Vec<String>, background: bool) {
        let program = match resolve_program(&tokens[0]) {
            Ok(program) => program,
            Err(err) => {
                user_error!("{err}");
                return;
            }
        };

        let mut jobs = jobs::lock(&self.jobs);
        if let Err(err) = exec::launch(&mut jobs, &self.term, &program, &tokens, background) {
            user_error!("{}: {err}", tokens[0]);
        }
    }

    /// Hang up every remaining job (waking the stopped ones first, so they
    /// do not linger suspended without a shell), then leave. Delivery
    /// failures are reported per job and never abort the shutdown.
    fn shutdown(&mut self) -> ! {
        let mut jobs = jobs::lock(&self.jobs);
        dev_info!("shutting down with {} tracked jobs", jobs.len());

        // The group leader is the job's only process, so plain `kill` to the
        // pgid reaches everything there is.
        for job in jobs.list() {
            match job.state() {
                JobState::Stopped => {
                    if let Err(err) = kill(job.pgid(), SIGHUP) {
                        user_warn!("cannot hang up job {}: {err}", job.id());
                        continue;
                    }
                    if let Err(err) = kill(job.pgid(), SIGCONT) {
                        user_warn!("cannot continue job {}: {err}", job.id());
                    }
                }
                JobState::Running => {
                    if let Err(err) = kill(job.pgid(), SIGHUP) {
                        user_warn!("cannot hang up job {}: {err}", job.id());
                    }
                }
                _ => {}
            }
        }

        jobs.drain_all();
        drop(jobs);

        process::exit(0)
    }
}

fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_owned).collect()
}

/// A trailing `&`, either as its own token or glued to the last one, requests
/// a background launch.
fn strip_ampersand(tokens: &mut Vec<String>) -> bool {
    match tokens.last_mut() {
        Some(last) if last == "&" => {
            tokens.pop();
            true
        }
        Some(last) if last.ends_with('&') => {
            last.pop();
            true
        }
        _ => false,
    }
}

/// Turn the typed command name into the path to execute.
///
/// Names starting with `.` or `/` are explicit paths and are only checked,
/// never searched. Anything else is looked up in `/bin` and `/usr/bin`, in
/// that order.
fn resolve_program(name: &str) -> Result<PathBuf, Error> {
    if name.starts_with('.') || name.starts_with('/') {
        let path = PathBuf::from(name);
        if can_execute(&path) {
            Ok(path)
        } else {
            Err(Error::NoSuchPath(path))
        }
    } else {
        for dir in SEARCH_DIRS {
            let path = Path::new(dir).join(name);
            if can_execute(&path) {
                return Ok(path);
            }
        }
        Err(Error::CommandNotFound(name.into()))
    }
}

/// A job reference is exactly `%` followed by one or more decimal digits.
fn parse_job_ref(arg: &str) -> Result<JobId, Error> {
    let digits = arg.strip_prefix('%').ok_or(Error::InvalidJobId)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidJobId);
    }
    digits.parse().map(JobId::new).map_err(|_| Error::InvalidJobId)
}
