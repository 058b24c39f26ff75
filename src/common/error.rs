use std::{fmt, io, path::PathBuf};

#[derive(Debug)]
pub enum Error {
    NoSuchJob,
    InvalidJobId,
    AlreadyRunning,
    WrongArity,
    ContinueFailed(io::Error),
    SignalFailed(io::Error),
    Fork(io::Error),
    Wait(io::Error),
    CommandNotFound(PathBuf),
    NoSuchPath(PathBuf),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSuchJob => f.write_str("job not found"),
            Error::InvalidJobId => f.write_str("invalid job id"),
            Error::AlreadyRunning => f.write_str("job is already running"),
            Error::WrongArity => f.write_str("wrong number of arguments"),
            Error::ContinueFailed(e) => write!(f, "could not continue process: {e}"),
            Error::SignalFailed(e) => write!(f, "could not terminate job: {e}"),
            Error::Fork(e) => write!(f, "unable to fork: {e}"),
            Error::Wait(e) => write!(f, "{e}"),
            Error::CommandNotFound(p) => write!(f, "{}: command not found", p.display()),
            Error::NoSuchPath(p) => write!(f, "{}: No such file or directory", p.display()),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn job_errors_render_like_the_shell_reports_them() {
        assert_eq!(Error::NoSuchJob.to_string(), "job not found");
        assert_eq!(Error::InvalidJobId.to_string(), "invalid job id");
        assert_eq!(Error::AlreadyRunning.to_string(), "job is already running");
        assert_eq!(Error::WrongArity.to_string(), "wrong number of arguments");
        assert_eq!(
            Error::CommandNotFound("frobnicate".into()).to_string(),
            "frobnicate: command not found"
        );
        assert_eq!(
            Error::NoSuchPath("./frobnicate".into()).to_string(),
            "./frobnicate: No such file or directory"
        );
    }
}
