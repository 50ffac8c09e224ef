//! One-way command delivery over the daemon's named pipe.

use crate::command::{DaemonCommand, is_valid_command};
use crate::error::{DaemonError, Result};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Writes newline-terminated command tokens to a FIFO owned by the daemon.
///
/// The pipe is never created or removed here. It is opened non-blocking so a
/// pipe with no reader fails immediately instead of hanging the caller.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    path: PathBuf,
}

impl CommandChannel {
    /// Creates a channel for the pipe at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the pipe path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sends `command` as `"<token>\n"`.
    ///
    /// # Errors
    ///
    /// - [`DaemonError::InvalidCommand`] if the token is not whitelisted
    ///   (checked before any I/O).
    /// - [`DaemonError::PipeNotFound`] if the pipe does not exist.
    /// - [`DaemonError::DaemonNotRunning`] if nobody reads the pipe.
    /// - [`DaemonError::FileAccessDenied`] if it cannot be opened for writing.
    /// - [`DaemonError::CommandFailed`] if the write itself fails.
    pub fn send(&self, command: DaemonCommand) -> Result<()> {
        let token = command.as_str();
        if !is_valid_command(token) {
            return Err(DaemonError::InvalidCommand(token.to_string()));
        }

        std::fs::metadata(&self.path).map_err(|e| self.open_error(token, e))?;

        let mut pipe = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|e| self.open_error(token, e))?;

        // `pipe` is closed when it goes out of scope, on both paths below.
        pipe.write_all(format!("{token}\n").as_bytes())
            .map_err(|source| DaemonError::CommandFailed {
                command: token.to_string(),
                source,
            })?;

        tracing::info!(command = token, pipe = %self.path.display(), "Command sent");
        Ok(())
    }

    fn open_error(&self, token: &str, err: std::io::Error) -> DaemonError {
        tracing::warn!(pipe = %self.path.display(), error = %err, "Cannot open command pipe");
        if err.raw_os_error() == Some(libc::ENXIO) {
            return DaemonError::DaemonNotRunning;
        }
        match err.kind() {
            ErrorKind::NotFound => DaemonError::PipeNotFound {
                path: self.path.clone(),
            },
            ErrorKind::PermissionDenied => DaemonError::FileAccessDenied {
                path: self.path.clone(),
            },
            _ => DaemonError::CommandFailed {
                command: token.to_string(),
                source: err,
            },
        }
    }
}

#[cfg(test)]
pub(crate) fn make_fifo(path: &Path) {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).unwrap();
    // SAFETY: `c_path` is a valid NUL-terminated path for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed: {}", std::io::Error::last_os_error());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn missing_pipe_is_reported_without_creating_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd-pipe");
        let err = CommandChannel::new(&path)
            .send(DaemonCommand::Enable)
            .unwrap_err();
        assert!(matches!(err, DaemonError::PipeNotFound { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn writes_token_and_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd-pipe");
        std::fs::write(&path, "").unwrap();

        CommandChannel::new(&path)
            .send(DaemonCommand::Disable)
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "disable\n");
    }

    #[test]
    fn fifo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd-pipe");
        make_fifo(&path);

        let mut reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .unwrap();

        CommandChannel::new(&path).send(DaemonCommand::Enable).unwrap();

        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "enable\n");
    }

    #[test]
    fn fifo_without_reader_means_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmd-pipe");
        make_fifo(&path);

        let err = CommandChannel::new(&path)
            .send(DaemonCommand::Enable)
            .unwrap_err();
        assert!(matches!(err, DaemonError::DaemonNotRunning));
    }

    #[test]
    fn lookup_failure_is_not_reported_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "").unwrap();

        let err = CommandChannel::new(file.join("cmd-pipe"))
            .send(DaemonCommand::Enable)
            .unwrap_err();
        assert!(matches!(err, DaemonError::CommandFailed { .. }), "{err:?}");
    }

    #[test]
    fn unsearchable_parent_is_access_denied() {
        use std::os::unix::fs::PermissionsExt;

        // SAFETY: geteuid has no preconditions.
        if unsafe { libc::geteuid() } == 0 {
            return; // root bypasses directory permissions
        }
        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        make_fifo(&locked.join("cmd-pipe"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let err = CommandChannel::new(locked.join("cmd-pipe"))
            .send(DaemonCommand::Enable)
            .unwrap_err();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
        assert!(matches!(err, DaemonError::FileAccessDenied { .. }));
    }
}
