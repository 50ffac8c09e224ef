//! Internal utilities.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Checks whether the process with the given PID is still alive.
///
/// Uses `kill(pid, 0)`: signal 0 checks existence without delivering a signal.
/// A process owned by another user reports `EPERM`, which still means alive.
#[must_use]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // SAFETY: `kill(pid, 0)` is a standard POSIX existence check that does
    // not deliver any signal.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Whether the current user may execute `path`.
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    path.is_file() && has_access(path, libc::X_OK)
}

/// Whether the current user may write to `path`.
#[must_use]
pub fn is_writable(path: &Path) -> bool {
    has_access(path, libc::W_OK)
}

/// Whether the current user may read `path`.
#[must_use]
pub fn is_readable(path: &Path) -> bool {
    has_access(path, libc::R_OK)
}

fn has_access(path: &Path, mode: libc::c_int) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}
