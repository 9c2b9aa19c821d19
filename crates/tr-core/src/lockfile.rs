//! Single-instance lock file
//!
//! The lock is a file created exclusively and holding the owner's PID. A
//! leftover file whose PID no longer runs is treated as stale and replaced,
//! so a crashed client does not block the next start.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::LockError;

/// Default lock file name, relative to the working directory
pub const LOCK_FILE_NAME: &str = "tr-client.lock";

/// Read the PID recorded in a lock file
///
/// Returns `Ok(None)` if the file doesn't exist or holds no valid PID.
pub fn read_lock_pid(path: &Path) -> io::Result<Option<u32>> {
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            Ok(contents.trim().parse::<u32>().ok())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if a process with the given PID is still alive
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) probes without signalling; EPERM still means it exists
    unsafe {
        let result = libc::kill(pid as libc::pid_t, 0);
        if result == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use std::ptr;
    use windows_sys::Win32::Foundation::{CloseHandle, INVALID_HANDLE_VALUE};
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == INVALID_HANDLE_VALUE || handle == ptr::null_mut() {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

/// Guard holding the single-instance lock; the file is removed on drop
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquire the lock at `path`, failing if another live process holds it
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        match Self::create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                match read_lock_pid(&path)? {
                    Some(pid) if pid != std::process::id() && is_process_alive(pid) => {
                        Err(LockError::AlreadyRunning(pid))
                    }
                    stale => {
                        tracing::warn!(
                            "Replacing stale lock file {:?} (pid {:?})",
                            path,
                            stale
                        );
                        fs::remove_file(&path)?;
                        Self::create(&path)?;
                        Ok(Self { path })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove lock file {:?}: {}", self.path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_nonexistent_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        assert!(read_lock_pid(&path).unwrap().is_none());
    }

    #[test]
    fn test_acquire_writes_pid_and_releases_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.lock");

        {
            let lock = LockFile::acquire(&path).unwrap();
            assert_eq!(lock.path(), path.as_path());
            assert_eq!(read_lock_pid(&path).unwrap(), Some(std::process::id()));
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.lock");
        std::fs::write(&path, "999999999\n").unwrap();

        let _lock = LockFile::acquire(&path).unwrap();
        assert_eq!(read_lock_pid(&path).unwrap(), Some(std::process::id()));
    }

    #[test]
    fn test_garbage_lock_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.lock");
        std::fs::write(&path, "not a pid").unwrap();

        assert!(LockFile::acquire(&path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_live_lock_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.lock");
        // PID 1 is always alive on unix
        std::fs::write(&path, "1\n").unwrap();

        let err = LockFile::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyRunning(1)));
        assert!(path.exists());
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }
}
