//! POSIX errno values
//!
//! Standard error codes returned by system calls, and the mapping from
//! process lifecycle errors onto them.

use crate::process::ProcessError;

/// No such file or directory
pub const ENOENT: i32 = 2;

/// No such process
pub const ESRCH: i32 = 3;

/// No child processes
pub const ECHILD: i32 = 10;

/// Resource temporarily unavailable
pub const EAGAIN: i32 = 11;

/// Cannot allocate memory
pub const ENOMEM: i32 = 12;

/// Bad address
pub const EFAULT: i32 = 14;

/// Function not implemented
pub const ENOSYS: i32 = 38;

/// Errno reported to the caller for `err`
pub fn errno_for(err: ProcessError) -> i32 {
    match err {
        ProcessError::NoFreeSlot => EAGAIN,
        ProcessError::OutOfMemory => ENOMEM,
        ProcessError::ProgramNotFound | ProcessError::InvalidImage => ENOENT,
        ProcessError::NotFound => ESRCH,
        ProcessError::NoChildren => ECHILD,
        ProcessError::BadAddress => EFAULT,
    }
}
