//! System call interface
//!
//! The caller-visible process API. Every call returns a single signed value:
//! non-negative on success, a negated errno on failure. The value is also
//! left in the caller's `rax`, except after a successful `Exec` (the old
//! image is gone) or `Exit`.

use crate::process::{ProcessError, ProcessId, ProcessManager};

pub mod errno;
pub mod handlers;

/// Longest program name `Exec` will read from user memory
pub const MAX_PROGRAM_NAME: usize = 256;

/// System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    /// Recognized but unsupported; always fails with `-ENOSYS`
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Join = 3,
    Fork = 9,
    Yield = 10,
}

impl SyscallNumber {
    /// Try to convert a u64 to a SyscallNumber
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Halt),
            1 => Some(Self::Exit),
            2 => Some(Self::Exec),
            3 => Some(Self::Join),
            9 => Some(Self::Fork),
            10 => Some(Self::Yield),
            _ => None,
        }
    }
}

/// System call result type; `Err` carries a positive errno
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Ok(u64),
    Err(u64),
}

impl SyscallResult {
    /// Raw return value as seen by the caller
    pub fn as_isize(self) -> isize {
        match self {
            SyscallResult::Ok(value) => value as isize,
            SyscallResult::Err(errno) => -(errno as isize),
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, SyscallResult::Ok(_))
    }
}

impl From<ProcessError> for SyscallResult {
    fn from(err: ProcessError) -> Self {
        SyscallResult::Err(errno::errno_for(err) as u64)
    }
}

/// Route system call `number` made by `current`
///
/// `args` are the first three argument registers (`rdi`, `rsi`, `rdx`).
pub fn dispatch(
    manager: &ProcessManager,
    current: ProcessId,
    number: u64,
    args: [u64; 3],
) -> isize {
    let Some(syscall) = SyscallNumber::from_u64(number) else {
        log::warn!("syscall: {} made unknown system call {}", current, number);
        return finish(manager, current, SyscallResult::Err(errno::ENOSYS as u64));
    };

    let result = match syscall {
        SyscallNumber::Halt => {
            log::warn!("syscall: {} requested Halt, not supported", current);
            SyscallResult::Err(errno::ENOSYS as u64)
        }
        SyscallNumber::Exit => handlers::sys_exit(manager, current, args[0] as i32),
        SyscallNumber::Exec => handlers::sys_exec(manager, current, args[0]),
        SyscallNumber::Join => handlers::sys_join(manager, current, args[0]),
        SyscallNumber::Fork => handlers::sys_fork(manager, current),
        SyscallNumber::Yield => handlers::sys_yield(manager, current),
    };

    match (syscall, result) {
        (SyscallNumber::Exec | SyscallNumber::Exit, SyscallResult::Ok(_)) => result.as_isize(),
        _ => finish(manager, current, result),
    }
}

/// Store the result in the caller's `rax`
fn finish(manager: &ProcessManager, current: ProcessId, result: SyscallResult) -> isize {
    let raw = result.as_isize();
    // The caller may be gone by now; the value is still returned directly
    if let Err(e) = manager.with_process_mut(current, |p| p.context.set_return_value(raw as i64)) {
        log::debug!("syscall: not storing result for {}: {}", current, e);
    }
    raw
}
