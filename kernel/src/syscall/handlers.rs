//! System call handlers for the process API

use alloc::string::String;

use super::{SyscallResult, MAX_PROGRAM_NAME};
use crate::memory::VirtAddr;
use crate::process::{ProcessError, ProcessId, ProcessManager, WaitTarget};

/// sys_fork - duplicate the calling process
///
/// Returns the child's id to the parent. The child's own `rax` is 0.
pub fn sys_fork(manager: &ProcessManager, current: ProcessId) -> SyscallResult {
    match manager.fork(current) {
        Ok(child) => SyscallResult::Ok(child.as_u64()),
        Err(e) => {
            log::warn!("sys_fork: {} failed: {}", current, e);
            e.into()
        }
    }
}

/// sys_join - wait for a specific child and return its exit status
pub fn sys_join(manager: &ProcessManager, current: ProcessId, child: u64) -> SyscallResult {
    let target = WaitTarget::Child(ProcessId::new(child));
    match manager.wait(current, target) {
        Ok((_, status)) => SyscallResult::Ok(status as i64 as u64),
        Err(e) => {
            log::debug!("sys_join: {} joining {} failed: {}", current, child, e);
            e.into()
        }
    }
}

/// sys_exec - replace the caller's image with the program named at `name_ptr`
///
/// `name_ptr` points at a NUL-terminated path in the caller's memory.
pub fn sys_exec(manager: &ProcessManager, current: ProcessId, name_ptr: u64) -> SyscallResult {
    let name = match read_program_name(manager, current, VirtAddr::new(name_ptr)) {
        Ok(name) => name,
        Err(e) => {
            log::warn!("sys_exec: {} passed bad name pointer {:#x}", current, name_ptr);
            return e.into();
        }
    };

    match manager.exec(current, &name) {
        Ok(entry) => SyscallResult::Ok(entry),
        Err(e) => e.into(),
    }
}

fn read_program_name(
    manager: &ProcessManager,
    current: ProcessId,
    addr: VirtAddr,
) -> Result<String, ProcessError> {
    manager.with_process_mut(current, |process| -> Result<String, ProcessError> {
        let space = process.address_space_mut().ok_or(ProcessError::NotFound)?;
        Ok(space.read_c_string(addr, MAX_PROGRAM_NAME)?)
    })?
}

/// sys_exit - terminate the caller
pub fn sys_exit(manager: &ProcessManager, current: ProcessId, status: i32) -> SyscallResult {
    match manager.exit(current, status) {
        Ok(()) => SyscallResult::Ok(0),
        Err(e) => e.into(),
    }
}

/// sys_yield - give up the CPU
pub fn sys_yield(manager: &ProcessManager, current: ProcessId) -> SyscallResult {
    match manager.yield_process(current) {
        Ok(()) => SyscallResult::Ok(0),
        Err(e) => e.into(),
    }
}
