//! Unix fork() with full address space copying
//!
//! The child gets a byte-for-byte copy of the parent's memory in freshly
//! allocated frames and a copy of its registers. The only difference between
//! the two afterwards is the value in `rax`.

use alloc::format;

use super::process::{Parent, Process, ProcessId};
use super::table::ProcessTable;
use super::ProcessError;
use crate::memory::AddressSpace;
use crate::task::context::CpuContext;

/// What a process learns from the return value of `Fork`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkResult {
    /// Running in the parent; `child` is the new process
    Parent { child: ProcessId },
    /// Running in the child
    Child,
}

impl ForkResult {
    /// Decode the raw `Fork` return value; negative values are errors
    pub fn from_return_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(ForkResult::Child),
            v if v > 0 => Some(ForkResult::Parent {
                child: ProcessId::new(v as u64),
            }),
            _ => None,
        }
    }
}

/// Copy the parent's address space into new frames
pub fn copy_process_memory(parent: &Process) -> Result<AddressSpace, ProcessError> {
    let space = parent.address_space().ok_or(ProcessError::NotFound)?;
    log::debug!(
        "copy_process_memory: copying {} pages from {}",
        space.num_pages(),
        parent.id
    );
    Ok(space.try_clone()?)
}

/// Child registers: the parent's, with `Fork` returning 0
pub fn copy_process_state(parent: &Process) -> CpuContext {
    let mut context = parent.context;
    context.set_return_value(0);
    context
}

/// Create a child of `parent_pid` in `table`
///
/// Nothing is left behind on failure: the slot is only claimed once the
/// memory copy has succeeded, and a failed copy drops its frames.
pub(crate) fn fork_process(
    table: &mut ProcessTable,
    parent_pid: ProcessId,
) -> Result<ProcessId, ProcessError> {
    let parent = table.lookup(parent_pid)?;
    if !parent.is_live() {
        return Err(ProcessError::NotFound);
    }
    if table.free_slots() == 0 {
        log::warn!("fork: {} failed, process table full", parent_pid);
        return Err(ProcessError::NoFreeSlot);
    }

    let space = copy_process_memory(parent).map_err(|e| {
        log::warn!("fork: {} failed to copy memory: {}", parent_pid, e);
        e
    })?;
    let context = copy_process_state(parent);
    let parent_name = parent.name.clone();

    let child_pid = table.allocate(|pid| {
        let name = format!("{}-child-{}", parent_name, pid.as_u64());
        Ok(Process::new(pid, name, Parent::Process(parent_pid), space, context))
    })?;

    let parent = table.lookup_mut(parent_pid)?;
    parent.add_child(child_pid);
    parent.context.set_return_value(child_pid.as_u64() as i64);

    log::info!("fork: {} created child {}", parent_pid, child_pid);
    Ok(child_pid)
}
