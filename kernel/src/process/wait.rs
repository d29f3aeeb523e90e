//! Termination and reaping
//!
//! A terminating process becomes a zombie holding only its exit status. Its
//! parent collects the status with wait, which frees the slot. Processes
//! whose parent is gone are reclaimed on the spot.

use super::process::{Parent, ProcessId, ProcessState, WaitTarget};
use super::table::ProcessTable;
use super::ProcessError;

/// Turn `pid` into a zombie with `status`
///
/// Returns the parent to wake, if it is blocked waiting for this process.
/// The parent has already been made runnable; the caller only has to
/// resume it once the table lock is dropped.
pub(crate) fn exit_process(
    table: &mut ProcessTable,
    pid: ProcessId,
    status: i32,
) -> Result<Option<ProcessId>, ProcessError> {
    let process = table.lookup_mut(pid)?;
    if !process.is_live() {
        return Err(ProcessError::NotFound);
    }
    process.terminate(status);
    let parent = process.parent;
    let children = core::mem::take(&mut process.children);

    log::info!("exit: {} exited with status {}", pid, status);

    for child in children {
        reparent_to_reaper(table, child);
    }

    match parent {
        Parent::Process(parent_pid) => {
            let parent = table.lookup_mut(parent_pid)?;
            let waiting = parent.state == ProcessState::Blocked
                && parent.waiting_for.is_some_and(|target| target.matches(pid));
            if waiting {
                parent.state = ProcessState::Runnable;
                parent.waiting_for = None;
                log::debug!("exit: waking {} waiting on {}", parent_pid, pid);
                return Ok(Some(parent_pid));
            }
        }
        Parent::None | Parent::Reaper => {
            table.release(pid);
            log::debug!("reaper: reclaimed {} (status {})", pid, status);
        }
    }
    Ok(None)
}

fn reparent_to_reaper(table: &mut ProcessTable, child: ProcessId) {
    let Some(process) = table.get_mut(child) else {
        log::error!("reaper: child {} missing from table", child);
        return;
    };
    process.parent = Parent::Reaper;
    let state = process.state;
    if let ProcessState::Zombie(status) = state {
        table.release(child);
        log::debug!("reaper: reclaimed orphaned zombie {} (status {})", child, status);
    } else {
        log::debug!("reaper: adopted {}", child);
    }
}

/// Collect one terminated child of `pid` without blocking
///
/// Picks the lowest-id zombie that matches `target`. `Ok(None)` means
/// matching children exist but none has terminated yet.
pub(crate) fn reap_child(
    table: &mut ProcessTable,
    pid: ProcessId,
    target: WaitTarget,
) -> Result<Option<(ProcessId, i32)>, ProcessError> {
    let process = table.lookup(pid)?;
    if process.children.is_empty() {
        log::debug!("wait: {} has no children", pid);
        return Err(ProcessError::NoChildren);
    }
    if let WaitTarget::Child(child) = target {
        if !process.has_child(child) {
            log::debug!("wait: {} is not a child of {}", child, pid);
            return Err(ProcessError::NoChildren);
        }
    }

    let zombie = process
        .children
        .iter()
        .copied()
        .filter(|&child| target.matches(child))
        .filter(|&child| table.get(child).is_some_and(|c| c.state.is_zombie()))
        .min();

    let Some(child) = zombie else {
        return Ok(None);
    };

    table.lookup_mut(pid)?.remove_child(child);
    let status = table.release(child).exit_status().unwrap_or_default();
    log::info!("wait: {} reaped {} (status {})", pid, child, status);
    Ok(Some((child, status)))
}
