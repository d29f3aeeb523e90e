//! Replacing a process image
//!
//! Exec is split in two. [`load_program`] builds the new address space and
//! initial registers without touching the process; [`commit_exec`] swaps
//! them in. Any failure before the commit leaves the old image untouched.

use alloc::string::String;
use alloc::sync::Arc;

use super::process::ProcessId;
use super::table::ProcessTable;
use super::ProcessError;
use crate::loader::ProgramLoader;
use crate::memory::{AddressSpace, FramePool};
use crate::task::context::CpuContext;

/// A fully built image waiting to be installed
pub struct LoadedProgram {
    pub name: String,
    pub space: AddressSpace,
    pub context: CpuContext,
}

/// Resolve `name` and lay it out in a fresh address space
pub fn load_program(
    loader: &dyn ProgramLoader,
    frames: &Arc<FramePool>,
    stack_size: usize,
    name: &str,
) -> Result<LoadedProgram, ProcessError> {
    let image = loader.load(name)?;
    let space = AddressSpace::from_image(&image, frames, stack_size)?;
    let context = CpuContext::new(image.entry, space.stack_top().as_u64());

    log::debug!(
        "load_program: '{}' entry={:#x} stack={:#x} pages={}",
        name,
        context.rip,
        context.rsp,
        space.num_pages()
    );

    Ok(LoadedProgram {
        name: image.name,
        space,
        context,
    })
}

/// Install `program` as the image of `pid`, returning the entry point
///
/// Identity and parent link are kept. The old address space is dropped
/// here, after the swap.
pub(crate) fn commit_exec(
    table: &mut ProcessTable,
    pid: ProcessId,
    program: LoadedProgram,
) -> Result<u64, ProcessError> {
    let process = table.lookup_mut(pid)?;
    if !process.is_live() {
        log::warn!("exec: {} exited while '{}' was loading", pid, program.name);
        return Err(ProcessError::NotFound);
    }

    let entry = program.context.rip;
    let old = process.space.replace(program.space);
    process.context = program.context;
    let old_name = core::mem::replace(&mut process.name, program.name);

    log::info!("exec: {} replaced '{}' with '{}'", pid, old_name, process.name);
    drop(old);
    Ok(entry)
}
