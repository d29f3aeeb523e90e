//! Process management
//!
//! This module handles process creation, replacement and reaping. A process
//! is a running instance of a program with its own address space.

use core::fmt;

use crate::loader::LoadError;
use crate::memory::MemoryError;

pub mod exec;
pub mod fork;
pub mod manager;
pub mod process;
pub mod table;
mod wait;

pub use fork::ForkResult;
pub use manager::ProcessManager;
pub use process::{Parent, Process, ProcessId, ProcessState, WaitTarget};
pub use table::ProcessTable;

/// Failures of the process lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessError {
    /// The process table is full
    NoFreeSlot,
    /// Not enough physical frames for the address space
    OutOfMemory,
    /// Exec target does not exist
    ProgramNotFound,
    /// Exec target exists but cannot be started
    InvalidImage,
    /// No live process with that id
    NotFound,
    /// Nothing to wait for
    NoChildren,
    /// A user pointer did not resolve
    BadAddress,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            ProcessError::NoFreeSlot => "process table full",
            ProcessError::OutOfMemory => "out of memory",
            ProcessError::ProgramNotFound => "program not found",
            ProcessError::InvalidImage => "invalid program image",
            ProcessError::NotFound => "no such process",
            ProcessError::NoChildren => "no child processes",
            ProcessError::BadAddress => "bad address",
        };
        f.write_str(msg)
    }
}

impl From<MemoryError> for ProcessError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfFrames { .. } => ProcessError::OutOfMemory,
            MemoryError::Unmapped(_) | MemoryError::ReadOnly(_) | MemoryError::StringTooLong => {
                ProcessError::BadAddress
            }
        }
    }
}

impl From<LoadError> for ProcessError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::NotFound(_) => ProcessError::ProgramNotFound,
            LoadError::InvalidImage(_) => ProcessError::InvalidImage,
        }
    }
}
