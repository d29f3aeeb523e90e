//! Process-lifecycle core
//!
//! This crate implements the part of a kernel that creates, replaces and
//! reaps processes: a fixed-capacity process table, fork, exec, exit and
//! wait, plus the system call surface (`Fork`/`Join`/`Exec`) on top of them.
//!
//! The crate is `no_std` + `alloc` at heart. The default `std` feature adds
//! the hosted pieces: a scheduler that parks OS threads and a stderr logger.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod config;
pub mod loader;
#[cfg(feature = "std")]
pub mod logger;
pub mod memory;
pub mod process;
pub mod syscall;
pub mod task;

pub use config::KernelConfig;
pub use loader::{LoadError, ProgramImage, ProgramLoader, ProgramRegistry};
pub use process::{
    ForkResult, Parent, Process, ProcessError, ProcessId, ProcessManager, ProcessState,
    ProcessTable, WaitTarget,
};
pub use task::scheduler::Scheduler;
