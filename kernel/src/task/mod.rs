//! Execution state and the scheduler seam
//!
//! The process core does not pick CPUs or time slices. It keeps each
//! process's saved registers ([`context::CpuContext`]) and asks a
//! [`scheduler::Scheduler`] to suspend and resume processes around `wait`.

pub mod context;
pub mod scheduler;
