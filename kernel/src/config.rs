//! Kernel sizing parameters
//!
//! The defaults mirror the small teaching machine this core grew up on:
//! 128 physical frames of 128 bytes each and a 1 KiB user stack.

use core::fmt;

use crate::memory::address_space::STACK_RED_ZONE;

/// Default number of process table slots
pub const DEFAULT_MAX_PROCESSES: usize = 16;

/// Default number of physical page frames
pub const DEFAULT_PHYSICAL_FRAMES: usize = 128;

/// Default page (and frame) size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Default user stack size in bytes
pub const DEFAULT_USER_STACK_SIZE: usize = 1024;

/// Static configuration for a [`ProcessManager`](crate::ProcessManager)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Capacity of the process table
    pub max_processes: usize,
    /// Number of frames in the physical frame pool
    pub physical_frames: usize,
    /// Size of one page/frame in bytes
    pub page_size: usize,
    /// Bytes reserved for the user stack at the top of every address space
    pub user_stack_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_processes: DEFAULT_MAX_PROCESSES,
            physical_frames: DEFAULT_PHYSICAL_FRAMES,
            page_size: DEFAULT_PAGE_SIZE,
            user_stack_size: DEFAULT_USER_STACK_SIZE,
        }
    }
}

/// Reasons a [`KernelConfig`] is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NoProcessSlots,
    NoFrames,
    ZeroPageSize,
    StackSmallerThanPage,
    StackSmallerThanRedZone,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::NoProcessSlots => write!(f, "max_processes must be at least 1"),
            ConfigError::NoFrames => write!(f, "physical_frames must be at least 1"),
            ConfigError::ZeroPageSize => write!(f, "page_size must be non-zero"),
            ConfigError::StackSmallerThanPage => {
                write!(f, "user_stack_size must cover at least one page")
            }
            ConfigError::StackSmallerThanRedZone => {
                write!(f, "user_stack_size must be at least {} bytes", STACK_RED_ZONE)
            }
        }
    }
}

impl KernelConfig {
    /// Check that the configuration describes a usable machine
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_processes == 0 {
            return Err(ConfigError::NoProcessSlots);
        }
        if self.physical_frames == 0 {
            return Err(ConfigError::NoFrames);
        }
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.user_stack_size < self.page_size {
            return Err(ConfigError::StackSmallerThanPage);
        }
        if (self.user_stack_size as u64) < STACK_RED_ZONE {
            return Err(ConfigError::StackSmallerThanRedZone);
        }
        Ok(())
    }

    /// Total bytes of physical memory
    pub fn memory_size(&self) -> usize {
        self.physical_frames * self.page_size
    }
}
