//! Memory management for process address spaces
//!
//! Physical memory is a fixed pool of equally sized frames
//! ([`frame_allocator::FramePool`]). Every process owns an
//! [`address_space::AddressSpace`] that maps its virtual pages onto frames it
//! holds by value, so two processes can never share (or both free) a frame.

use core::fmt;

pub mod address_space;
pub mod frame_allocator;

pub use address_space::{AddressSpace, PageTableEntry};
pub use frame_allocator::{Frame, FramePool};

/// A virtual address inside a process address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VirtAddr(u64);

impl VirtAddr {
    pub const fn new(addr: u64) -> Self {
        VirtAddr(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::LowerHex for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl core::ops::Add<u64> for VirtAddr {
    type Output = VirtAddr;

    fn add(self, rhs: u64) -> VirtAddr {
        VirtAddr(self.0 + rhs)
    }
}

/// Memory errors raised while building or touching an address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The frame pool cannot satisfy the request
    OutOfFrames { requested: usize, available: usize },
    /// The address is not mapped in this address space
    Unmapped(VirtAddr),
    /// Write to a page mapped read-only
    ReadOnly(VirtAddr),
    /// No NUL terminator within the allowed length
    StringTooLong,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemoryError::OutOfFrames { requested, available } => write!(
                f,
                "out of physical frames ({} requested, {} available)",
                requested, available
            ),
            MemoryError::Unmapped(addr) => write!(f, "address {:#x} is not mapped", addr),
            MemoryError::ReadOnly(addr) => write!(f, "address {:#x} is read-only", addr),
            MemoryError::StringTooLong => write!(f, "string is not NUL-terminated"),
        }
    }
}
