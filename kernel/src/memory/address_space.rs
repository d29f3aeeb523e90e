//! Per-process address spaces
//!
//! Layout follows the classic flat user image: code at virtual address 0,
//! initialized data right after it, then zeroed bss, with the user stack at
//! the top of the space. Pages that hold nothing but code are read-only.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use super::frame_allocator::{Frame, FramePool};
use super::{MemoryError, VirtAddr};
use crate::loader::ProgramImage;

/// Bytes left free above the initial stack pointer
pub const STACK_RED_ZONE: u64 = 16;

/// One virtual-to-physical translation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub virtual_page: usize,
    pub frame: usize,
    pub read_only: bool,
    /// Set on any access through this entry
    pub used: bool,
    /// Set on any write through this entry
    pub dirty: bool,
}

/// The memory owned by one process
pub struct AddressSpace {
    page_table: Vec<PageTableEntry>,
    /// Backing frames, indexed by virtual page number
    frames: Vec<Frame>,
    page_size: usize,
    pool: Arc<FramePool>,
}

impl AddressSpace {
    /// Build a fresh address space holding `image`
    ///
    /// All frames are taken from `pool` up front; if the pool cannot cover the
    /// whole image plus stack nothing is allocated.
    pub fn from_image(
        image: &ProgramImage,
        pool: &Arc<FramePool>,
        stack_size: usize,
    ) -> Result<Self, MemoryError> {
        let page_size = pool.frame_size();
        let size = image.image_size() + stack_size;
        let num_pages = size.div_ceil(page_size);

        log::debug!(
            "AddressSpace: loading '{}' ({} bytes, {} pages)",
            image.name,
            size,
            num_pages
        );

        let frames = pool.allocate_many(num_pages)?;
        let code_len = image.code.len();
        let page_table = frames
            .iter()
            .enumerate()
            .map(|(vpn, frame)| PageTableEntry {
                virtual_page: vpn,
                frame: frame.number(),
                read_only: (vpn + 1) * page_size <= code_len,
                used: false,
                dirty: false,
            })
            .collect();

        let mut space = AddressSpace {
            page_table,
            frames,
            page_size,
            pool: Arc::clone(pool),
        };
        space.copy_in(0, &image.code);
        space.copy_in(code_len, &image.data);
        Ok(space)
    }

    /// Duplicate this address space into freshly allocated frames
    ///
    /// The copy shares nothing with the original: after this returns, writes
    /// to either are invisible to the other.
    pub fn try_clone(&self) -> Result<Self, MemoryError> {
        let mut frames = self.pool.allocate_many(self.frames.len())?;
        for (dst, src) in frames.iter_mut().zip(&self.frames) {
            dst.bytes_mut().copy_from_slice(src.bytes());
        }
        let page_table = self
            .page_table
            .iter()
            .zip(&frames)
            .map(|(entry, frame)| PageTableEntry {
                frame: frame.number(),
                used: false,
                dirty: false,
                ..*entry
            })
            .collect();

        Ok(AddressSpace {
            page_table,
            frames,
            page_size: self.page_size,
            pool: Arc::clone(&self.pool),
        })
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Size of the address space in bytes
    pub fn size(&self) -> usize {
        self.num_pages() * self.page_size
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Initial user stack pointer
    pub fn stack_top(&self) -> VirtAddr {
        VirtAddr::new((self.size() as u64).saturating_sub(STACK_RED_ZONE))
    }

    pub fn page_table(&self) -> &[PageTableEntry] {
        &self.page_table
    }

    /// Physical frames backing this address space
    pub fn frame_numbers(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.iter().map(Frame::number)
    }

    /// Translate a virtual address into a physical address
    pub fn translate(&self, addr: VirtAddr) -> Result<u64, MemoryError> {
        let (vpn, offset) = self.split(addr)?;
        Ok((self.page_table[vpn].frame * self.page_size + offset) as u64)
    }

    /// Copy `buf.len()` bytes out of user memory starting at `addr`
    pub fn read(&mut self, addr: VirtAddr, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_range(addr, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let (vpn, offset) = self.split(addr + done as u64)?;
            let chunk = (self.page_size - offset).min(buf.len() - done);
            buf[done..done + chunk].copy_from_slice(&self.frames[vpn].bytes()[offset..offset + chunk]);
            self.page_table[vpn].used = true;
            done += chunk;
        }
        Ok(())
    }

    /// Copy `data` into user memory starting at `addr`
    ///
    /// Nothing is written unless the whole range is mapped and writable.
    pub fn write(&mut self, addr: VirtAddr, data: &[u8]) -> Result<(), MemoryError> {
        self.check_range(addr, data.len())?;
        for vpn in self.pages_of(addr, data.len()) {
            if self.page_table[vpn].read_only {
                let first = (vpn * self.page_size) as u64;
                return Err(MemoryError::ReadOnly(VirtAddr::new(first.max(addr.as_u64()))));
            }
        }
        let mut done = 0;
        while done < data.len() {
            let (vpn, offset) = self.split(addr + done as u64)?;
            let chunk = (self.page_size - offset).min(data.len() - done);
            self.frames[vpn].bytes_mut()[offset..offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            let entry = &mut self.page_table[vpn];
            entry.used = true;
            entry.dirty = true;
            done += chunk;
        }
        Ok(())
    }

    /// Read a NUL-terminated string of at most `max_len` bytes
    ///
    /// Used by `Exec` to pull the program name out of the caller's memory.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_c_string(&mut self, addr: VirtAddr, max_len: usize) -> Result<String, MemoryError> {
        let mut bytes = Vec::new();
        let mut byte = [0u8; 1];
        for i in 0..=max_len {
            self.read(addr + i as u64, &mut byte)?;
            if byte[0] == 0 {
                return Ok(String::from_utf8_lossy(&bytes).into_owned());
            }
            bytes.push(byte[0]);
        }
        Err(MemoryError::StringTooLong)
    }

    /// Raw copy used while loading; bypasses the read-only bit
    fn copy_in(&mut self, start: usize, data: &[u8]) {
        let mut done = 0;
        while done < data.len() {
            let vpn = (start + done) / self.page_size;
            let offset = (start + done) % self.page_size;
            let chunk = (self.page_size - offset).min(data.len() - done);
            self.frames[vpn].bytes_mut()[offset..offset + chunk]
                .copy_from_slice(&data[done..done + chunk]);
            done += chunk;
        }
    }

    fn split(&self, addr: VirtAddr) -> Result<(usize, usize), MemoryError> {
        let addr_usize = addr.as_u64() as usize;
        let vpn = addr_usize / self.page_size;
        if vpn >= self.page_table.len() {
            return Err(MemoryError::Unmapped(addr));
        }
        Ok((vpn, addr_usize % self.page_size))
    }

    fn check_range(&self, addr: VirtAddr, len: usize) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let end = self.size() as u64;
        if addr.as_u64() >= end {
            return Err(MemoryError::Unmapped(addr));
        }
        match addr.as_u64().checked_add(len as u64) {
            Some(limit) if limit <= end => Ok(()),
            _ => Err(MemoryError::Unmapped(VirtAddr::new(end))),
        }
    }

    fn pages_of(&self, addr: VirtAddr, len: usize) -> core::ops::RangeInclusive<usize> {
        let start = addr.as_u64() as usize;
        let end = start + len.max(1) - 1;
        (start / self.page_size)..=(end / self.page_size)
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("pages", &self.num_pages())
            .field("page_size", &self.page_size)
            .field("frames", &self.frame_numbers().collect::<Vec<_>>())
            .finish()
    }
}
