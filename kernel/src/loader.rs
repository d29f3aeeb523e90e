//! Program images and the loader seam used by exec
//!
//! The on-disk executable format is not this crate's business. A
//! [`ProgramLoader`] hands back an already-decoded [`ProgramImage`]; the
//! in-memory [`ProgramRegistry`] is the loader used by the runner and tests.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use spin::RwLock;

/// A decoded program, ready to be laid out in an address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    pub name: String,
    /// Code segment, loaded at virtual address 0
    pub code: Vec<u8>,
    /// Initialized data, loaded right after the code
    pub data: Vec<u8>,
    /// Zero-filled bytes following the data
    pub bss_size: usize,
    /// Entry point (offset into the code segment)
    pub entry: u64,
}

impl ProgramImage {
    pub fn new(name: &str, code: Vec<u8>) -> Self {
        ProgramImage {
            name: name.to_string(),
            code,
            data: Vec::new(),
            bss_size: 0,
            entry: 0,
        }
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn with_bss(mut self, bss_size: usize) -> Self {
        self.bss_size = bss_size;
        self
    }

    pub fn with_entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Bytes needed for code, data and bss (excluding the stack)
    pub fn image_size(&self) -> usize {
        self.code.len() + self.data.len() + self.bss_size
    }

    /// Check that the image can be started
    pub fn validate(&self) -> Result<(), LoadError> {
        if self.code.is_empty() {
            return Err(LoadError::InvalidImage("empty code segment"));
        }
        if self.entry >= self.code.len() as u64 {
            return Err(LoadError::InvalidImage("entry point outside code segment"));
        }
        Ok(())
    }
}

/// Loader failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No program under that name
    NotFound(String),
    /// The program exists but cannot be started
    InvalidImage(&'static str),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::NotFound(name) => write!(f, "program '{}' not found", name),
            LoadError::InvalidImage(reason) => write!(f, "invalid program image: {}", reason),
        }
    }
}

/// Source of program images for exec
pub trait ProgramLoader: Send + Sync {
    /// Resolve `name` into a validated image
    fn load(&self, name: &str) -> Result<ProgramImage, LoadError>;
}

/// An in-memory table of programs keyed by path
#[derive(Default)]
pub struct ProgramRegistry {
    programs: RwLock<BTreeMap<String, ProgramImage>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a program under its image name
    pub fn install(&self, image: ProgramImage) {
        log::debug!("ProgramRegistry: installed '{}' ({} bytes)", image.name, image.image_size());
        self.programs.write().insert(image.name.clone(), image);
    }

    pub fn remove(&self, name: &str) -> Option<ProgramImage> {
        self.programs.write().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.programs.read().keys().cloned().collect()
    }
}

impl ProgramLoader for ProgramRegistry {
    fn load(&self, name: &str) -> Result<ProgramImage, LoadError> {
        let image = self
            .programs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        image.validate()?;
        Ok(image)
    }
}
