//! Process structure and lifecycle

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::memory::AddressSpace;
use crate::task::context::CpuContext;

/// Process ID type
///
/// Ids are handed out by the process table and never reused. Zero is never
/// a valid id; it is what a freshly forked child sees as `Fork`'s result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    pub const fn new(id: u64) -> Self {
        ProcessId(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PID {}", self.0)
    }
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot holds no process
    Unused,
    /// Ready to run
    Runnable,
    /// Currently running
    Running,
    /// Suspended in wait
    Blocked,
    /// Terminated, exit status not yet collected
    Zombie(i32),
}

impl ProcessState {
    pub fn is_zombie(self) -> bool {
        matches!(self, ProcessState::Zombie(_))
    }

    /// Exit status, once there is one
    pub fn exit_status(self) -> Option<i32> {
        match self {
            ProcessState::Zombie(status) => Some(status),
            _ => None,
        }
    }
}

/// Who collects a process's exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// The root process has no parent
    None,
    /// The process that forked it
    Process(ProcessId),
    /// The original parent exited first; reclaimed on termination
    Reaper,
}

/// Which children a wait is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Any,
    Child(ProcessId),
}

impl WaitTarget {
    pub fn matches(self, pid: ProcessId) -> bool {
        match self {
            WaitTarget::Any => true,
            WaitTarget::Child(target) => target == pid,
        }
    }
}

/// A process represents a running program with its own address space
pub struct Process {
    /// Unique process identifier
    pub id: ProcessId,

    /// Process name (for debugging); the program it last exec'd
    pub name: String,

    /// Current state
    pub state: ProcessState,

    pub parent: Parent,

    /// Child processes whose status has not been collected
    pub children: Vec<ProcessId>,

    /// Set while blocked in wait
    pub waiting_for: Option<WaitTarget>,

    /// Owned memory; `None` once the process has terminated
    pub space: Option<AddressSpace>,

    /// Saved registers
    pub context: CpuContext,
}

impl Process {
    /// Create a new runnable process
    pub fn new(
        id: ProcessId,
        name: String,
        parent: Parent,
        space: AddressSpace,
        context: CpuContext,
    ) -> Self {
        Process {
            id,
            name,
            state: ProcessState::Runnable,
            parent,
            children: Vec::new(),
            waiting_for: None,
            space: Some(space),
            context,
        }
    }

    pub fn is_live(&self) -> bool {
        !self.state.is_zombie()
    }

    pub fn add_child(&mut self, child: ProcessId) {
        self.children.push(child);
    }

    /// Returns true if `child` was listed
    pub fn remove_child(&mut self, child: ProcessId) -> bool {
        let before = self.children.len();
        self.children.retain(|&id| id != child);
        self.children.len() != before
    }

    pub fn has_child(&self, child: ProcessId) -> bool {
        self.children.contains(&child)
    }

    /// Record the exit status and give back the address space
    pub fn terminate(&mut self, status: i32) {
        self.state = ProcessState::Zombie(status);
        self.waiting_for = None;
        self.space = None;
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.state.exit_status()
    }

    pub fn address_space(&self) -> Option<&AddressSpace> {
        self.space.as_ref()
    }

    pub fn address_space_mut(&mut self) -> Option<&mut AddressSpace> {
        self.space.as_mut()
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}
