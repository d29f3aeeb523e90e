//! Fixed-capacity process table
//!
//! Records live in an arena of slots indexed by slot number. A process id
//! encodes its slot, `id = generation * capacity + slot + 1`, so lookup is a
//! division plus an id comparison. Each slot bumps its generation when it is
//! released, which keeps ids unique for the lifetime of the table.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use super::process::{Parent, Process, ProcessId, ProcessState};
use super::ProcessError;

struct Slot {
    generation: u64,
    process: Option<Process>,
}

pub struct ProcessTable {
    slots: Vec<Slot>,
    live: usize,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                process: None,
            })
            .collect();
        ProcessTable { slots, live: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots (live and zombie)
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn free_slots(&self) -> usize {
        self.capacity() - self.live
    }

    /// Install a new record in the lowest free slot
    ///
    /// `build` receives the id the record will carry. If it fails, the slot
    /// stays free and nothing is recorded.
    pub fn allocate<F>(&mut self, build: F) -> Result<ProcessId, ProcessError>
    where
        F: FnOnce(ProcessId) -> Result<Process, ProcessError>,
    {
        let capacity = self.capacity() as u64;
        let index = self
            .slots
            .iter()
            .position(|slot| slot.process.is_none())
            .ok_or(ProcessError::NoFreeSlot)?;

        let slot = &mut self.slots[index];
        let pid = ProcessId::new(slot.generation * capacity + index as u64 + 1);
        let process = build(pid)?;
        debug_assert_eq!(process.id, pid);
        slot.process = Some(process);
        self.live += 1;
        Ok(pid)
    }

    fn index_of(&self, pid: ProcessId) -> Option<usize> {
        let raw = pid.as_u64().checked_sub(1)?;
        let index = (raw % self.capacity() as u64) as usize;
        match &self.slots[index].process {
            Some(process) if process.id == pid => Some(index),
            _ => None,
        }
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        let index = self.index_of(pid)?;
        self.slots[index].process.as_ref()
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        let index = self.index_of(pid)?;
        self.slots[index].process.as_mut()
    }

    pub fn lookup(&self, pid: ProcessId) -> Result<&Process, ProcessError> {
        self.get(pid).ok_or(ProcessError::NotFound)
    }

    pub fn lookup_mut(&mut self, pid: ProcessId) -> Result<&mut Process, ProcessError> {
        self.get_mut(pid).ok_or(ProcessError::NotFound)
    }

    pub fn contains(&self, pid: ProcessId) -> bool {
        self.index_of(pid).is_some()
    }

    /// Return a zombie's slot to the free pool
    ///
    /// # Panics
    ///
    /// If `pid` is unknown or not a zombie. Either means the exit status was
    /// collected twice or a live record is being torn down.
    pub fn release(&mut self, pid: ProcessId) -> Process {
        let index = match self.index_of(pid) {
            Some(index) => index,
            None => {
                log::error!("ProcessTable: release of unknown {}", pid);
                panic!("process table: {} released twice", pid);
            }
        };

        let slot = &mut self.slots[index];
        match slot.process.take() {
            Some(process) if process.state.is_zombie() => {
                slot.generation += 1;
                self.live -= 1;
                process
            }
            other => {
                let state = other.as_ref().map(|p| p.state);
                slot.process = other;
                log::error!("ProcessTable: release of live {} in state {:?}", pid, state);
                panic!("process table: {} released while not a zombie", pid);
            }
        }
    }

    /// Ids of all occupied slots, in slot order
    pub fn pids(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.iter().map(|p| p.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> + '_ {
        self.slots.iter().filter_map(|slot| slot.process.as_ref())
    }

    /// State of the record in slot `index`
    pub fn slot_state(&self, index: usize) -> ProcessState {
        self.slots
            .get(index)
            .and_then(|slot| slot.process.as_ref())
            .map_or(ProcessState::Unused, |p| p.state)
    }

    /// Audit the structural invariants of the table
    ///
    /// Checks parent and child links agree, every zombie has given back its
    /// memory, every live process owns one, and no physical frame is owned
    /// by two address spaces.
    pub fn check_invariants(&self) -> Result<(), String> {
        let occupied = self.slots.iter().filter(|s| s.process.is_some()).count();
        if occupied != self.live {
            return Err(format!("live count {} but {} slots occupied", self.live, occupied));
        }

        let mut frames = BTreeSet::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(process) = &slot.process else {
                continue;
            };
            let pid = process.id;
            if self.index_of(pid) != Some(index) {
                return Err(format!("{} stored in slot {}", pid, index));
            }

            match process.state {
                ProcessState::Unused => {
                    return Err(format!("{} occupies a slot but is Unused", pid));
                }
                ProcessState::Zombie(_) => {
                    if process.space.is_some() {
                        return Err(format!("zombie {} still owns an address space", pid));
                    }
                    if !process.children.is_empty() {
                        return Err(format!("zombie {} still lists children", pid));
                    }
                    if !matches!(process.parent, Parent::Process(_)) {
                        return Err(format!("zombie {} has no parent to collect it", pid));
                    }
                }
                _ => {
                    let Some(space) = &process.space else {
                        return Err(format!("live {} has no address space", pid));
                    };
                    for frame in space.frame_numbers() {
                        if !frames.insert(frame) {
                            return Err(format!("frame {} owned twice (seen again in {})", frame, pid));
                        }
                    }
                }
            }

            if process.state != ProcessState::Blocked && process.waiting_for.is_some() {
                return Err(format!("{} is waiting but not blocked", pid));
            }

            if let Parent::Process(parent_pid) = process.parent {
                match self.get(parent_pid) {
                    Some(parent) if parent.has_child(pid) => {}
                    Some(_) => {
                        return Err(format!("{} missing from children of {}", pid, parent_pid));
                    }
                    None => return Err(format!("{} has dangling parent {}", pid, parent_pid)),
                }
            }

            for &child in &process.children {
                match self.get(child) {
                    Some(c) if c.parent == Parent::Process(pid) => {}
                    _ => return Err(format!("{} lists {} which is not its child", pid, child)),
                }
            }
        }
        Ok(())
    }
}
