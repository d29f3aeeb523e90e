//! Process manager - handles process lifecycle and scheduling
//!
//! All process records live in one [`ProcessTable`] behind a single lock,
//! together with the round-robin ready queue. Every state transition
//! happens while that lock is held. Program loading and scheduler calls
//! happen outside it.

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use super::process::{Parent, Process, ProcessId, ProcessState, WaitTarget};
use super::table::ProcessTable;
use super::{exec, fork, wait, ProcessError};
use crate::config::{ConfigError, KernelConfig};
use crate::loader::ProgramLoader;
use crate::memory::FramePool;
use crate::task::scheduler::Scheduler;

/// Everything guarded by the manager lock
struct ManagerState {
    table: ProcessTable,

    /// Queue of runnable processes
    ready_queue: VecDeque<ProcessId>,

    /// Process picked by the last `schedule_next`
    current_pid: Option<ProcessId>,
}

impl ManagerState {
    fn enqueue(&mut self, pid: ProcessId) {
        if !self.ready_queue.contains(&pid) {
            self.ready_queue.push_back(pid);
        }
    }

    fn dequeue(&mut self, pid: ProcessId) {
        self.ready_queue.retain(|&p| p != pid);
        if self.current_pid == Some(pid) {
            self.current_pid = None;
        }
    }

    /// Move a running process back to the ready queue
    fn make_runnable(&mut self, pid: ProcessId) {
        let Some(process) = self.table.get_mut(pid) else {
            return;
        };
        match process.state {
            ProcessState::Running => {
                process.state = ProcessState::Runnable;
                if self.current_pid == Some(pid) {
                    self.current_pid = None;
                }
                self.enqueue(pid);
            }
            ProcessState::Runnable => self.enqueue(pid),
            _ => {}
        }
    }

    fn block(&mut self, pid: ProcessId, target: WaitTarget) -> Result<(), ProcessError> {
        let process = self.table.lookup_mut(pid)?;
        process.state = ProcessState::Blocked;
        process.waiting_for = Some(target);
        self.dequeue(pid);
        Ok(())
    }

    /// Undo `block` for a waiter that finished without being woken by exit
    fn resume(&mut self, pid: ProcessId) {
        if let Some(process) = self.table.get_mut(pid) {
            if process.state == ProcessState::Blocked {
                process.state = ProcessState::Runnable;
                process.waiting_for = None;
                self.enqueue(pid);
            }
        }
    }
}

/// Process manager handles all processes in the system
pub struct ProcessManager {
    state: Mutex<ManagerState>,
    frames: Arc<FramePool>,
    loader: Arc<dyn ProgramLoader>,
    scheduler: Arc<dyn Scheduler>,
    config: KernelConfig,
}

impl ProcessManager {
    /// Create a new process manager with an empty table and a fresh frame pool
    pub fn new(
        config: KernelConfig,
        loader: Arc<dyn ProgramLoader>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let frames = FramePool::new(config.physical_frames, config.page_size);
        log::info!(
            "ProcessManager: {} process slots, {} frames of {} bytes",
            config.max_processes,
            config.physical_frames,
            config.page_size
        );
        Ok(ProcessManager {
            state: Mutex::new(ManagerState {
                table: ProcessTable::new(config.max_processes),
                ready_queue: VecDeque::new(),
                current_pid: None,
            }),
            frames,
            loader,
            scheduler,
            config,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn frame_pool(&self) -> &Arc<FramePool> {
        &self.frames
    }

    /// Create the root process running `program`
    pub fn boot(&self, program: &str) -> Result<ProcessId, ProcessError> {
        let loaded = exec::load_program(
            &*self.loader,
            &self.frames,
            self.config.user_stack_size,
            program,
        )?;

        let mut state = self.state.lock();
        let pid = state.table.allocate(|pid| {
            Ok(Process::new(pid, loaded.name, Parent::None, loaded.space, loaded.context))
        })?;
        state.enqueue(pid);

        log::info!("Created root process '{}' ({})", program, pid);
        Ok(pid)
    }

    /// Fork `parent`; returns the child's id
    ///
    /// Both processes end up runnable. The parent's `rax` holds the child's
    /// id and the child's holds 0.
    pub fn fork(&self, parent: ProcessId) -> Result<ProcessId, ProcessError> {
        let mut state = self.state.lock();
        let child = fork::fork_process(&mut state.table, parent)?;
        state.enqueue(child);
        state.make_runnable(parent);
        Ok(child)
    }

    /// Replace the image of `pid` with `program`; returns the new entry point
    ///
    /// On failure the process is exactly as it was before the call.
    pub fn exec(&self, pid: ProcessId, program: &str) -> Result<u64, ProcessError> {
        if !self.state.lock().table.lookup(pid)?.is_live() {
            return Err(ProcessError::NotFound);
        }

        let loaded = exec::load_program(
            &*self.loader,
            &self.frames,
            self.config.user_stack_size,
            program,
        )
        .map_err(|e| {
            log::warn!("exec: {} failed to load '{}': {}", pid, program, e);
            e
        })?;

        let mut state = self.state.lock();
        exec::commit_exec(&mut state.table, pid, loaded)
    }

    /// Terminate `pid` with `status`
    pub fn exit(&self, pid: ProcessId, status: i32) -> Result<(), ProcessError> {
        let wake = {
            let mut state = self.state.lock();
            let wake = wait::exit_process(&mut state.table, pid, status)?;
            state.dequeue(pid);
            if let Some(parent) = wake {
                state.enqueue(parent);
            }
            wake
        };

        if let Some(parent) = wake {
            self.scheduler.wake(parent);
        }
        Ok(())
    }

    /// Wait for a child of `pid` to terminate and collect its exit status
    ///
    /// Returns at once if a matching child is already a zombie, fails with
    /// `NoChildren` if there is nothing to wait for, and otherwise blocks
    /// through the scheduler until a matching child exits.
    pub fn wait(
        &self,
        pid: ProcessId,
        target: WaitTarget,
    ) -> Result<(ProcessId, i32), ProcessError> {
        loop {
            {
                let mut state = self.state.lock();
                match wait::reap_child(&mut state.table, pid, target) {
                    Ok(Some(reaped)) => {
                        state.resume(pid);
                        return Ok(reaped);
                    }
                    Ok(None) => state.block(pid, target)?,
                    Err(e) => {
                        state.resume(pid);
                        return Err(e);
                    }
                }
            }

            log::debug!("wait: {} blocked on {:?}", pid, target);
            self.scheduler.block(pid);
        }
    }

    /// Like [`wait`](Self::wait), but returns `Ok(None)` instead of blocking
    pub fn try_wait(
        &self,
        pid: ProcessId,
        target: WaitTarget,
    ) -> Result<Option<(ProcessId, i32)>, ProcessError> {
        let mut state = self.state.lock();
        wait::reap_child(&mut state.table, pid, target)
    }

    /// Get the next ready process to run
    ///
    /// Round-robin: the previously running process goes to the back of the
    /// queue and the front runnable process becomes the running one.
    pub fn schedule_next(&self) -> Option<ProcessId> {
        let mut state = self.state.lock();
        if let Some(old_pid) = state.current_pid.take() {
            state.make_runnable(old_pid);
        }

        while let Some(pid) = state.ready_queue.pop_front() {
            if let Some(process) = state.table.get_mut(pid) {
                if process.state == ProcessState::Runnable {
                    process.state = ProcessState::Running;
                    state.current_pid = Some(pid);
                    return Some(pid);
                }
            }
        }
        None
    }

    /// Give up the CPU: a running process becomes runnable again
    pub fn yield_process(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let mut state = self.state.lock();
        if !state.table.lookup(pid)?.is_live() {
            return Err(ProcessError::NotFound);
        }
        state.make_runnable(pid);
        Ok(())
    }

    pub fn current_pid(&self) -> Option<ProcessId> {
        self.state.lock().current_pid
    }

    pub fn ready_queue(&self) -> Vec<ProcessId> {
        self.state.lock().ready_queue.iter().copied().collect()
    }

    /// Run `f` against the record of `pid` under the table lock
    pub fn with_process<R>(
        &self,
        pid: ProcessId,
        f: impl FnOnce(&Process) -> R,
    ) -> Result<R, ProcessError> {
        let state = self.state.lock();
        state.table.lookup(pid).map(f)
    }

    pub fn with_process_mut<R>(
        &self,
        pid: ProcessId,
        f: impl FnOnce(&mut Process) -> R,
    ) -> Result<R, ProcessError> {
        let mut state = self.state.lock();
        state.table.lookup_mut(pid).map(f)
    }

    /// Read-only access to the whole table
    pub fn with_table<R>(&self, f: impl FnOnce(&ProcessTable) -> R) -> R {
        f(&self.state.lock().table)
    }

    pub fn state_of(&self, pid: ProcessId) -> Option<ProcessState> {
        self.state.lock().table.get(pid).map(|p| p.state)
    }

    /// Get process count (live and zombie)
    pub fn process_count(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Table audit plus ready queue and frame accounting checks
    ///
    /// Frame accounting assumes no exec is loading a program concurrently.
    pub fn check_invariants(&self) -> Result<(), String> {
        let state = self.state.lock();
        state.table.check_invariants()?;

        for (i, &pid) in state.ready_queue.iter().enumerate() {
            match state.table.get(pid) {
                Some(p) if p.state == ProcessState::Runnable => {}
                Some(p) => return Err(format!("{} queued in state {:?}", pid, p.state)),
                None => return Err(format!("{} queued but not in table", pid)),
            }
            if state.ready_queue.iter().skip(i + 1).any(|&other| other == pid) {
                return Err(format!("{} queued twice", pid));
            }
        }

        let mut owned = 0;
        for process in state.table.iter() {
            match process.state {
                ProcessState::Runnable if !state.ready_queue.contains(&process.id) => {
                    return Err(format!("runnable {} not queued", process.id));
                }
                ProcessState::Running if state.current_pid != Some(process.id) => {
                    return Err(format!("{} running but not current", process.id));
                }
                _ => {}
            }
            owned += process.address_space().map_or(0, |s| s.num_pages());
        }

        let free = self.frames.free_frames();
        if owned + free != self.frames.total_frames() {
            return Err(format!(
                "frame leak: {} owned + {} free != {} total",
                owned,
                free,
                self.frames.total_frames()
            ));
        }
        Ok(())
    }

    /// Debug: log all processes
    pub fn debug_processes(&self) {
        let state = self.state.lock();
        log::info!("=== Process List ===");
        for process in state.table.iter() {
            log::info!(
                "  {}: {} - {:?} (parent {:?}, children {:?})",
                process.id,
                process.name,
                process.state,
                process.parent,
                process.children
            );
        }
        log::info!("Current PID: {:?}", state.current_pid);
        log::info!("Ready queue: {:?}", state.ready_queue);
        log::info!(
            "Free frames: {}/{}",
            self.frames.free_frames(),
            self.frames.total_frames()
        );
    }
}
