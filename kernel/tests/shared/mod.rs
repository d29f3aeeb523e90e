//! Shared fixture for the process lifecycle tests
//!
//! Every machine uses 16-byte pages and a 32-byte user stack so address
//! space layouts stay small enough to reason about by hand:
//!
//! | program        | code             | data / bss             | pages |
//! |----------------|------------------|------------------------|-------|
//! | `init`         | 32 x 0x90        | program names (24 B)   | 6     |
//! | `test/child`   | 48 x 0xC3, entry 8 |                      | 5     |
//! | `test/big`     | 16 x 0x90        | 1600 B bss             | 103   |
//! | `test/bad`     | 4 bytes, entry 10 |                       | -     |

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kernel::logger;
use kernel::memory::VirtAddr;
use kernel::task::scheduler::ThreadScheduler;
use kernel::{KernelConfig, ProcessId, ProcessManager, ProcessState, ProgramImage, ProgramRegistry};
use log::LevelFilter;

pub const PAGE_SIZE: usize = 16;
pub const STACK_SIZE: usize = 32;

/// Pages used by an `init` image
pub const INIT_PAGES: usize = 6;
/// Pages used by a `test/child` image
pub const CHILD_PAGES: usize = 5;

/// Where `init` keeps the string "test/child"
pub const CHILD_NAME_ADDR: u64 = 32;
/// Where `init` keeps the string "test/missing"
pub const MISSING_NAME_ADDR: u64 = 43;
/// First writable byte past `init`'s data
pub const SCRATCH_ADDR: u64 = 64;

pub struct Machine {
    pub manager: Arc<ProcessManager>,
    pub registry: Arc<ProgramRegistry>,
    pub scheduler: Arc<ThreadScheduler>,
}

pub fn machine(max_processes: usize, frames: usize) -> Machine {
    logger::init(LevelFilter::Debug);

    let registry = Arc::new(ProgramRegistry::new());
    registry.install(
        ProgramImage::new("init", vec![0x90; 32]).with_data(b"test/child\0test/missing\0".to_vec()),
    );
    registry.install(ProgramImage::new("test/child", vec![0xC3; 48]).with_entry(8));
    registry.install(ProgramImage::new("test/big", vec![0x90; 16]).with_bss(1600));
    registry.install(ProgramImage::new("test/bad", vec![0; 4]).with_entry(10));

    let scheduler = Arc::new(ThreadScheduler::new());
    let config = KernelConfig {
        max_processes,
        physical_frames: frames,
        page_size: PAGE_SIZE,
        user_stack_size: STACK_SIZE,
    };
    let manager = ProcessManager::new(config, registry.clone(), scheduler.clone())
        .expect("test configuration is valid");

    Machine {
        manager: Arc::new(manager),
        registry,
        scheduler,
    }
}

impl Machine {
    pub fn boot(&self) -> ProcessId {
        self.manager.boot("init").expect("boot init")
    }

    pub fn read(&self, pid: ProcessId, addr: u64, len: usize) -> Vec<u8> {
        self.manager
            .with_process_mut(pid, |p| {
                let mut buf = vec![0; len];
                p.address_space_mut()
                    .expect("live process")
                    .read(VirtAddr::new(addr), &mut buf)
                    .expect("readable");
                buf
            })
            .expect("process exists")
    }

    pub fn write(&self, pid: ProcessId, addr: u64, data: &[u8]) {
        self.manager
            .with_process_mut(pid, |p| {
                p.address_space_mut()
                    .expect("live process")
                    .write(VirtAddr::new(addr), data)
                    .expect("writable");
            })
            .expect("process exists")
    }

    pub fn frames_of(&self, pid: ProcessId) -> Vec<usize> {
        self.manager
            .with_process(pid, |p| {
                p.address_space()
                    .map(|s| s.frame_numbers().collect())
                    .unwrap_or_default()
            })
            .expect("process exists")
    }

    pub fn free_frames(&self) -> usize {
        self.manager.frame_pool().free_frames()
    }

    pub fn assert_consistent(&self) {
        if let Err(violation) = self.manager.check_invariants() {
            self.manager.debug_processes();
            panic!("invariant violated: {}", violation);
        }
    }

    /// Spin until `pid` has parked itself in wait
    pub fn wait_until_blocked(&self, pid: ProcessId) {
        while self.manager.state_of(pid) != Some(ProcessState::Blocked) {
            thread::sleep(Duration::from_millis(1));
        }
    }
}
