//! Exec: image replacement and failure atomicity

mod shared;

use std::sync::{Arc, Mutex, Weak};
use std::thread;

use kernel::config::ConfigError;
use kernel::task::context::CpuContext;
use kernel::task::scheduler::ThreadScheduler;
use kernel::{
    KernelConfig, LoadError, Parent, ProcessError, ProcessId, ProcessManager, ProcessState,
    ProgramImage, ProgramLoader, ProgramRegistry, WaitTarget,
};
use shared::{machine, CHILD_PAGES, INIT_PAGES, SCRATCH_ADDR};

#[test]
fn failed_exec_leaves_the_process_untouched() {
    let m = machine(4, 64);
    let root = m.boot();
    m.write(root, SCRATCH_ADDR, b"keep");

    let context = m.manager.with_process(root, |p| p.context).unwrap();
    let frames = m.frames_of(root);
    let free = m.free_frames();

    for (program, err) in [
        ("test/missing", ProcessError::ProgramNotFound),
        ("test/bad", ProcessError::InvalidImage),
        ("test/big", ProcessError::OutOfMemory),
    ] {
        assert_eq!(m.manager.exec(root, program), Err(err), "exec {}", program);

        assert_eq!(m.manager.with_process(root, |p| p.context).unwrap(), context);
        assert_eq!(m.manager.with_process(root, |p| p.name.clone()).unwrap(), "init");
        assert_eq!(m.frames_of(root), frames);
        assert_eq!(m.read(root, SCRATCH_ADDR, 4), b"keep");
        assert_eq!(m.free_frames(), free);
        m.assert_consistent();
    }
}

#[test]
fn exec_replaces_image_but_keeps_identity() {
    let m = machine(4, 64);
    let root = m.boot();
    let child = m.manager.fork(root).unwrap();
    m.write(child, SCRATCH_ADDR, b"old image");

    assert_eq!(m.manager.exec(child, "test/child"), Ok(8));

    m.manager
        .with_process(child, |p| {
            assert_eq!(p.id, child);
            assert_eq!(p.parent, Parent::Process(root));
            assert_eq!(p.name, "test/child");
            assert_eq!(p.state, ProcessState::Runnable);
            assert_eq!(p.context, CpuContext::new(8, 64));
            assert_eq!(p.address_space().map(|s| s.num_pages()), Some(CHILD_PAGES));
        })
        .unwrap();
    assert_eq!(m.read(child, 0, 4), [0xC3; 4]);
    assert_eq!(m.read(child, SCRATCH_ADDR, 9), [0; 9]);
    assert_eq!(m.read(root, 0, 4), [0x90; 4]);

    assert!(m.manager.with_process(root, |p| p.has_child(child)).unwrap());
    assert_eq!(m.free_frames(), 64 - INIT_PAGES - CHILD_PAGES);
    m.assert_consistent();
}

#[test]
fn exec_of_a_terminated_process_fails() {
    let m = machine(4, 64);
    let root = m.boot();
    let child = m.manager.fork(root).unwrap();
    m.manager.exit(child, 0).unwrap();

    assert_eq!(m.manager.exec(child, "test/child"), Err(ProcessError::NotFound));
    m.assert_consistent();
}

/// Terminates `victim` in the middle of loading its next image
struct ExitDuringLoad {
    programs: ProgramRegistry,
    target: Mutex<Option<(Weak<ProcessManager>, ProcessId)>>,
}

impl ProgramLoader for ExitDuringLoad {
    fn load(&self, name: &str) -> Result<ProgramImage, LoadError> {
        let target = self.target.lock().unwrap().take();
        if let Some((manager, victim)) = target {
            let manager = manager.upgrade().expect("manager alive during exec");
            manager.exit(victim, 9).expect("victim was live");
        }
        self.programs.load(name)
    }
}

#[test]
fn exec_abandons_commit_when_process_exits_during_load() {
    let loader = Arc::new(ExitDuringLoad {
        programs: ProgramRegistry::new(),
        target: Mutex::new(None),
    });
    loader.programs.install(
        ProgramImage::new("init", vec![0x90; 32]).with_data(b"test/child\0test/missing\0".to_vec()),
    );
    loader.programs.install(ProgramImage::new("test/child", vec![0xC3; 48]).with_entry(8));

    let config = KernelConfig {
        max_processes: 4,
        physical_frames: 64,
        page_size: shared::PAGE_SIZE,
        user_stack_size: shared::STACK_SIZE,
    };
    let manager = Arc::new(
        ProcessManager::new(config, loader.clone(), Arc::new(ThreadScheduler::new())).unwrap(),
    );
    let root = manager.boot("init").unwrap();
    let child = manager.fork(root).unwrap();
    let free = manager.frame_pool().free_frames();

    *loader.target.lock().unwrap() = Some((Arc::downgrade(&manager), child));
    assert_eq!(manager.exec(child, "test/child"), Err(ProcessError::NotFound));

    assert_eq!(manager.state_of(child), Some(ProcessState::Zombie(9)));
    assert!(manager.with_process(child, |p| p.address_space().is_none()).unwrap());
    // The child's old image went back on exit; the new one was never installed
    assert_eq!(manager.frame_pool().free_frames(), free + INIT_PAGES);
    assert_eq!(manager.check_invariants(), Ok(()));

    assert_eq!(manager.wait(root, WaitTarget::Child(child)), Ok((child, 9)));
    assert_eq!(manager.frame_pool().free_frames(), 64 - INIT_PAGES);
}

#[test]
fn stack_smaller_than_red_zone_is_rejected() {
    let config = KernelConfig {
        max_processes: 4,
        physical_frames: 64,
        page_size: 4,
        user_stack_size: 4,
    };
    let manager = ProcessManager::new(
        config,
        Arc::new(ProgramRegistry::new()),
        Arc::new(ThreadScheduler::new()),
    );
    assert!(matches!(manager, Err(ConfigError::StackSmallerThanRedZone)));
}

/// A forks B and C, execs a new program, then waits
#[test]
fn parent_execs_while_children_run() {
    let m = machine(8, 64);
    let a = m.boot();
    let b = m.manager.fork(a).unwrap();
    let c = m.manager.fork(a).unwrap();

    m.manager.exec(a, "test/child").unwrap();

    let waiter = {
        let manager = Arc::clone(&m.manager);
        thread::spawn(move || manager.wait(a, WaitTarget::Any))
    };
    m.wait_until_blocked(a);
    m.manager.exit(c, 3).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok((c, 3)));

    assert_eq!(m.read(a, 0, 1), [0xC3]);
    assert_eq!(m.read(b, 0, 1), [0x90]);
    assert!(m.frames_of(a).iter().all(|f| !m.frames_of(b).contains(f)));

    m.manager.exit(b, 0).unwrap();
    assert_eq!(m.manager.wait(a, WaitTarget::Any), Ok((b, 0)));
    assert_eq!(m.manager.process_count(), 1);
    m.assert_consistent();
}
