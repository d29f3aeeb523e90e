//! Ready queue dispatch order

mod shared;

use kernel::syscall::{dispatch, SyscallNumber};
use kernel::ProcessState;
use shared::machine;

#[test]
fn round_robin_over_runnable_processes() {
    let m = machine(8, 64);
    let root = m.boot();
    let a = m.manager.fork(root).unwrap();
    let b = m.manager.fork(root).unwrap();
    assert_eq!(m.manager.ready_queue(), vec![root, a, b]);

    assert_eq!(m.manager.schedule_next(), Some(root));
    assert_eq!(m.manager.state_of(root), Some(ProcessState::Running));
    assert_eq!(m.manager.current_pid(), Some(root));
    m.assert_consistent();

    // The previous process goes to the back of the queue
    assert_eq!(m.manager.schedule_next(), Some(a));
    assert_eq!(m.manager.ready_queue(), vec![b, root]);

    assert_eq!(dispatch(&m.manager, a, SyscallNumber::Yield as u64, [0; 3]), 0);
    assert_eq!(m.manager.state_of(a), Some(ProcessState::Runnable));
    assert_eq!(m.manager.current_pid(), None);
    assert_eq!(m.manager.ready_queue(), vec![b, root, a]);

    assert_eq!(m.manager.schedule_next(), Some(b));
    m.manager.exit(b, 0).unwrap();
    assert_eq!(m.manager.current_pid(), None);
    assert_eq!(m.manager.ready_queue(), vec![root, a]);
    m.assert_consistent();

    assert_eq!(m.manager.schedule_next(), Some(root));
    assert_eq!(m.manager.schedule_next(), Some(a));
    m.assert_consistent();
}

#[test]
fn nothing_to_schedule_once_everything_exited() {
    let m = machine(4, 64);
    let root = m.boot();
    m.manager.exit(root, 0).unwrap();

    assert_eq!(m.manager.schedule_next(), None);
    assert!(m.manager.ready_queue().is_empty());
    m.assert_consistent();
}
