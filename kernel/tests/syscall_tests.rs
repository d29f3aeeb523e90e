//! The numbered system call surface

mod shared;

use kernel::syscall::errno::{EAGAIN, ECHILD, EFAULT, ENOENT, ENOMEM, ENOSYS, ESRCH};
use kernel::syscall::{dispatch, SyscallNumber};
use kernel::task::context::CpuContext;
use kernel::ProcessId;
use shared::{machine, CHILD_NAME_ADDR, INIT_PAGES, MISSING_NAME_ADDR};

fn rax(m: &shared::Machine, pid: ProcessId) -> i64 {
    m.manager.with_process(pid, |p| p.context.return_value()).unwrap()
}

#[test]
fn fork_join_exec_through_dispatch() {
    let m = machine(4, 64);
    let root = m.boot();
    let manager = &m.manager;

    let ret = dispatch(manager, root, SyscallNumber::Fork as u64, [0; 3]);
    assert!(ret > 0);
    let child = ProcessId::new(ret as u64);
    assert_eq!(rax(&m, root), ret as i64);
    assert_eq!(rax(&m, child), 0);

    // The child joins "x", which is 0 on its side
    let ret = dispatch(manager, child, SyscallNumber::Join as u64, [0; 3]);
    assert_eq!(ret, -(ECHILD as isize));
    assert_eq!(rax(&m, child), -(ECHILD as i64));

    let ret = dispatch(manager, child, SyscallNumber::Exec as u64, [CHILD_NAME_ADDR, 0, 0]);
    assert_eq!(ret, 8);
    assert_eq!(m.manager.with_process(child, |p| p.context).unwrap(), CpuContext::new(8, 64));

    assert_eq!(dispatch(manager, child, SyscallNumber::Exit as u64, [7, 0, 0]), 0);

    let ret = dispatch(manager, root, SyscallNumber::Join as u64, [child.as_u64(), 0, 0]);
    assert_eq!(ret, 7);
    assert_eq!(rax(&m, root), 7);

    let ret = dispatch(manager, root, SyscallNumber::Exec as u64, [MISSING_NAME_ADDR, 0, 0]);
    assert_eq!(ret, -(ENOENT as isize));
    assert_eq!(m.manager.with_process(root, |p| p.name.clone()).unwrap(), "init");

    assert_eq!(m.manager.process_count(), 1);
    m.assert_consistent();
}

#[test]
fn negative_exit_status_round_trips() {
    let m = machine(4, 64);
    let root = m.boot();
    let child = m.manager.fork(root).unwrap();

    dispatch(&m.manager, child, SyscallNumber::Exit as u64, [(-3i64) as u64, 0, 0]);
    let ret = dispatch(&m.manager, root, SyscallNumber::Join as u64, [child.as_u64(), 0, 0]);
    assert_eq!(ret, -3);
}

#[test]
fn errors_map_to_negative_errno() {
    let m = machine(1, INIT_PAGES + 2);
    let root = m.boot();
    let call = |number: SyscallNumber, arg: u64| dispatch(&m.manager, root, number as u64, [arg, 0, 0]);

    assert_eq!(dispatch(&m.manager, root, 77, [0; 3]), -(ENOSYS as isize));
    assert_eq!(call(SyscallNumber::Halt, 0), -(ENOSYS as isize));
    assert_eq!(call(SyscallNumber::Fork, 0), -(EAGAIN as isize));
    assert_eq!(call(SyscallNumber::Exec, 4096), -(EFAULT as isize));
    assert_eq!(call(SyscallNumber::Join, 5), -(ECHILD as isize));
    assert_eq!(call(SyscallNumber::Yield, 0), 0);
    assert_eq!(
        dispatch(&m.manager, ProcessId::new(42), SyscallNumber::Join as u64, [0; 3]),
        -(ESRCH as isize)
    );
    assert_eq!(rax(&m, root), 0);

    let m = machine(4, INIT_PAGES + 2);
    let root = m.boot();
    assert_eq!(
        dispatch(&m.manager, root, SyscallNumber::Fork as u64, [0; 3]),
        -(ENOMEM as isize)
    );
    m.assert_consistent();
}

#[test]
fn result_for_a_vanished_caller_is_logged_not_stored() {
    let m = machine(2, 64);
    m.boot();
    kernel::logger::set_capture(true);

    let ghost = ProcessId::new(4242);
    assert_eq!(
        dispatch(&m.manager, ghost, SyscallNumber::Yield as u64, [0; 3]),
        -(ESRCH as isize)
    );

    let captured = kernel::logger::take_captured();
    assert!(
        captured.lines().any(|l| l.contains("not storing result for PID 4242")),
        "missing log line in:\n{}",
        captured
    );
    m.assert_consistent();
}
