use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use kernel::config::{
    DEFAULT_MAX_PROCESSES, DEFAULT_PAGE_SIZE, DEFAULT_PHYSICAL_FRAMES, DEFAULT_USER_STACK_SIZE,
};
use kernel::logger;
use kernel::syscall::{self, SyscallNumber};
use kernel::task::scheduler::ThreadScheduler;
use kernel::{ForkResult, KernelConfig, ProcessId, ProgramImage, ProcessManager, ProgramRegistry};
use log::LevelFilter;

const FORK_PROGRAM: &str = "test/fork";
const MATMULT_PROGRAM: &str = "test/matmult";
const SORT_PROGRAM: &str = "test/sort";

/// Length of test/fork's code segment; its data segment follows
const FORK_CODE_LEN: usize = 64;

/// Run the fork/join/exec smoke program on the process core.
#[derive(Parser)]
#[command(name = "kproc", version)]
struct Args {
    /// Process table capacity
    #[arg(long, default_value_t = DEFAULT_MAX_PROCESSES)]
    max_processes: usize,
    /// Number of physical frames
    #[arg(long, default_value_t = DEFAULT_PHYSICAL_FRAMES)]
    frames: usize,
    /// Page and frame size in bytes
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
    /// User stack size in bytes
    #[arg(long, default_value_t = DEFAULT_USER_STACK_SIZE)]
    stack_size: usize,
    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level: LevelFilter = match args.log_level.parse() {
        Ok(level) => level,
        Err(_) => bail!("unknown log level '{}'", args.log_level),
    };
    logger::init(level);

    let config = KernelConfig {
        max_processes: args.max_processes,
        physical_frames: args.frames,
        page_size: args.page_size,
        user_stack_size: args.stack_size,
    };
    let manager = Arc::new(
        ProcessManager::new(config, Arc::new(programs()), Arc::new(ThreadScheduler::new()))
            .map_err(|e| anyhow!("invalid configuration: {}", e))?,
    );

    let root = manager
        .boot(FORK_PROGRAM)
        .map_err(|e| anyhow!("failed to boot {}: {}", FORK_PROGRAM, e))?;
    let statuses = run_fork_program(&manager, root)?;

    manager.debug_processes();
    if let Err(violation) = manager.check_invariants() {
        bail!("process table inconsistent after run: {}", violation);
    }
    if manager.process_count() != 0 {
        bail!("{} processes left in the table", manager.process_count());
    }

    println!("child joined with status {}", statuses.join_status);
    println!("child ran {} and exited with {}", MATMULT_PROGRAM, statuses.child_exit);
    println!("root ran {} and exited with {}", SORT_PROGRAM, statuses.root_exit);
    println!(
        "all {} frames returned to the pool",
        manager.frame_pool().free_frames()
    );
    Ok(())
}

/// The user programs, as images in the registry
fn programs() -> ProgramRegistry {
    let registry = ProgramRegistry::new();

    let mut names = Vec::new();
    names.extend_from_slice(MATMULT_PROGRAM.as_bytes());
    names.push(0);
    names.extend_from_slice(SORT_PROGRAM.as_bytes());
    names.push(0);
    registry.install(ProgramImage::new(FORK_PROGRAM, vec![0x90; FORK_CODE_LEN]).with_data(names));

    registry.install(ProgramImage::new(MATMULT_PROGRAM, vec![0x90; 96]).with_bss(3 * 4 * 20 * 20));
    registry.install(ProgramImage::new(SORT_PROGRAM, vec![0x90; 80]).with_bss(4 * 1024));
    registry
}

struct RunStatus {
    join_status: isize,
    child_exit: isize,
    root_exit: isize,
}

/// ```c
/// int x = Fork();
/// int retValue = Join(x);
/// if (x == 0) Exec(matFile);
/// Exec(sortFile);
/// ```
fn run_fork_program(manager: &Arc<ProcessManager>, root: ProcessId) -> Result<RunStatus> {
    let child = syscall::dispatch(manager, root, SyscallNumber::Fork as u64, [0; 3]);
    let child = match ForkResult::from_return_value(child as i64) {
        Some(ForkResult::Parent { child }) => child,
        _ => bail!("Fork failed in {}: {}", root, child),
    };

    let child_thread = {
        let manager = Arc::clone(manager);
        thread::Builder::new()
            .name(format!("pid-{}", child.as_u64()))
            .spawn(move || after_fork(&manager, child))
            .context("failed to start child thread")?
    };

    let (join_status, root_exit) = after_fork(manager, root)?;
    let (child_join, child_exit) = child_thread
        .join()
        .map_err(|_| anyhow!("child thread panicked"))??;

    if child_join >= 0 {
        bail!("Join(0) in the child returned {}, expected an error", child_join);
    }
    if join_status != child_exit {
        bail!("Join returned {} but the child exited with {}", join_status, child_exit);
    }
    Ok(RunStatus {
        join_status,
        child_exit,
        root_exit,
    })
}

/// The rest of fork.c, from each process's own view of `Fork`'s result
fn after_fork(manager: &ProcessManager, pid: ProcessId) -> Result<(isize, isize)> {
    let x = manager
        .with_process(pid, |p| p.context.return_value())
        .map_err(|e| anyhow!("{} vanished: {}", pid, e))?;
    let fork = ForkResult::from_return_value(x).context("Fork returned an error")?;

    let join = syscall::dispatch(manager, pid, SyscallNumber::Join as u64, [x as u64, 0, 0]);

    let program = match fork {
        ForkResult::Child => MATMULT_PROGRAM,
        ForkResult::Parent { .. } => SORT_PROGRAM,
    };
    let name_ptr = program_name_address(program)?;
    let exec = syscall::dispatch(manager, pid, SyscallNumber::Exec as u64, [name_ptr, 0, 0]);
    if exec < 0 {
        bail!("Exec({}) failed in {}: {}", program, pid, exec);
    }

    let status = match program {
        MATMULT_PROGRAM => matmult(),
        _ => sort(),
    };
    syscall::dispatch(manager, pid, SyscallNumber::Exit as u64, [status as u64, 0, 0]);
    Ok((join, status as isize))
}

/// Address of `program`'s name in the data segment of test/fork
fn program_name_address(program: &str) -> Result<u64> {
    let data = FORK_CODE_LEN as u64;
    match program {
        MATMULT_PROGRAM => Ok(data),
        SORT_PROGRAM => Ok(data + MATMULT_PROGRAM.len() as u64 + 1),
        _ => bail!("{} has no string for {}", FORK_PROGRAM, program),
    }
}

/// test/matmult: C = A * B for 20x20 matrices, returns C[19][19]
fn matmult() -> i32 {
    const DIM: usize = 20;
    let mut a = [[0i32; DIM]; DIM];
    let mut b = [[0i32; DIM]; DIM];
    let mut c = [[0i32; DIM]; DIM];
    for i in 0..DIM {
        for j in 0..DIM {
            a[i][j] = i as i32;
            b[i][j] = j as i32;
        }
    }
    for i in 0..DIM {
        for j in 0..DIM {
            for k in 0..DIM {
                c[i][j] += a[i][k] * b[k][j];
            }
        }
    }
    c[DIM - 1][DIM - 1]
}

/// test/sort: sorts 1024 integers, returns the smallest
fn sort() -> i32 {
    let mut values: Vec<i32> = (0..1024).rev().collect();
    values.sort_unstable();
    values[0]
}
