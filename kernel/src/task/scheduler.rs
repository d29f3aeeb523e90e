//! Suspension and wakeup of processes
//!
//! The process core decides *when* a process must stop running (a `wait`
//! with live children and no zombies) and *when* it may continue (a child
//! exited). How the executing entity is actually suspended belongs to the
//! environment, behind the [`Scheduler`] trait.

use crate::process::ProcessId;

/// Environment hook for blocking and unblocking processes
///
/// `block` is only called with the process table unlocked, after the
/// process has been marked Blocked. A `wake` that arrives before the matching
/// `block` must not be lost: `block` returns immediately in that case.
/// Returning early is always allowed since every caller rechecks its
/// condition under the table lock.
pub trait Scheduler: Send + Sync {
    /// Suspend the caller, which is executing on behalf of `pid`
    fn block(&self, pid: ProcessId);

    /// Allow a suspended (or about to be suspended) `pid` to continue
    fn wake(&self, pid: ProcessId);
}

#[cfg(feature = "std")]
pub use hosted::ThreadScheduler;

#[cfg(feature = "std")]
mod hosted {
    use super::Scheduler;
    use crate::process::ProcessId;
    use alloc::collections::{BTreeMap, BTreeSet};
    use spin::Mutex;
    use std::thread::{self, Thread};

    #[derive(Default)]
    struct ParkState {
        /// Threads currently parked in `block`, by the process they run
        parked: BTreeMap<ProcessId, Thread>,
        /// Wakes that arrived while nobody was parked
        pending: BTreeSet<ProcessId>,
    }

    /// Scheduler for hosted use: every process runs on its own OS thread
    ///
    /// Blocking parks the calling thread; waking unparks it. The park token
    /// of `std::thread` covers the window between registering the thread and
    /// actually parking.
    #[derive(Default)]
    pub struct ThreadScheduler {
        state: Mutex<ParkState>,
    }

    impl ThreadScheduler {
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of threads currently parked
        pub fn parked_count(&self) -> usize {
            self.state.lock().parked.len()
        }
    }

    impl Scheduler for ThreadScheduler {
        fn block(&self, pid: ProcessId) {
            {
                let mut state = self.state.lock();
                if state.pending.remove(&pid) {
                    log::debug!("ThreadScheduler: {} already woken, not parking", pid);
                    return;
                }
                state.parked.insert(pid, thread::current());
            }

            log::debug!("ThreadScheduler: parking {}", pid);
            thread::park();
            self.state.lock().parked.remove(&pid);
        }

        fn wake(&self, pid: ProcessId) {
            let mut state = self.state.lock();
            match state.parked.get(&pid) {
                Some(thread) => {
                    log::debug!("ThreadScheduler: unparking {}", pid);
                    thread.unpark();
                }
                None => {
                    state.pending.insert(pid);
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::sync::Arc;
        use std::time::Duration;

        #[test]
        fn wake_before_block_is_not_lost() {
            let sched = ThreadScheduler::new();
            let pid = ProcessId::new(3);
            sched.wake(pid);
            // Returns immediately instead of parking forever
            sched.block(pid);
            assert_eq!(sched.parked_count(), 0);
        }

        #[test]
        fn wake_unparks_a_blocked_thread() {
            let sched = Arc::new(ThreadScheduler::new());
            let pid = ProcessId::new(5);

            let blocker = {
                let sched = Arc::clone(&sched);
                thread::spawn(move || sched.block(pid))
            };
            while sched.parked_count() == 0 && !blocker.is_finished() {
                thread::sleep(Duration::from_millis(1));
            }
            sched.wake(pid);
            blocker.join().unwrap();
            assert_eq!(sched.parked_count(), 0);
        }
    }
}
