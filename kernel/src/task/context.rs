//! Saved register state for a process
//!
//! The register file is x86_64-shaped. `rax` carries system call return
//! values; `rdi`, `rsi` and `rdx` carry the first three arguments.

/// Interrupts enabled, reserved bit 1 set
pub const USER_RFLAGS: u64 = 0x202;

/// CPU state saved while a process is not running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuContext {
    /// General purpose registers
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,

    /// Instruction pointer
    pub rip: u64,

    /// CPU flags
    pub rflags: u64,
}

impl CpuContext {
    /// Fresh context for a newly loaded program
    ///
    /// Every general purpose register is cleared so nothing leaks from the
    /// previous image.
    pub fn new(entry_point: u64, stack_top: u64) -> Self {
        CpuContext {
            rip: entry_point,
            rsp: stack_top,
            rflags: USER_RFLAGS,
            ..CpuContext::default()
        }
    }

    /// Value the process sees as the result of its last system call
    pub fn return_value(&self) -> i64 {
        self.rax as i64
    }

    pub fn set_return_value(&mut self, value: i64) {
        self.rax = value as u64;
    }

    /// First three system call arguments
    pub fn syscall_args(&self) -> [u64; 3] {
        [self.rdi, self.rsi, self.rdx]
    }
}
