//! Multi-CPU arcade emulation core: Z80/8080 interpreters, board memory
//! maps and a cycle-exact frame scheduler.

pub mod boards;
pub mod cpu;
pub mod cpu_bus;
pub mod cpu_core;
pub mod debug_flags;
pub mod machine;
pub mod memory;
pub mod peripherals;
pub mod savestate;
pub mod scheduler;

pub use cpu::Cpu;
pub use cpu_bus::CpuBus;
pub use cpu_core::Model;
pub use machine::Machine;
