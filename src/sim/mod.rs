//! In-process collaborators, so the kernel can run without the remote
//! memory, CPU and IO services.

pub mod cpu;
pub mod io;
pub mod loader;
pub mod memory;

pub use cpu::SimulatedCpus;
pub use io::SimulatedIo;
pub use memory::SimulatedMemory;
