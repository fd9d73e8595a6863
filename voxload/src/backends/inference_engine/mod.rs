pub use memory::MemoryEngine;

mod memory;
