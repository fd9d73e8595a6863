pub use inference_engine::MemoryEngine;

mod inference_engine;
