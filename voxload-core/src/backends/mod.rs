pub use inference_engine::InferenceEngine;

pub mod inference_engine;
