pub mod generation;

pub use generation::{ChapterResult, GenerationClient, GenerationError, HttpGenerationClient};
