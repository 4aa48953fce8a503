pub mod analysis;

pub use analysis::{resolve_prompt, AnalysisResponse, DEFAULT_PROMPT};
