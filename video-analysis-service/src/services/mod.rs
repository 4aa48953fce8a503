pub mod providers;
pub mod scratch;

pub use providers::AnalysisProvider;
pub use scratch::{ScratchDir, ScratchFile};
