pub mod analysis;
pub mod coordinator;
pub mod processor;
pub mod quality;

pub use analysis::{AnalysisContext, AnalysisEngine, NullStrategy, Strategy};
pub use coordinator::Coordinator;
pub use processor::Processor;
pub use quality::QualityManager;
