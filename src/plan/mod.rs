pub mod analyzer;

pub use analyzer::{ProvisioningPlan, RequirementAnalyzer, SymbolPlan};
