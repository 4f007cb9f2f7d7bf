pub mod descriptor;
pub mod evaluator;
pub mod materialize;
pub mod registry;

pub use descriptor::{DescriptorManifest, MaterializeContext, MediaAsset, SubAgent};
pub use evaluator::Evaluator;
pub use registry::{AgentRegistry, SharedAgentRegistry};
