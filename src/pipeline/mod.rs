//! Pipeline synthesis: from the validated wiring declaration to the staged
//! pipeline spec, the generated assembly source and the final pipeline
//! artifacts.

pub mod formalize;
pub mod scaffold;
pub mod synthesize;

pub use formalize::formalize;
pub use scaffold::create_pipeline_scaffold;
pub use synthesize::synthesize;
