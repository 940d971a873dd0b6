//! Component synthesis: from an annotated Python function to a staged
//! descriptor, and from a staged descriptor to the final component
//! artifacts (descriptor + executable task script).

pub mod formalize;
pub mod scaffold;

pub use formalize::formalize;
pub use scaffold::create_component_scaffold;
