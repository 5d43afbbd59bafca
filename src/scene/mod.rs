/// Serde types for scenes, surfaces and finish modules.
pub mod model;
