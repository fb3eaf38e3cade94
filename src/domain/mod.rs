pub mod types;

pub use types::{CustomerAttributes, CustomerId, Grounding, GroundingExample, RunId, Topic};
