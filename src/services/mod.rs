pub mod engine;
pub mod fairness;
pub mod selector;

pub use engine::*;
pub use fairness::*;
pub use selector::*;
