pub mod draw;
pub mod prize;

pub use draw::*;
pub use prize::*;
