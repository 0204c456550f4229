pub mod context;
pub mod registration_engine;

pub use context::*;
pub use registration_engine::*;
