// Core engine components
pub mod invocation;
pub mod matrix;
pub mod executor;
pub mod gate;
pub mod engine;

pub use invocation::*;
pub use matrix::*;
pub use executor::*;
pub use gate::*;
pub use engine::*;
