pub mod cli;
pub mod corpus;
pub mod engine;
pub mod utils;

pub use cli::*;
pub use corpus::*;
pub use engine::*;
pub use utils::*;
