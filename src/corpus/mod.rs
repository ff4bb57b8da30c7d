// Corpus sources
pub mod corpus_trait;
pub mod archive_source;
pub mod extract;
pub mod local_source;

pub use corpus_trait::*;
pub use archive_source::*;
pub use local_source::*;
