//! Policy-enforced access to skill reference and asset files.

mod reader;
mod resolver;

pub use reader::{BinaryRead, CancelToken, FullTextSearcher, ResourceReader, SearchHit, TextRead};
pub use resolver::PathResolver;
