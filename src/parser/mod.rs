pub mod match_tree;
pub mod model;
pub mod registry;

pub use match_tree::{DecodedValue, MatchElement, MatchTree, MatchValue};
pub use model::{ParseSuccess, ParserNode};
pub use registry::{build_parser_tree, ParserBuildError};
