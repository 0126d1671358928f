//! Match results: parsing result files, serving them per competition, and
//! resolving a fixture to its final score.

pub mod parser;
pub mod resolver;
pub mod source;

pub use parser::{parse_results, parse_results_text, ParsedFixture};
pub use resolver::{FixtureQuery, ResultResolver};
pub use source::{FileResultSource, ResultCache, ResultSource, SourceSnapshot, StaticResultSource};
