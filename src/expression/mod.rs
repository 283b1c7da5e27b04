pub mod parser;
pub mod pattern;
pub mod predicate;

pub use parser::parse_predicate;
pub use predicate::{CompareOp, Predicate};

use crate::core::Result;

impl Predicate {
    /// Parses a SQL-style condition such as `course = 'Math' AND score > 2`.
    pub fn parse(input: &str) -> Result<Predicate> {
        parse_predicate(input)
    }
}
