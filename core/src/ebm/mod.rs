pub mod json_schema;
pub mod parser;
pub mod shape_function;

pub use parser::parse_explanation_json;
pub use shape_function::{AdditiveExplanation, AdditiveTerm, ShapeFunction};
