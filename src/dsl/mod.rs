pub mod parser;
pub mod schema;
pub mod validator;

pub use parser::{load_workflow, parse_dsl, parse_workflow, DslFormat};
pub use schema::*;
pub use validator::{build_workflow, schema_from_workflow, step_from_schema};
