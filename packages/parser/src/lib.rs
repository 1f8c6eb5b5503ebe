pub mod ast;
pub mod error;
pub mod parser;
pub mod schema;
pub mod serializer;
pub mod tokenizer;
pub mod value;

#[cfg(test)]
mod tests_roundtrip;
#[cfg(test)]
mod tests_serializer;

pub use ast::{BlockNode, BlockSnapshot, ParameterSlot, TYPE_PARAM, VALUE_PARAM};
pub use error::{ParseError, ParseResult};
pub use parser::{parse, parse_untyped, Parser};
pub use schema::{
    join_path, parent_path, split_path, BlockSchema, JsonFileSchemaSource, ParameterSchema,
    SchemaCatalog, SchemaError, SchemaSource, SubtypeSchema, WILDCARD,
};
pub use serializer::{serialize, Serializer};
pub use tokenizer::{tokenize, Token};
pub use value::{ParamValue, Scalar, ScalarKind, ValueError, ValueType};

#[cfg(test)]
pub(crate) fn test_catalog() -> SchemaCatalog {
    SchemaCatalog::from_json(include_str!("../tests/fixtures/schema.json"))
        .expect("fixture schema is valid")
}
