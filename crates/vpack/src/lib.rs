//! A compact binary self-describing value format with in-place access and a
//! bidirectional JSON bridge.
//!
//! A VPACK value is a contiguous byte sequence whose first byte determines
//! its type and, together with a small type-specific header, its total
//! length. Any valid buffer can be queried in place (type, byte size, array
//! element access, hashed object lookup) without deserialization:
//!
//! ```
//! use vpack::{Options, Parser};
//!
//! let mut parser = Parser::new(Options::default());
//! parser.parse(br#"{"name": "alice", "scores": [10, 20]}"#).unwrap();
//!
//! let value = parser.slice().unwrap();
//! assert_eq!(value.get("name").unwrap().get_str().unwrap(), "alice");
//! assert_eq!(
//!     value.get("scores").unwrap().get_nth(1).unwrap().get_int().unwrap(),
//!     20
//! );
//! assert_eq!(
//!     value.to_json(&Options::default()).unwrap(),
//!     r#"{"name":"alice","scores":[10,20]}"#
//! );
//! ```

pub mod builder;
pub mod dumper;
pub mod error;
pub mod hash;
pub mod options;
pub mod parser;
pub mod scan;
pub mod scope;
mod seeds;
pub mod slice;
pub mod tag;

pub use builder::Builder;
pub use dumper::{Dumper, Sink};
pub use error::{Error, Result};
pub use options::{
    AttributeExcludeHandler, AttributeTranslator, Flavor, Options, UnsupportedTypeBehavior,
};
pub use parser::Parser;
pub use scope::SliceScope;
pub use slice::{ArrayIterator, ObjectIterator, Slice};
pub use tag::ValueType;
