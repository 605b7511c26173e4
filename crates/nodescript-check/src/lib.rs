//! Schema services for nodescript graphs.
//!
//! - [`compat`]: structural compatibility between a desired and an actual
//!   schema, deciding whether the compiler must insert a conversion.
//! - [`codec`]: validation and coercion of values against a schema, and
//!   schema default values.
//! - [`literal`]: the static conversion rule applied to literal property
//!   values at compile time.

pub mod codec;
pub mod compat;
pub mod error;
pub mod literal;

pub use codec::{type_of, DefaultCodec, SchemaCodec};
pub use compat::is_compatible;
pub use error::CodecError;
pub use literal::convert_static;
