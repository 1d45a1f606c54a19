//! Declarative HTML-to-JSON extraction
//!
//! Maps a JSON-shaped template of CSS selectors, transformation pipes, and
//! nesting over a parsed HTML document:
//! - object templates narrow the scope via the reserved `$` key and produce
//!   one result per matched element
//! - array templates collect their sub-templates' matches and restore
//!   document order
//! - leaf strings are `selector|pipe:arg;arg|pipe` chains; quoted leaves are
//!   literals; other primitives pass through unchanged
//!
//! Missing data resolves to `null` rather than an error, so templates can
//! recover with pipes like `default`. Custom pipes are registered per call
//! through [`Options`].

pub mod error;
pub mod mapper;
pub mod pipes;
pub mod scope;

pub use error::*;
pub use mapper::*;
pub use pipes::*;
pub use scope::*;
