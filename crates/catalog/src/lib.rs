//! Variable catalog for one supervised connection.
//!
//! Reconciles operator-declared variables with discovered ones, keeps
//! display names clean, and performs typed reads and writes through a
//! [`TagSession`](plcwatch_protocol::TagSession).

pub mod catalog;
pub mod coerce;
pub mod error;
pub mod sanitize;

pub use catalog::{VariableCatalog, merge, read_variable, write_variable};
pub use coerce::coerce;
pub use error::{CoercionError, ReadError, WriteError};
pub use sanitize::Sanitizer;
