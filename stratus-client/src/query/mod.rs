//! Structured queries and their wire translation
//!
//! Fluent query building over a single schema, translated into the
//! datastore's `field[operator]=value` parameters, a joined sort parameter
//! and a `Range` pagination header.

pub mod filters;
pub mod orderby;
pub mod query;

pub use filters::{Filter, Operator};
pub use orderby::OrderBy;
pub use query::Query;
