//! Query execution by connection id.

pub mod executor;

pub use executor::QueryExecutor;
