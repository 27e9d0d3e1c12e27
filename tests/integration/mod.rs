//! Integration tests for Database Copilot.

pub mod agent_test;
pub mod api_test;
pub mod common;
pub mod mysql_test;
pub mod postgres_test;
pub mod store_test;
