//! Integration tests for Database Copilot.
//!
//! Most tests run against in-process mocks. The live driver tests need a
//! server; set DATABASE_URL (PostgreSQL) or MYSQL_DATABASE_URL to run them.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
