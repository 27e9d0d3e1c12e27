//! Database Copilot - ask natural-language questions of your databases.
//!
//! This library exposes the core modules for the server binary and the
//! integration tests.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod query;
