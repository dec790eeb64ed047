//! Linkshelf: a bookmark manager core with folders, tags, search and public
//! share links, backed by an embedded SQLite store or a hosted Supabase project.
//!
//! This library crate exposes all modules for use by the RPC binary and integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod platform;
pub mod remote;
pub mod rpc_handler;
pub mod services;
pub mod types;
