//! Request handlers for the file server.

pub mod file;
