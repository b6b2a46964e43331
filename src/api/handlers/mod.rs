//! API handlers and shared response types.
//!
//! Each handler resolves authentication explicitly through
//! [`auth::session`] and answers in the shared [`envelope`] shape.

pub mod auth;
pub mod envelope;
pub mod health;
pub mod me;
