//! HTTP route handlers
//!
//! The route table in `table` is the single source of truth for paths,
//! methods, required scopes, and rate limits; the handlers here implement
//! the behavior. Contract tooling can walk the table without executing any
//! handler.

pub mod auth;
pub mod identities;
pub mod ingress;
pub mod keys;
pub mod logs;
pub mod messages;
pub mod platforms;
pub mod projects;
pub mod table;
pub mod webhooks;
