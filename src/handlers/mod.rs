//! HTTP handlers for tenant-scoped records and platform administration.

pub mod admin;
pub mod tenant;
