//! Request extractors.

mod tenant;
pub use tenant::{TenantSlug, TENANT_SLUG_HEADER};
