//! SQL for tenant collections: table names from `EntityKind`, values as parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
