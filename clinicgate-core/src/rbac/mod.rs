//! Role-based access to schema objects
//!
//! Privileges come from the database's own grant script, parsed into a
//! [`GrantTable`]. [`AccessPolicy`] combines that table with the schema
//! catalog to build per-role menus and to mint [`Authorized`] tokens that the
//! row gateway requires.

mod context;
mod display;
mod grants;
mod permissions;
mod policy;
mod roles;

pub use context::AccessContext;
pub use display::resolve_display_name;
pub use grants::{GrantSource, GrantStore, GrantTable, RoleGrants, SkippedGrant};
pub use permissions::{is_insertable, is_writable, AccessDecision, AccessMode};
pub use policy::{AccessPolicy, Authorized, Capability, Insert, MenuItem, Read, Write};
pub use roles::RoleSpec;
