//! Kinds managed on postgres-wire backends.

pub mod default_privileges;
pub mod extension;
pub mod grant;
pub mod role;
pub mod schema;

pub use default_privileges::{DefaultObjectType, DefaultPrivileges, DefaultPrivilegesSpec};
pub use extension::{Extension, ExtensionSpec};
pub use grant::{Grant, GrantSpec};
pub use role::{ConfigurationParameter, Role, RolePrivileges, RoleSpec, RoleStatus};
pub use schema::{Schema, SchemaSpec};
