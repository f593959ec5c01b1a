pub mod middleware;
pub mod types;

pub use middleware::require_role;
pub use types::{ADMIN, CRM, MANAGEMENT, PORTAL, Role, STAFF};
