//! Command implementations
//!
//! Each handler reads its flags, resolves file arguments to contents, and
//! delegates to an application service through `&AppContext`.

pub mod destroy;
pub mod load_balancers;
pub mod queries;
pub mod rotate;
pub mod up;
pub mod version;
