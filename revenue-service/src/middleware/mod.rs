pub mod job_auth;
pub mod org;

pub use job_auth::job_auth_middleware;
pub use org::OrgContext;
