pub mod error;
pub mod status;

pub use error::{ClusterError, Result};
pub use status::MemberStatus;
