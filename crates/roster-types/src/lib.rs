mod criteria;
mod report;
mod user;

pub use criteria::*;
pub use report::*;
pub use user::*;

pub const DEFAULT_TOP_DOMAINS: usize = 5;
