//! Unit tests module organization

pub mod fanout;
pub mod rate_limiter;
