pub mod hardener;
pub mod rate_limit;

// Re-export key types for convenience
pub use hardener::SecurityHardener;
pub use rate_limit::RateLimiter;
