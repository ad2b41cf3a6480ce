//! Rate-limited HTTP access and pagination.

pub mod client;
pub mod pagination;

pub use client::{FetchResponse, RateLimitedClient, RetryPolicy};
pub use pagination::{PageWalker, PaginationStyle};

#[cfg(test)]
pub mod tests;
