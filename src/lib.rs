pub mod checkpoint;
pub mod config;
pub mod crawl;
pub mod error;
pub mod http;
pub mod logger;
pub mod scrapers;
pub mod sink;
pub mod utilities;

#[cfg(test)]
mod test_utilities;
#[cfg(test)]
mod tests;
