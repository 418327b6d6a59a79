pub mod client;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod params;

pub use client::{ErpClient, ErpService};
pub use error::{ErpFetcherError, Result};
pub use fetcher::ErpFetcher;
pub use params::ErpParams;
