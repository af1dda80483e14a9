//! Market data fetchers.

pub mod batch;
pub mod http;
pub mod polygon;
pub mod types;

pub use batch::{fetch_batch_prices, BatchPrices};
pub use polygon::PolygonClient;
