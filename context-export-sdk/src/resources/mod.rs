//! Resource clients for the two content services.
//!
//! Each client wraps a shared [`ResilientClient`](crate::ResilientClient) and
//! knows just enough of the service's wire format to page through labeled
//! content.

pub mod tracker;
pub mod wiki;

pub use tracker::TrackerClient;
pub use wiki::WikiClient;
