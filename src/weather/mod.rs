//! Hourly weather: the external endpoint, its rate limit, and the monthly
//! on-disk cache that fronts it.
//!
//! Unit conversion happens once, when an observation is fetched. Everything
//! persisted and everything read back is metric.

pub mod api;
pub mod cache;
pub mod scheduler;
pub mod types;

pub use api::{TimelineClient, WeatherApi};
pub use cache::{CacheState, FetchSummary, WeatherCache};
pub use scheduler::RateLimiter;
pub use types::{HourlyObservation, Precipitation};
