//! METAR feed cache.
//!
//! Polls the aviationweather.gov CSV dump on a fixed period and serves the
//! latest observation per station from memory.

pub mod fetch;
pub mod parse;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod types;

pub use fetch::{FeedClient, FetchError};
pub use parse::{decode_sky_cover, parse_feed, ParseError};
pub use refresh::{run_cycle, LoopState, MetarCache};
pub use retry::RetryConfig;
pub use store::StationStore;
pub use types::*;
