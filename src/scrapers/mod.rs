pub mod coinglass_api; // Rate-limited REST client for the CoinGlass futures API

pub use coinglass_api::{CoinGlassClient, RawResponse, RequestError, Transport};
