pub mod acquire;
pub mod api;
pub mod archive;
pub mod client;
pub mod filter;

pub use acquire::{Acquirer, Acquisition};
pub use api::{GitHubApi, SourceHost};
pub use client::{Clock, RateLimitPolicy, RateLimitedClient, SystemClock};
