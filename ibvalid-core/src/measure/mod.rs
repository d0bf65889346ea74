mod bandwidth;
mod latency;

pub use self::{bandwidth::Bandwidth, latency::Latency};
