use std::time::Duration;

/// Default number of retained latency samples per pair.
pub const DEFAULT_LATENCY_SAMPLES: u32 = 100;

/// Default number of warm-up round trips discarded before sampling.
///
/// The first exchanges over a fresh connection pay setup cost (route
/// resolution, caches, allocator warm-up) that is not a property of the
/// link under test.
pub const DEFAULT_WARMUP_SAMPLES: u32 = 10;

/// Default latency probe payload, in bytes. Minimal on purpose: the
/// quantity under test is propagation time, not serialization.
pub const DEFAULT_LATENCY_PAYLOAD: usize = 8;

/// Default bandwidth probe payload, in bytes.
///
/// Large enough to amortize per-message overhead so the achieved rate
/// reflects the link, not the software stack.
pub const DEFAULT_BANDWIDTH_PAYLOAD: usize = 4 * 1_024 * 1_024;

/// Default number of streamed transfers per bandwidth probe.
pub const DEFAULT_BANDWIDTH_TRANSFERS: u32 = 8;

/// Default bound on every blocking transport call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default percentile reported in summaries.
pub const DEFAULT_PERCENTILE: f64 = 99.0;
