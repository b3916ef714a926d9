//! Tunables shared by the server and client synchronization layers

/// Id of the input channel every registry creates on construction
pub const DEFAULT_CHANNEL_ID: &str = "default";

/// Significant digits kept when compressing non-integer numbers
pub const DEFAULT_PRECISION_DIGITS: u32 = 5;

/// Server tick interval assumed before any measurement exists (seconds)
pub const DEFAULT_TICK_INTERVAL: f64 = 0.05;

/// Maximum number of unacknowledged inputs kept per predicted component
pub const DEFAULT_MAX_INPUT_QUEUE: usize = 256;

/// Synchronization settings.
///
/// Binaries fill this from their command line; tests usually start from
/// [`SyncConfig::default`] and override a field or two.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Significant digits kept for non-integer numbers on the wire
    pub precision_digits: u32,
    /// Initial estimate of the server tick interval on a client
    pub initial_tick_interval: f64,
    /// How many tick intervals a passive component may be integrated
    /// after a snapshot before it freezes. `f64::INFINITY` disables the clamp.
    pub extrapolation_limit: f64,
    /// Capacity of each prediction buffer
    pub max_input_queue: usize,
    /// Id of the fallback input channel
    pub default_channel: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            precision_digits: DEFAULT_PRECISION_DIGITS,
            initial_tick_interval: DEFAULT_TICK_INTERVAL,
            extrapolation_limit: 1.0,
            max_input_queue: DEFAULT_MAX_INPUT_QUEUE,
            default_channel: DEFAULT_CHANNEL_ID.to_string(),
        }
    }
}
