//! Channel data model: lifecycle states, voltage ranges and the channel record.

use std::fmt;
use std::str::FromStr;

/// Stable handle to a channel: its index in the fixed channel set.
///
/// Handles are plain indices rather than references so that deferred work
/// (Busy auto-recovery) can address a channel long after the critical section
/// that scheduled it has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

impl ChannelId {
    /// Index into the channel set.
    pub fn index(self) -> usize {
        self.0
    }

    /// Wire name of the channel, `channel<N>`.
    pub fn name(self) -> String {
        format!("channel{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel{}", self.0)
    }
}

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// Not measuring; the only state in which the range may change.
    #[default]
    Idle,
    /// Actively measuring; readings are available.
    Measuring,
    /// Temporarily occupied by the instrument; readings keep updating but are
    /// not reported.
    Busy,
    /// Faulted. Only `diagnostic` clears it.
    Error,
}

impl ChannelState {
    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Idle => "idle_state",
            ChannelState::Measuring => "measure_state",
            ChannelState::Busy => "busy_state",
            ChannelState::Error => "error_state",
        }
    }

    /// Whether the voltage sampler refreshes readings in this state.
    pub fn is_sampling(self) -> bool {
        matches!(self, ChannelState::Measuring | ChannelState::Busy)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voltage interval selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Range {
    /// 100 nV .. 1 mV
    #[default]
    Range0,
    /// 1 mV .. 1 V
    Range1,
    /// 1 V .. 1 kV
    Range2,
    /// 1 kV .. 1 MV
    Range3,
}

/// `[low, high)` bounds for each range, indexed by `Range as usize`.
const RANGE_BOUNDS: [(f64, f64); 4] = [(1e-7, 1e-3), (1e-3, 1.0), (1.0, 1e3), (1e3, 1e6)];

impl Range {
    /// All ranges in ascending order.
    pub const ALL: [Range; 4] = [Range::Range0, Range::Range1, Range::Range2, Range::Range3];

    /// Build a range from its numeric selector.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Numeric selector, 0..=3.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Half-open `[low, high)` voltage bounds.
    pub fn bounds(self) -> (f64, f64) {
        RANGE_BOUNDS[self.index()]
    }

    /// Whether a reading lies inside this range.
    pub fn contains(self, value: f64) -> bool {
        let (low, high) = self.bounds();
        (low..high).contains(&value)
    }

    /// Token used on the wire, `range<M>`.
    pub fn as_str(self) -> &'static str {
        match self {
            Range::Range0 => "range0",
            Range::Range1 => "range1",
            Range::Range2 => "range2",
            Range::Range3 => "range3",
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Range {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("range")
            .filter(|digits| digits.len() == 1)
            .and_then(|digits| digits.parse::<usize>().ok())
            .and_then(Range::from_index)
            .ok_or_else(|| format!("invalid range token '{}'", s))
    }
}

/// One simulated measurement input.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    /// Current lifecycle state.
    pub state: ChannelState,
    /// Selected voltage range.
    pub range: Range,
    /// Last sampled reading.
    pub current_value: f64,
    /// Whether `current_value` was sampled under the current range since the
    /// channel last started measuring.
    pub sampled: bool,
}

impl Channel {
    /// Fresh channel: Idle, range0, zero reading.
    pub fn new(id: ChannelId) -> Self {
        Self {
            name: id.name(),
            state: ChannelState::Idle,
            range: Range::Range0,
            current_value: 0.0,
            sampled: false,
        }
    }

    /// Immutable channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a fresh reading taken under the current range.
    pub fn record_sample(&mut self, value: f64) {
        self.current_value = value;
        self.sampled = true;
    }

    /// Mark the stored reading as stale until the next sample.
    pub fn invalidate_reading(&mut self) {
        self.sampled = false;
    }

    /// The current reading, if one was sampled under the current range.
    pub fn reading(&self) -> Option<f64> {
        self.sampled.then_some(self.current_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_wire_names() {
        assert_eq!(ChannelState::Idle.to_string(), "idle_state");
        assert_eq!(ChannelState::Measuring.to_string(), "measure_state");
        assert_eq!(ChannelState::Busy.to_string(), "busy_state");
        assert_eq!(ChannelState::Error.to_string(), "error_state");
    }

    #[test]
    fn only_measuring_and_busy_sample() {
        assert!(ChannelState::Measuring.is_sampling());
        assert!(ChannelState::Busy.is_sampling());
        assert!(!ChannelState::Idle.is_sampling());
        assert!(!ChannelState::Error.is_sampling());
    }

    #[test]
    fn range_bounds_are_contiguous_decades() {
        assert_eq!(Range::Range0.bounds(), (1e-7, 1e-3));
        assert_eq!(Range::Range3.bounds(), (1e3, 1e6));
        for pair in Range::ALL.windows(2) {
            assert_eq!(pair[0].bounds().1, pair[1].bounds().0);
        }
    }

    #[test]
    fn range_contains_is_half_open() {
        assert!(Range::Range1.contains(1e-3));
        assert!(Range::Range1.contains(0.5));
        assert!(!Range::Range1.contains(1.0));
    }

    #[test]
    fn range_tokens_parse_strictly() {
        assert_eq!("range2".parse::<Range>(), Ok(Range::Range2));
        assert!("range4".parse::<Range>().is_err());
        assert!("range01".parse::<Range>().is_err());
        assert!("Range1".parse::<Range>().is_err());
        assert!("range".parse::<Range>().is_err());
    }

    #[test]
    fn new_channel_starts_idle_in_range0() {
        let channel = Channel::new(ChannelId(3));
        assert_eq!(channel.name(), "channel3");
        assert_eq!(channel.state, ChannelState::Idle);
        assert_eq!(channel.range, Range::Range0);
        assert_eq!(channel.current_value, 0.0);
        assert_eq!(channel.reading(), None);
    }

    #[test]
    fn reading_tracks_sample_validity() {
        let mut channel = Channel::new(ChannelId(0));
        channel.record_sample(5e-4);
        assert_eq!(channel.reading(), Some(5e-4));

        channel.invalidate_reading();
        assert_eq!(channel.reading(), None);
        assert_eq!(channel.current_value, 5e-4);
    }
}
