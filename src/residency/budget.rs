//! Memory budget queries and the budget pressure dependent eviction grace period.

use std::time::Duration;

/// The memory segments a device reports separate budgets for.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemorySegment {
    /// Memory local to the device. Residency decisions are made against this budget.
    Local,
    NonLocal,
}

impl MemorySegment {
    pub const ALL: [MemorySegment; 2] = [MemorySegment::Local, MemorySegment::NonLocal];
}

/// The current usage and budget of a memory segment in bytes.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct MemoryBudgetInfo {
    pub usage: u64,
    pub budget: u64,
}

impl MemoryBudgetInfo {
    pub const fn new(usage: u64, budget: u64) -> Self {
        Self { usage, budget }
    }

    pub const fn get_available(&self) -> u64 {
        self.budget.saturating_sub(self.usage)
    }

    pub const fn is_over_budget(&self) -> bool {
        self.usage >= self.budget
    }
}

/// Computes how long a unused allocation must stay idle before it may be evicted.
///
/// The result is interpolated linearly between `min` at or over budget and `max` with the
/// whole budget available. A segment with a budget of 0 does not exist on the device and does not
/// constrain the result.
pub fn calc_grace_period(min: Duration, max: Duration, info: &MemoryBudgetInfo) -> Duration {
    if info.budget == 0 {
        return max;
    }
    if info.is_over_budget() {
        return min;
    }

    let available = (info.get_available() as f64) / (info.budget as f64);
    let range = max.saturating_sub(min);
    min + range.mul_f64(available)
}

/// Returns the tightest grace period of all segments.
pub fn calc_min_grace_period<'a, I: IntoIterator<Item=&'a MemoryBudgetInfo>>(min: Duration, max: Duration, infos: I) -> Duration {
    infos.into_iter()
        .map(|info| calc_grace_period(min, max, info))
        .min()
        .unwrap_or(max)
}
