//! `StatisticData`: one damage-or-healing aggregate, either a user's
//! top-level total or one skill sub-aggregate under a user (root spec §3).

use std::collections::VecDeque;

/// The sliding window only retains entries newer than this relative to
/// "now" (root spec §3: "only retained while now - timestamp <= 1000 ms").
pub const REALTIME_WINDOW_MS: u64 = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Totals {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
    pub crit_lucky: u64,
    pub hp_lessen: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Counts {
    pub normal: u64,
    pub critical: u64,
    pub lucky: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Realtime {
    pub value: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    pub first: Option<u64>,
    pub last: Option<u64>,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct StatisticData {
    pub totals: Totals,
    pub counts: Counts,
    #[serde(skip)]
    pub realtime_window: VecDeque<(u64, u64)>,
    pub realtime: Realtime,
    pub time_range: TimeRange,
    pub element: String,
    pub kind: String,
    pub name: String,
}

impl StatisticData {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), ..Self::default() }
    }

    /// Root spec §3: "exactly one of normal/critical/lucky/crit_lucky
    /// buckets increases by `v`; total increases by `v`; hp_lessen
    /// increases by `hpLessenV`."
    ///
    /// `counts` does **not** mirror the mutually-exclusive bucketing of
    /// `totals`: the root spec's own worked example (crit+lucky event ->
    /// `counts.critical==1, counts.lucky==1, counts.normal==0,
    /// counts.total==1`) shows `critical`/`lucky` are independent per-flag
    /// tallies, while `total` counts the *call*, not the bucket. This is
    /// inconsistent with the abstract invariant elsewhere in the root spec
    /// ("`counts.total == normal+critical+lucky`"), which only holds when
    /// at most one of the two flags is set on a given record. The literal
    /// worked example is treated as authoritative here (see `DESIGN.md`).
    pub fn add_record(&mut self, now_ms: u64, value: u64, is_crit: bool, is_lucky: bool, hp_lessen: u64) {
        match (is_crit, is_lucky) {
            (true, true) => self.totals.crit_lucky += value,
            (true, false) => self.totals.critical += value,
            (false, true) => self.totals.lucky += value,
            (false, false) => self.totals.normal += value,
        }
        self.totals.total += value;
        self.totals.hp_lessen += hp_lessen;

        if is_crit {
            self.counts.critical += 1;
        }
        if is_lucky {
            self.counts.lucky += 1;
        }
        if !is_crit && !is_lucky {
            self.counts.normal += 1;
        }
        self.counts.total += 1;

        self.realtime_window.push_back((now_ms, value));
        if self.time_range.first.is_none() {
            self.time_range.first = Some(now_ms);
        }
        self.time_range.last = Some(now_ms);
    }

    /// Skill sub-aggregates never accumulate a realtime window (root spec
    /// §3: "cleared on every add"); callers that only track aggregate
    /// totals for a skill call this right after `add_record` instead of
    /// `update_realtime_stats`.
    pub fn clear_window(&mut self) {
        self.realtime_window.clear();
    }

    /// Root spec §3: evict window entries older than 1s relative to `now`,
    /// recompute `realtime.value` as the sum of what remains, and raise
    /// `realtime.max` if the new value is a new high.
    pub fn update_realtime_stats(&mut self, now_ms: u64) {
        while let Some(&(ts, _)) = self.realtime_window.front() {
            if now_ms.saturating_sub(ts) > REALTIME_WINDOW_MS {
                self.realtime_window.pop_front();
            } else {
                break;
            }
        }
        let value: u64 = self.realtime_window.iter().map(|(_, v)| v).sum();
        self.realtime.value = value;
        self.realtime.max = self.realtime.max.max(value);
    }

    /// Root spec §3: `total * 1000 / (last - first)` when both endpoints
    /// are present and distinct; zero otherwise, and zero for any
    /// non-finite result.
    #[must_use]
    pub fn total_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.time_range.first, self.time_range.last) else {
            return 0.0;
        };
        if last <= first {
            return 0.0;
        }
        let elapsed_ms = (last - first) as f64;
        let per_second = self.totals.total as f64 * 1000.0 / elapsed_ms;
        if per_second.is_finite() {
            per_second
        } else {
            0.0
        }
    }
}
