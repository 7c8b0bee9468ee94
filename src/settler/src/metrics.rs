//! Per-cycle and per-session settlement metrics.

use rust_decimal::Decimal;
use sportsbook::SettlementReport;

/// Metrics for one settlement cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    pub total_cycle_ms: u64,
    pub query_ms: u64,
    pub prune_ms: u64,
    pub settle_ms: u64,
    pub purge_ms: u64,
    pub matches_found: usize,
    pub matches_settled: usize,
    pub matches_failed: usize,
    pub markets_pruned: u64,
    pub markets_settled: usize,
    pub wagers_settled: usize,
    pub users_credited: usize,
    pub total_staked: Decimal,
    pub total_paid: Decimal,
    pub matches_purged: u64,
}

impl CycleReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold the reports of one settled match into the cycle.
    pub fn record_match(&mut self, reports: &[SettlementReport]) {
        self.matches_settled += 1;
        for report in reports {
            self.markets_settled += report.markets_settled;
            self.wagers_settled += report.settled_count;
            self.users_credited += report.affected_user_count;
            self.total_staked += report.total_staked;
            self.total_paid += report.total_paid;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.matches_found == 0 && self.matches_purged == 0
    }
}

/// Running totals across every cycle of a session.
#[derive(Debug, Default, Clone)]
pub struct SessionTotals {
    pub cycles: u64,
    pub matches_settled: usize,
    pub matches_failed: usize,
    pub wagers_settled: usize,
    pub total_staked: Decimal,
    pub total_paid: Decimal,
    pub matches_purged: u64,
    pub max_cycle_ms: u64,
}

impl SessionTotals {
    pub fn add(&mut self, cycle: &CycleReport) {
        self.cycles += 1;
        self.matches_settled += cycle.matches_settled;
        self.matches_failed += cycle.matches_failed;
        self.wagers_settled += cycle.wagers_settled;
        self.total_staked += cycle.total_staked;
        self.total_paid += cycle.total_paid;
        self.matches_purged += cycle.matches_purged;
        self.max_cycle_ms = self.max_cycle_ms.max(cycle.total_cycle_ms);
    }

    /// Stakes kept by the house (negative when payouts exceed stakes).
    pub fn house_result(&self) -> Decimal {
        self.total_staked - self.total_paid
    }

    /// Print a formatted session summary.
    pub fn print_summary(&self) {
        println!(
            r#"
═══════════════════════════════════════════════════════════════
  SETTLER SESSION SUMMARY
═══════════════════════════════════════════════════════════════
  Cycles run:        {}
  Slowest cycle:     {}ms

  Matches settled:   {}
  Matches failed:    {}
  Matches purged:    {}

  Wagers settled:    {}
  Total staked:      ${}
  Total paid:        ${}
  House result:      ${}
═══════════════════════════════════════════════════════════════
"#,
            self.cycles,
            self.max_cycle_ms,
            self.matches_settled,
            self.matches_failed,
            self.matches_purged,
            self.wagers_settled,
            self.total_staked,
            self.total_paid,
            self.house_result(),
        );
    }
}
