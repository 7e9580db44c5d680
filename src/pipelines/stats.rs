use std::time::{Duration, Instant};

/// Statistics for one sentence-scoring run.
#[derive(Debug, Clone)]
pub struct ScoringStats {
    /// Total execution time.
    pub total_time: Duration,
    /// Number of interior positions scored.
    pub positions_scored: usize,
    /// Number of masked-prediction queries issued to the model.
    pub oracle_queries: usize,
}

impl ScoringStats {
    /// Create a new stats tracker (call at start of operation).
    pub(crate) fn start() -> ScoringStatsBuilder {
        ScoringStatsBuilder {
            start_time: Instant::now(),
        }
    }
}

/// Builder for ScoringStats - tracks timing from creation to finalize.
pub(crate) struct ScoringStatsBuilder {
    start_time: Instant,
}

impl ScoringStatsBuilder {
    /// Finalize stats with the work counts for the run.
    pub fn finish(self, positions_scored: usize, oracle_queries: usize) -> ScoringStats {
        ScoringStats {
            total_time: self.start_time.elapsed(),
            positions_scored,
            oracle_queries,
        }
    }
}
