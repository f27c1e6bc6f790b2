use crate::models::{RunOutcome, StrategyKind};
use crate::services::orchestrator::{RegionFlow, RegionRunner};
use async_trait::async_trait;

/// Above this many regions the batch strategy is recommended.
pub const BATCH_THRESHOLD: usize = 50;

/// Pages fetched per region at most in batch mode.
pub const BATCH_PAGE_CAP: u32 = 10;

const MIN_CHUNK: usize = 5;
const MAX_CHUNK: usize = 10;

/// Chunk size for a batch run over `total` regions: `min(10, max(5, total / 10))`.
pub fn chunk_size_for(total: usize) -> usize {
    (total / 10).clamp(MIN_CHUNK, MAX_CHUNK)
}

/// Strategy the controller suggests for a selection of `total` regions.
pub fn recommended_strategy(total: usize) -> StrategyKind {
    if total > BATCH_THRESHOLD {
        StrategyKind::ChunkedBatch
    } else {
        StrategyKind::Sequential
    }
}

/// Order and pacing of regions within one run.
///
/// Both strategies share [`RegionRunner::run_region`]; they differ only in
/// page caps, delays between regions and progress reporting.
#[async_trait]
pub trait RunStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn execute(&self, runner: &mut RegionRunner) -> RunOutcome;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn RunStrategy> {
    match kind {
        StrategyKind::Sequential => Box::new(SequentialStrategy),
        StrategyKind::ChunkedBatch => Box::new(ChunkedBatchStrategy::default()),
    }
}

/// Every region in order, all pages, no extra delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl RunStrategy for SequentialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sequential
    }

    async fn execute(&self, runner: &mut RegionRunner) -> RunOutcome {
        let regions = runner.regions().to_vec();

        for region in &regions {
            if !runner.checkpoint().await {
                return RunOutcome::Cancelled;
            }
            if let RegionFlow::Stop(outcome) = runner.run_region(region, None).await {
                return outcome;
            }
        }

        RunOutcome::Completed
    }
}

/// Regions in fixed-size chunks with a page cap and pauses between chunks.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedBatchStrategy {
    pub page_cap: u32,
}

impl Default for ChunkedBatchStrategy {
    fn default() -> Self {
        Self {
            page_cap: BATCH_PAGE_CAP,
        }
    }
}

#[async_trait]
impl RunStrategy for ChunkedBatchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ChunkedBatch
    }

    async fn execute(&self, runner: &mut RegionRunner) -> RunOutcome {
        let regions = runner.regions().to_vec();
        let chunk_size = chunk_size_for(regions.len());
        let chunk_count = regions.len().div_ceil(chunk_size);
        let timing = runner.timing();

        runner.log(format!(
            "Batch mode: {} regions in {} batches of up to {}",
            regions.len(),
            chunk_count,
            chunk_size
        ));

        for (index, chunk) in regions.chunks(chunk_size).enumerate() {
            runner.log(format!(
                "Starting batch {}/{} ({} regions)",
                index + 1,
                chunk_count,
                chunk.len()
            ));

            for (position, region) in chunk.iter().enumerate() {
                if !runner.checkpoint().await {
                    return RunOutcome::Cancelled;
                }
                if let RegionFlow::Stop(outcome) =
                    runner.run_region(region, Some(self.page_cap)).await
                {
                    return outcome;
                }
                if position + 1 < chunk.len() && !runner.delay(timing.region_delay).await {
                    return RunOutcome::Cancelled;
                }
            }

            let progress = runner.progress();
            runner.log(format!(
                "Batch {}/{} finished: {}/{} regions ({:.1}%)",
                index + 1,
                chunk_count,
                progress.completed,
                progress.total,
                progress.percent
            ));

            if index + 1 < chunk_count && !runner.delay(timing.chunk_delay).await {
                return RunOutcome::Cancelled;
            }
        }

        RunOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_chunk_size_bounds() {
        assert_eq!(chunk_size_for(0), 5);
        assert_eq!(chunk_size_for(51), 5);
        assert_eq!(chunk_size_for(70), 7);
        assert_eq!(chunk_size_for(100), 10);
        assert_eq!(chunk_size_for(1000), 10);
    }

    #[test]
    fn test_recommendation_threshold() {
        assert_eq!(recommended_strategy(50), StrategyKind::Sequential);
        assert_eq!(recommended_strategy(51), StrategyKind::ChunkedBatch);
    }

    #[test]
    fn test_strategy_for_kind() {
        assert_eq!(strategy_for(StrategyKind::Sequential).kind(), StrategyKind::Sequential);
        assert_eq!(
            strategy_for(StrategyKind::ChunkedBatch).kind(),
            StrategyKind::ChunkedBatch
        );
    }

    proptest! {
        #[test]
        fn chunk_size_always_in_range(total in 0usize..100_000) {
            let size = chunk_size_for(total);
            prop_assert!((MIN_CHUNK..=MAX_CHUNK).contains(&size));
        }

        #[test]
        fn chunks_cover_every_region(total in 1usize..500) {
            let size = chunk_size_for(total);
            let regions: Vec<usize> = (0..total).collect();
            let covered: usize = regions.chunks(size).map(<[usize]>::len).sum();
            prop_assert_eq!(covered, total);
        }
    }
}
