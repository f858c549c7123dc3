//! Weighted-random selection combinator.

use crate::config::SourceConfig;
use crate::error::Result;
use crate::source::registry::{self, SharedSource, SourceContext, SourceRegistry};
use crate::source::traits::{DisruptionContext, FetchResult, Source, SourceDyn};
use anyhow::Context as _;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct RandomConfig {
    sources: Vec<WeightedChildConfig>,
}

#[derive(Debug, Deserialize)]
struct WeightedChildConfig {
    weight: u32,
    #[serde(flatten)]
    source: SourceConfig,
}

/// Combinator that draws one child per fetch, independently each call,
/// with probabilities proportional to the configured integer weights.
pub struct RandomSource {
    children: Vec<Arc<dyn SourceDyn>>,
    index: WeightedIndex<f64>,
}

impl RandomSource {
    pub async fn build(
        registry: Arc<SourceRegistry>,
        ctx: SourceContext,
        config: serde_json::Value,
    ) -> Result<SharedSource> {
        let config: RandomConfig = registry::parse_config("random", config)?;

        let mut children = Vec::with_capacity(config.sources.len());
        let mut int_weights = Vec::with_capacity(config.sources.len());
        for child_config in &config.sources {
            let child = registry.build(ctx.clone(), &child_config.source).await?;
            children.push(child);
            int_weights.push(child_config.weight);
        }

        let weight_sum: u32 = int_weights.iter().sum();
        if weight_sum == 0 {
            return Err(anyhow::anyhow!("random source weights must sum above zero").into());
        }
        let weights: Vec<f64> = int_weights
            .iter()
            .map(|weight| f64::from(*weight) / f64::from(weight_sum))
            .collect();
        let index = WeightedIndex::new(&weights).context("invalid random source weights")?;

        Ok(Arc::new(Self { children, index }))
    }

    fn pick(&self) -> usize {
        let mut rng = rand::rng();
        self.index.sample(&mut rng)
    }
}

impl Source for RandomSource {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn fetch(&self) -> FetchResult {
        Source::fetch_with_context(self, None).await
    }

    async fn fetch_with_context(&self, ctx: Option<DisruptionContext>) -> FetchResult {
        let choice = self.pick();
        self.children[choice].fetch_with_context(ctx).await
    }
}
