//! Maps a request's block nonce or epoch hint onto the shard endpoint that
//! holds that slice of chain history.

use thiserror::Error;
use tracing::warn;

use crate::config::ShardConfig;

/// Sentinel meaning "no upper bound"; the config spells it "latest".
const LATEST: u64 = u64::MAX;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no gateway defined for the requested value: {0}")]
    NoMatchingGateway(String),

    #[error("no gateway shards defined")]
    NoShardsDefined,

    #[error("shard '{shard}': invalid {field} bound '{value}'")]
    InvalidBound {
        shard: String,
        field: &'static str,
        value: String,
    },

    #[error("shard '{shard}': {field} range is inverted ({start} > {end})")]
    InvertedRange {
        shard: String,
        field: &'static str,
        start: u64,
        end: u64,
    },

    #[error("more than one shard claims the latest data")]
    MultipleLatestShards,
}

/// A shard with parsed numeric bounds; both ranges are inclusive.
#[derive(Debug, Clone)]
pub struct Shard {
    pub name: String,
    pub url: String,
    pub epoch_start: u64,
    pub epoch_end: u64,
    pub nonce_start: u64,
    pub nonce_end: u64,
    /// True when both end bounds are "latest"; such a shard also serves
    /// requests that carry no nonce or epoch at all.
    pub serves_latest: bool,
}

impl Shard {
    fn covers_epoch(&self, epoch: u64) -> bool {
        self.epoch_start <= epoch && epoch <= self.epoch_end
    }

    fn covers_nonce(&self, nonce: u64) -> bool {
        self.nonce_start <= nonce && nonce <= self.nonce_end
    }
}

/// Routing table, evaluated in configured order: the first shard covering
/// the requested value wins.
pub struct ShardRouter {
    shards: Vec<Shard>,
    latest_idx: Option<usize>,
}

impl ShardRouter {
    pub fn new(configs: &[ShardConfig]) -> Result<Self, RouterError> {
        if configs.is_empty() {
            return Err(RouterError::NoShardsDefined);
        }

        let mut shards = Vec::with_capacity(configs.len());
        let mut latest_idx = None;

        for config in configs {
            let epoch_start = parse_bound(&config.name, "epoch_start", &config.epoch_start)?;
            let epoch_end = parse_bound(&config.name, "epoch_end", &config.epoch_end)?;
            let nonce_start = parse_bound(&config.name, "nonce_start", &config.nonce_start)?;
            let nonce_end = parse_bound(&config.name, "nonce_end", &config.nonce_end)?;

            if epoch_start > epoch_end {
                return Err(RouterError::InvertedRange {
                    shard: config.name.clone(),
                    field: "epoch",
                    start: epoch_start,
                    end: epoch_end,
                });
            }
            if nonce_start > nonce_end {
                return Err(RouterError::InvertedRange {
                    shard: config.name.clone(),
                    field: "nonce",
                    start: nonce_start,
                    end: nonce_end,
                });
            }

            let serves_latest = epoch_end == LATEST && nonce_end == LATEST;
            if serves_latest {
                if latest_idx.is_some() {
                    return Err(RouterError::MultipleLatestShards);
                }
                latest_idx = Some(shards.len());
            }

            shards.push(Shard {
                name: config.name.clone(),
                url: config.url.clone(),
                epoch_start,
                epoch_end,
                nonce_start,
                nonce_end,
                serves_latest,
            });
        }

        warn_on_overlaps(&shards);

        Ok(Self { shards, latest_idx })
    }

    /// Picks the shard for a request. A nonce takes precedence over an epoch
    /// hint when both are present; with neither, the latest-data shard is
    /// returned.
    pub fn select(&self, nonce: Option<u64>, epoch: Option<u64>) -> Result<&Shard, RouterError> {
        if let Some(nonce) = nonce {
            return self
                .shards
                .iter()
                .find(|s| s.covers_nonce(nonce))
                .ok_or_else(|| RouterError::NoMatchingGateway(format!("nonce {nonce}")));
        }

        if let Some(epoch) = epoch {
            return self
                .shards
                .iter()
                .find(|s| s.covers_epoch(epoch))
                .ok_or_else(|| RouterError::NoMatchingGateway(format!("epoch {epoch}")));
        }

        self.latest_idx
            .map(|i| &self.shards[i])
            .ok_or_else(|| RouterError::NoMatchingGateway("latest data".to_string()))
    }

    #[must_use]
    pub fn loaded_shards(&self) -> &[Shard] {
        &self.shards
    }
}

fn parse_bound(shard: &str, field: &'static str, raw: &str) -> Result<u64, RouterError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("latest") {
        return Ok(LATEST);
    }
    trimmed.parse().map_err(|_| RouterError::InvalidBound {
        shard: shard.to_string(),
        field,
        value: raw.to_string(),
    })
}

// Overlaps are tolerated; first match wins. Still worth flagging at startup
// since an overlapping table usually means a config typo.
fn warn_on_overlaps(shards: &[Shard]) {
    for (i, a) in shards.iter().enumerate() {
        for b in &shards[i + 1..] {
            if a.epoch_start <= b.epoch_end && b.epoch_start <= a.epoch_end {
                warn!(first = %a.name, second = %b.name, "epoch ranges overlap");
            }
            if a.nonce_start <= b.nonce_end && b.nonce_start <= a.nonce_end {
                warn!(first = %a.name, second = %b.name, "nonce ranges overlap");
            }
        }
    }
}
