//! Price feed collaborators
//!
//! A feed is the external, read-only source of truth for the native asset's
//! USD price. Feeds report raw rounds; validation happens in the adapter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors reported by a feed itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Feed unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed feed response: {reason}")]
    Malformed { reason: String },
}

/// One round reported by a feed: a signed 1e8-scaled answer and its timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRound {
    pub answer: i128,
    pub updated_at: DateTime<Utc>,
}

/// External price source
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Human-readable description, e.g. "NATIVE / USD"
    fn description(&self) -> &str;

    /// Most recent round; must return promptly with a definite result
    async fn latest_round(&self) -> Result<PriceRound, FeedError>;
}

/// In-process feed whose round is set explicitly
///
/// Used by tests and local runs; reports `Unavailable` until a price is set.
pub struct StaticPriceFeed {
    description: String,
    round: RwLock<Option<PriceRound>>,
}

impl StaticPriceFeed {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            round: RwLock::new(None),
        }
    }

    pub fn with_price(description: impl Into<String>, answer: i128) -> Self {
        Self {
            description: description.into(),
            round: RwLock::new(Some(PriceRound {
                answer,
                updated_at: Utc::now(),
            })),
        }
    }

    pub async fn set_round(&self, answer: i128, updated_at: DateTime<Utc>) {
        *self.round.write().await = Some(PriceRound { answer, updated_at });
    }

    pub async fn clear(&self) {
        *self.round.write().await = None;
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    fn description(&self) -> &str {
        &self.description
    }

    async fn latest_round(&self) -> Result<PriceRound, FeedError> {
        let round = *self.round.read().await;
        round.ok_or_else(|| FeedError::Unavailable {
            reason: "no price has been published".to_string(),
        })
    }
}

/// Wire format of an HTTP feed response
#[derive(Debug, Deserialize)]
struct RoundResponse {
    answer: i128,
    /// Unix seconds
    updated_at: i64,
}

/// Feed backed by an HTTP endpoint returning `{"answer": .., "updated_at": ..}`
pub struct HttpPriceFeed {
    description: String,
    url: String,
    client: reqwest::Client,
}

impl HttpPriceFeed {
    pub fn new(
        description: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(Self {
            description: description.into(),
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn parse_round(body: &str) -> Result<PriceRound, FeedError> {
    let response: RoundResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Malformed {
            reason: e.to_string(),
        })?;
    let updated_at = Utc
        .timestamp_opt(response.updated_at, 0)
        .single()
        .ok_or_else(|| FeedError::Malformed {
            reason: format!("invalid timestamp {}", response.updated_at),
        })?;
    Ok(PriceRound {
        answer: response.answer,
        updated_at,
    })
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    fn description(&self) -> &str {
        &self.description
    }

    async fn latest_round(&self) -> Result<PriceRound, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Unavailable {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FeedError::Unavailable {
                reason: format!("feed returned HTTP {}", response.status()),
            });
        }

        let body = response.text().await.map_err(|e| FeedError::Unavailable {
            reason: e.to_string(),
        })?;
        parse_round(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_feed_unavailable_until_set() {
        let feed = StaticPriceFeed::new("NATIVE / USD");
        assert!(matches!(
            feed.latest_round().await,
            Err(FeedError::Unavailable { .. })
        ));

        let at = Utc::now();
        feed.set_round(2_000_00000000, at).await;
        let round = feed.latest_round().await.unwrap();
        assert_eq!(round.answer, 2_000_00000000);
        assert_eq!(round.updated_at, at);

        feed.clear().await;
        assert!(feed.latest_round().await.is_err());
    }

    #[test]
    fn test_parse_round() {
        let round = parse_round(r#"{"answer": 200000000000, "updated_at": 1700000000}"#).unwrap();
        assert_eq!(round.answer, 200_000_000_000);
        assert_eq!(round.updated_at.timestamp(), 1_700_000_000);

        assert!(matches!(
            parse_round(r#"{"price": 1}"#),
            Err(FeedError::Malformed { .. })
        ));
    }
}
