//! Custodia Oracle - Price oracle adapter
//!
//! Wraps an external [`PriceFeed`] and turns raw rounds into validated
//! quotes. A quote is rejected when the feed is unavailable, the answer is not
//! strictly positive, or the round is older than the staleness window.
//!
//! # Scaling convention
//!
//! - native amounts: 18 decimals (1 unit = 1e18 subunits)
//! - prices: 8 decimals
//! - USD values: 8 decimals
//!
//! so `usd = amount * price / 1e18`. Token amounts use the token's own
//! decimals as the divisor exponent. The oracle is used for valuation only,
//! never to enforce limits, so its failure never blocks deposits or
//! withdrawals.

pub mod feed;

pub use feed::{FeedError, HttpPriceFeed, PriceFeed, PriceRound, StaticPriceFeed};

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use custodia_types::{
    Amount, ExternalError, Result, UsdValue, ValidationError, NATIVE_DECIMALS,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Number of decimals of feed answers
pub const PRICE_DECIMALS: u32 = 8;

/// Rounds timestamped this far in the future are still accepted
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// A validated price quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// USD price of one native unit, scaled by 1e8
    #[serde(with = "price_string")]
    pub price: u128,
    pub updated_at: DateTime<Utc>,
}

mod price_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// `amount * price / 10^decimals`, or `None` on overflow
pub fn usd_value(amount: Amount, price: u128, decimals: u8) -> Option<UsdValue> {
    let divisor = 10u128.checked_pow(decimals as u32)?;
    amount
        .value()
        .checked_mul(price)
        .map(|scaled| UsdValue(scaled / divisor))
}

/// Validating wrapper around a price feed
#[derive(Clone)]
pub struct PriceOracleAdapter {
    feed: Arc<dyn PriceFeed>,
    max_staleness: Option<Duration>,
}

impl PriceOracleAdapter {
    /// `max_staleness` of `None` disables the freshness check
    pub fn new(feed: Arc<dyn PriceFeed>, max_staleness: Option<std::time::Duration>) -> Self {
        Self {
            feed,
            max_staleness: max_staleness.and_then(|d| Duration::from_std(d).ok()),
        }
    }

    pub fn description(&self) -> &str {
        self.feed.description()
    }

    /// Latest validated quote
    pub async fn latest_price(&self) -> Result<PriceQuote> {
        self.latest_price_at(Utc::now()).await
    }

    /// Latest validated quote, judging freshness against `now`
    pub async fn latest_price_at(&self, now: DateTime<Utc>) -> Result<PriceQuote> {
        let round = self.feed.latest_round().await.map_err(|e| {
            warn!(feed = self.feed.description(), error = %e, "Price feed failed");
            ExternalError::oracle_invalid(e.to_string())
        })?;
        Ok(self.validate(round, now)?)
    }

    fn validate(
        &self,
        round: PriceRound,
        now: DateTime<Utc>,
    ) -> std::result::Result<PriceQuote, ExternalError> {
        if round.answer <= 0 {
            return Err(ExternalError::oracle_invalid(format!(
                "non-positive price {}",
                round.answer
            )));
        }
        if round.updated_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(ExternalError::oracle_invalid(format!(
                "price timestamp {} is in the future",
                round.updated_at
            )));
        }
        if let Some(max_staleness) = self.max_staleness {
            if now - round.updated_at > max_staleness {
                return Err(ExternalError::oracle_invalid(format!(
                    "stale price updated at {}",
                    round.updated_at
                )));
            }
        }

        Ok(PriceQuote {
            price: round.answer as u128,
            updated_at: round.updated_at,
        })
    }

    /// USD value (1e8-scaled) of a native amount
    pub async fn convert_to_usd(&self, native_amount: Amount) -> Result<UsdValue> {
        self.convert_with_decimals(native_amount, NATIVE_DECIMALS).await
    }

    /// USD value (1e8-scaled) of a token amount, assuming the feed prices the token
    pub async fn convert_token_to_usd(&self, amount: Amount, decimals: u8) -> Result<UsdValue> {
        self.convert_with_decimals(amount, decimals).await
    }

    async fn convert_with_decimals(&self, amount: Amount, decimals: u8) -> Result<UsdValue> {
        let quote = self.latest_price().await?;
        Ok(usd_value(amount, quote.price, decimals).ok_or(ValidationError::AmountOverflow)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custodia_types::{CustodyError, ErrorKind};

    const ONE_NATIVE: u128 = 1_000_000_000_000_000_000;
    const PRICE_2000: i128 = 2_000_00000000;

    fn adapter(feed: Arc<StaticPriceFeed>) -> PriceOracleAdapter {
        PriceOracleAdapter::new(feed, Some(std::time::Duration::from_secs(3600)))
    }

    #[tokio::test]
    async fn test_latest_price() {
        let feed = Arc::new(StaticPriceFeed::new("NATIVE / USD"));
        let now = Utc::now();
        feed.set_round(PRICE_2000, now).await;

        let quote = adapter(feed).latest_price_at(now).await.unwrap();
        assert_eq!(quote.price, 200_000_000_000);
        assert_eq!(quote.updated_at, now);
    }

    #[tokio::test]
    async fn test_non_positive_price_rejected() {
        let feed = Arc::new(StaticPriceFeed::new("NATIVE / USD"));
        let now = Utc::now();
        let oracle = adapter(feed.clone());

        for answer in [0, -5] {
            feed.set_round(answer, now).await;
            let err = oracle.latest_price_at(now).await.unwrap_err();
            assert_eq!(err.error_code(), "ORACLE_PRICE_INVALID");
        }
    }

    #[tokio::test]
    async fn test_stale_price_rejected() {
        let feed = Arc::new(StaticPriceFeed::new("NATIVE / USD"));
        let now = Utc::now();
        feed.set_round(PRICE_2000, now - Duration::hours(2)).await;

        let err = adapter(feed.clone()).latest_price_at(now).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::External);

        let lenient = PriceOracleAdapter::new(feed, None);
        assert!(lenient.latest_price_at(now).await.is_ok());
    }

    #[tokio::test]
    async fn test_future_price_rejected() {
        let feed = Arc::new(StaticPriceFeed::new("NATIVE / USD"));
        let now = Utc::now();
        feed.set_round(PRICE_2000, now + Duration::minutes(10)).await;
        assert!(adapter(feed).latest_price_at(now).await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_feed() {
        let feed = Arc::new(StaticPriceFeed::new("NATIVE / USD"));
        let err = adapter(feed).latest_price().await.unwrap_err();
        assert!(matches!(
            err,
            CustodyError::External(ExternalError::OraclePriceInvalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_convert_to_usd() {
        let feed = Arc::new(StaticPriceFeed::with_price("NATIVE / USD", PRICE_2000));
        let oracle = adapter(feed);

        // 1.5 native at $2000 = $3000, scaled by 1e8
        let usd = oracle
            .convert_to_usd(Amount::new(ONE_NATIVE + ONE_NATIVE / 2))
            .await
            .unwrap();
        assert_eq!(usd, UsdValue(3_000_00000000));

        // 250 USDC (6 decimals) at $1
        let stable = adapter(Arc::new(StaticPriceFeed::with_price("USDC / USD", 1_00000000)));
        let usd = stable
            .convert_token_to_usd(Amount::new(250_000_000), 6)
            .await
            .unwrap();
        assert_eq!(usd, UsdValue(250_00000000));
    }

    #[test]
    fn test_usd_value_overflow() {
        assert_eq!(usd_value(Amount::new(u128::MAX), 2, 18), None);
        assert_eq!(usd_value(Amount::new(1), 1, 18), Some(UsdValue(0)));
    }
}
