pub mod yahoo;


use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::error::MarketDataError;

pub use yahoo::YahooClient;

pub type MarketDataResult<T> = Result<T, MarketDataError>;

/// Read-only market-data lookups keyed by ticker symbol.
///
/// Every call goes straight to the provider: no caching, no retries. Provider
/// failures (unknown ticker, outage, rate limit) come back as errors rather
/// than empty payloads.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent daily close.
    async fn latest_price(&self, ticker: &str) -> MarketDataResult<f64>;

    /// Daily bars between `start` (inclusive) and `end` (exclusive), keyed by
    /// field name, each field mapping RFC 3339 timestamp to value.
    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MarketDataResult<Value>;

    /// Period-end date to balance-sheet line items.
    async fn balance_sheet(&self, ticker: &str) -> MarketDataResult<Value>;

    async fn news(&self, ticker: &str) -> MarketDataResult<Value>;

    async fn company_info(&self, ticker: &str) -> MarketDataResult<Value>;

    /// RFC 3339 timestamp to dividend amount, full history.
    async fn dividends(&self, ticker: &str) -> MarketDataResult<Value>;

    /// Period-end date to income-statement line items.
    async fn financials(&self, ticker: &str) -> MarketDataResult<Value>;
}
