use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::Tool;
use crate::constants::tools::*;
use crate::data::MarketData;
use crate::error::{MarketDataError, ToolError};

/// The seven lookups exposed to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StockLookup {
    Price,
    HistoricalPrice,
    BalanceSheet,
    News,
    CompanyInfo,
    Dividends,
    Financials,
}

impl StockLookup {
    pub const ALL: [StockLookup; 7] = [
        StockLookup::Price,
        StockLookup::HistoricalPrice,
        StockLookup::BalanceSheet,
        StockLookup::News,
        StockLookup::CompanyInfo,
        StockLookup::Dividends,
        StockLookup::Financials,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StockLookup::Price => GET_STOCK_PRICE,
            StockLookup::HistoricalPrice => GET_HISTORICAL_STOCK_PRICE,
            StockLookup::BalanceSheet => GET_BALANCE_SHEET,
            StockLookup::News => GET_STOCK_NEWS,
            StockLookup::CompanyInfo => GET_COMPANY_INFO,
            StockLookup::Dividends => GET_DIVIDENDS,
            StockLookup::Financials => GET_FINANCIALS,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StockLookup::Price => {
                "A function that returns the current stock price based on a ticker symbol."
            }
            StockLookup::HistoricalPrice => {
                "A function that returns the current stock price over time based on a ticker symbol and a start and end date."
            }
            StockLookup::BalanceSheet => {
                "A function that returns the balance sheet based on a ticker symbol."
            }
            StockLookup::News => "A function that returns news based on a ticker symbol.",
            StockLookup::CompanyInfo => {
                "Return company profile / info for a ticker (summary, sector, industry, website, etc.)."
            }
            StockLookup::Dividends => "Return dividend history for a ticker.",
            StockLookup::Financials => {
                "Return financial statements (income statement / financials) for a ticker."
            }
        }
    }

    pub fn parameters(self) -> Value {
        let ticker = json!({
            "type": "string",
            "description": "Stock ticker symbol, e.g. AAPL"
        });
        match self {
            StockLookup::HistoricalPrice => json!({
                "type": "object",
                "properties": {
                    "ticker": ticker,
                    "start_date": {"type": "string", "description": "Start date (inclusive), YYYY-MM-DD"},
                    "end_date": {"type": "string", "description": "End date (exclusive), YYYY-MM-DD"}
                },
                "required": ["ticker", "start_date", "end_date"],
                "additionalProperties": false
            }),
            _ => json!({
                "type": "object",
                "properties": {"ticker": ticker},
                "required": ["ticker"],
                "additionalProperties": false
            }),
        }
    }
}

/// Arguments for every lookup; only the historical one reads the dates.
#[derive(Deserialize, Debug)]
struct LookupArgs {
    ticker: String,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

/// One lookup bound to a market-data provider.
pub struct StockTool {
    lookup: StockLookup,
    data: Arc<dyn MarketData>,
}

impl StockTool {
    pub fn new(lookup: StockLookup, data: Arc<dyn MarketData>) -> Self {
        Self { lookup, data }
    }

    fn decode(&self, arguments: Value) -> Result<LookupArgs, ToolError> {
        serde_json::from_value(arguments).map_err(|source| ToolError::InvalidArguments {
            name: self.name().to_string(),
            source,
        })
    }

    fn required(&self, value: Option<String>, field: &'static str) -> Result<String, ToolError> {
        value.ok_or_else(|| ToolError::InvalidArguments {
            name: self.name().to_string(),
            source: <serde_json::Error as serde::de::Error>::missing_field(field),
        })
    }

    fn failed(&self, source: MarketDataError) -> ToolError {
        ToolError::Execution {
            name: self.name().to_string(),
            source,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, MarketDataError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| MarketDataError::InvalidDate {
        value: value.to_string(),
    })
}

#[async_trait]
impl Tool for StockTool {
    fn name(&self) -> &'static str {
        self.lookup.name()
    }

    fn description(&self) -> &'static str {
        self.lookup.description()
    }

    fn parameters(&self) -> Value {
        self.lookup.parameters()
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = self.decode(arguments)?;
        let ticker = args.ticker.as_str();
        info!("🔧 [TOOL] {} is being used (ticker: {})", self.name(), ticker);

        let result = match self.lookup {
            StockLookup::Price => self.data.latest_price(ticker).await.map(|p| json!(p)),
            StockLookup::HistoricalPrice => {
                let start_date = self.required(args.start_date, "start_date")?;
                let end_date = self.required(args.end_date, "end_date")?;
                let start = parse_date(&start_date).map_err(|e| self.failed(e))?;
                let end = parse_date(&end_date).map_err(|e| self.failed(e))?;
                self.data.price_history(ticker, start, end).await
            }
            StockLookup::BalanceSheet => self.data.balance_sheet(ticker).await,
            StockLookup::News => self.data.news(ticker).await,
            StockLookup::CompanyInfo => self.data.company_info(ticker).await,
            StockLookup::Dividends => self.data.dividends(ticker).await,
            StockLookup::Financials => self.data.financials(ticker).await,
        };
        result.map_err(|e| self.failed(e))
    }
}
