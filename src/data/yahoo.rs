use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use yahoo_finance_api as yahoo;

use super::{MarketData, MarketDataResult};
use crate::constants::market_data::{
    BALANCE_SHEET_ITEMS, FUNDAMENTALS_START, INCOME_STATEMENT_ITEMS, NEWS_COUNT, PRICE_RANGE,
    REQUEST_TIMEOUT, USER_AGENT,
};
use crate::error::MarketDataError;

const INFO_MODULES: &str = "assetProfile,summaryDetail,price,defaultKeyStatistics";

/// Yahoo Finance market data.
///
/// Prices, dividends and news go through `yahoo_finance_api`. Company
/// profiles and statements come from quoteSummary and fundamentals-timeseries,
/// which only answer with a session cookie and a matching crumb.
pub struct YahooClient {
    connector: yahoo::YahooConnector,
    client: Client,
    base_url: Url,
    cookie_url: Url,
    crumb: Mutex<Option<String>>,
}

#[derive(Deserialize, Debug)]
struct ProviderError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: SummaryBody,
}

#[derive(Deserialize, Debug)]
struct SummaryBody {
    result: Option<Vec<Map<String, Value>>>,
    error: Option<ProviderError>,
}

#[derive(Deserialize, Debug)]
struct TimeseriesEnvelope {
    timeseries: TimeseriesBody,
}

#[derive(Deserialize, Debug)]
struct TimeseriesBody {
    #[serde(default)]
    result: Vec<Value>,
    error: Option<ProviderError>,
}

/// One daily bar, detached from the connector's types.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    fn from_quote(quote: &yahoo::Quote) -> Option<Self> {
        Some(Self {
            timestamp: i64::try_from(quote.timestamp).ok()?,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.close,
            volume: quote.volume as f64,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Headline {
    pub title: String,
    pub publisher: String,
    pub link: String,
    pub published_at: Option<i64>,
    pub kind: String,
}

impl YahooClient {
    pub fn new(base_url: Url, cookie_url: Url) -> MarketDataResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(MarketDataError::Connector(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }

        let connector =
            yahoo::YahooConnector::new().map_err(|e| MarketDataError::Connector(e.to_string()))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            connector,
            client,
            base_url,
            cookie_url,
            crumb: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Cached crumb, or a fresh one after re-establishing the cookie.
    async fn crumb(&self, ticker: &str, refresh: bool) -> MarketDataResult<String> {
        let mut cached = self.crumb.lock().await;
        if !refresh {
            if let Some(crumb) = cached.as_ref() {
                return Ok(crumb.clone());
            }
        }

        // The consent host answers 404 but still sets the session cookie
        self.client.get(self.cookie_url.clone()).send().await?;

        let resp = self
            .client
            .get(self.endpoint(&["v1", "test", "getcrumb"]))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                ticker: ticker.to_string(),
            });
        }
        let crumb = body.trim();
        if !status.is_success() || crumb.is_empty() || crumb.contains('<') {
            return Err(MarketDataError::Http {
                ticker: ticker.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        info!("📡 [YAHOO] Obtained session crumb");
        *cached = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    /// GET with the session crumb; an expired crumb is renewed once.
    async fn get_json<T: DeserializeOwned>(
        &self,
        ticker: &str,
        url: Url,
        query: &[(&str, String)],
    ) -> MarketDataResult<T> {
        let mut crumb = self.crumb(ticker, false).await?;
        let mut renewed = false;

        loop {
            debug!("📡 [YAHOO] GET {} for {}", url.path(), ticker);
            let resp = self
                .client
                .get(url.clone())
                .query(query)
                .query(&[("crumb", crumb.as_str())])
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;

            if status == StatusCode::UNAUTHORIZED && !renewed {
                renewed = true;
                crumb = self.crumb(ticker, true).await?;
                continue;
            }
            return decode(ticker, status, body);
        }
    }

    async fn quote_summary(&self, ticker: &str, modules: &str) -> MarketDataResult<Map<String, Value>> {
        let url = self.endpoint(&["v10", "finance", "quoteSummary", ticker]);
        let query = [("modules", modules.to_string())];
        let envelope: SummaryEnvelope = self.get_json(ticker, url, &query).await?;

        if let Some(err) = envelope.quote_summary.error {
            return Err(not_found(ticker, err));
        }
        envelope
            .quote_summary
            .result
            .and_then(|results| results.into_iter().next())
            .ok_or_else(|| MarketDataError::NotFound {
                ticker: ticker.to_string(),
                reason: "empty quoteSummary result".to_string(),
            })
    }

    /// Annual statement line items, keyed by period end date.
    async fn statements(&self, ticker: &str, items: &[&str]) -> MarketDataResult<Value> {
        let url = self.endpoint(&[
            "ws",
            "fundamentals-timeseries",
            "v1",
            "finance",
            "timeseries",
            ticker,
        ]);
        let types: Vec<String> = items.iter().map(|item| format!("annual{item}")).collect();
        let query = [
            ("symbol", ticker.to_string()),
            ("type", types.join(",")),
            ("period1", FUNDAMENTALS_START.to_string()),
            ("period2", Utc::now().timestamp().to_string()),
        ];
        let envelope: TimeseriesEnvelope = self.get_json(ticker, url, &query).await?;

        if let Some(err) = envelope.timeseries.error {
            return Err(not_found(ticker, err));
        }
        let periods = statements_by_period(&envelope.timeseries.result, "annual");
        if periods.is_empty() {
            return Err(MarketDataError::NotFound {
                ticker: ticker.to_string(),
                reason: "no annual statements reported".to_string(),
            });
        }
        Ok(Value::Object(periods))
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn latest_price(&self, ticker: &str) -> MarketDataResult<f64> {
        let bars = self
            .connector
            .get_quote_range(ticker, "1d", PRICE_RANGE)
            .await
            .and_then(|resp| resp.quotes())
            .map_err(|e| provider(ticker, e))?;

        bars.iter()
            .filter_map(Bar::from_quote)
            .last()
            .map(|bar| bar.close)
            .ok_or_else(|| MarketDataError::NotFound {
                ticker: ticker.to_string(),
                reason: "no close prices in range".to_string(),
            })
    }

    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> MarketDataResult<Value> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end.and_time(NaiveTime::MIN).and_utc().timestamp();
        let to_offset = |ts: i64, date: NaiveDate| {
            OffsetDateTime::from_unix_timestamp(ts).map_err(|_| MarketDataError::InvalidDate {
                value: date.to_string(),
            })
        };

        let quotes = self
            .connector
            .get_quote_history(ticker, to_offset(period1, start)?, to_offset(period2, end)?)
            .await
            .and_then(|resp| resp.quotes())
            .map_err(|e| provider(ticker, e))?;

        let bars: Vec<Bar> = quotes.iter().filter_map(Bar::from_quote).collect();
        Ok(history_by_field(&bars, period2))
    }

    async fn balance_sheet(&self, ticker: &str) -> MarketDataResult<Value> {
        self.statements(ticker, BALANCE_SHEET_ITEMS).await
    }

    async fn news(&self, ticker: &str) -> MarketDataResult<Value> {
        let found = self
            .connector
            .search_ticker(ticker)
            .await
            .map_err(|e| provider(ticker, e))?;

        let symbols: Vec<String> = found.quotes.iter().map(|q| q.symbol.clone()).collect();
        let headlines: Vec<Headline> = found
            .news
            .iter()
            .map(|item| Headline {
                title: item.title.clone(),
                publisher: item.publisher.clone(),
                link: item.link.clone(),
                published_at: i64::try_from(item.provider_publish_time).ok(),
                kind: item.newstype.clone(),
            })
            .collect();

        news_for(ticker, &symbols, headlines)
    }

    async fn company_info(&self, ticker: &str) -> MarketDataResult<Value> {
        let summary = self.quote_summary(ticker, INFO_MODULES).await?;

        let mut info = Map::new();
        for module in summary.values() {
            if let Value::Object(fields) = flatten_raw(module) {
                for (key, value) in fields {
                    if key != "maxAge" && !value.is_null() {
                        info.insert(key, value);
                    }
                }
            }
        }
        Ok(Value::Object(info))
    }

    async fn dividends(&self, ticker: &str) -> MarketDataResult<Value> {
        let dividends = self
            .connector
            .get_quote_range(ticker, "1mo", "max")
            .await
            .and_then(|resp| resp.dividends())
            .map_err(|e| provider(ticker, e))?;

        let mut out = Map::new();
        for dividend in &dividends {
            let key = i64::try_from(dividend.date).ok().and_then(rfc3339);
            if let Some(key) = key {
                out.insert(key, json!(dividend.amount));
            }
        }
        Ok(Value::Object(out))
    }

    async fn financials(&self, ticker: &str) -> MarketDataResult<Value> {
        self.statements(ticker, INCOME_STATEMENT_ITEMS).await
    }
}

fn decode<T: DeserializeOwned>(ticker: &str, status: StatusCode, body: String) -> MarketDataResult<T> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(MarketDataError::RateLimited {
            ticker: ticker.to_string(),
        });
    }
    if status == StatusCode::NOT_FOUND {
        return Err(MarketDataError::NotFound {
            ticker: ticker.to_string(),
            reason: provider_error_description(&body).unwrap_or(body),
        });
    }
    if !status.is_success() {
        return Err(MarketDataError::Http {
            ticker: ticker.to_string(),
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| MarketDataError::Payload {
        ticker: ticker.to_string(),
        reason: e.to_string(),
    })
}

fn provider(ticker: &str, err: yahoo::YahooError) -> MarketDataError {
    MarketDataError::Provider {
        ticker: ticker.to_string(),
        reason: err.to_string(),
    }
}

fn not_found(ticker: &str, err: ProviderError) -> MarketDataError {
    MarketDataError::NotFound {
        ticker: ticker.to_string(),
        reason: err
            .description
            .or(err.code)
            .unwrap_or_else(|| "unknown provider error".to_string()),
    }
}

/// Pull `error.description` out of a `{"<envelope>": {"error": {...}}}` body.
fn provider_error_description(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .as_object()?
        .values()
        .find_map(|envelope| envelope.get("error")?.get("description")?.as_str())
        .map(str::to_string)
}

fn rfc3339(ts: i64) -> Option<String> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.to_rfc3339())
}

/// `{field: {timestamp: value}}` for bars strictly before `end_exclusive`.
pub(crate) fn history_by_field(bars: &[Bar], end_exclusive: i64) -> Value {
    let fields: [(&str, fn(&Bar) -> f64); 5] = [
        ("Open", |b| b.open),
        ("High", |b| b.high),
        ("Low", |b| b.low),
        ("Close", |b| b.close),
        ("Volume", |b| b.volume),
    ];

    let mut out = Map::new();
    for (name, pick) in fields {
        let column: Map<String, Value> = bars
            .iter()
            .filter(|bar| bar.timestamp < end_exclusive)
            .filter_map(|bar| Some((rfc3339(bar.timestamp)?, json!(pick(bar)))))
            .collect();
        out.insert(name.to_string(), Value::Object(column));
    }
    Value::Object(out)
}

/// Search hits for `ticker`, or `NotFound` when the symbol itself is unknown.
pub(crate) fn news_for(
    ticker: &str,
    symbols: &[String],
    headlines: Vec<Headline>,
) -> MarketDataResult<Value> {
    if !symbols.iter().any(|s| s.eq_ignore_ascii_case(ticker)) {
        return Err(MarketDataError::NotFound {
            ticker: ticker.to_string(),
            reason: "symbol not listed".to_string(),
        });
    }

    let items = headlines
        .into_iter()
        .take(NEWS_COUNT)
        .map(|h| {
            json!({
                "title": h.title,
                "publisher": h.publisher,
                "link": h.link,
                "published_at": h.published_at.and_then(rfc3339),
                "type": h.kind,
            })
        })
        .collect();
    Ok(Value::Array(items))
}

/// Replace Yahoo's `{"raw": .., "fmt": ..}` wrappers with their raw value.
pub(crate) fn flatten_raw(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(raw) = map.get("raw") {
                return raw.clone();
            }
            if map.is_empty() {
                return Value::Null;
            }
            if let Some(fmt) = map.get("fmt") {
                return fmt.clone();
            }
            Value::Object(map.iter().map(|(k, v)| (k.clone(), flatten_raw(v))).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(flatten_raw).collect()),
        other => other.clone(),
    }
}

/// Regroup timeseries entries as `{asOfDate: {LineItem: value}}`.
///
/// Each entry names its series in `meta.type[0]` and carries points under
/// that same key; `prefix` is stripped from the line-item name.
pub(crate) fn statements_by_period(series: &[Value], prefix: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for entry in series {
        let Some(kind) = entry.pointer("/meta/type/0").and_then(Value::as_str) else {
            continue;
        };
        let Some(points) = entry.get(kind).and_then(Value::as_array) else {
            continue;
        };
        let item = kind.strip_prefix(prefix).unwrap_or(kind);

        for point in points {
            let date = point.get("asOfDate").and_then(Value::as_str);
            let value = point.get("reportedValue").map(flatten_raw);
            let (Some(date), Some(value)) = (date, value) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if let Value::Object(period) = out
                .entry(date.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
            {
                period.insert(item.to_string(), value);
            }
        }
    }
    out
}
