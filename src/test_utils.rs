//! Scripted fakes for the model and market-data seams.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use crate::data::{MarketData, MarketDataResult};
use crate::error::{LlmError, MarketDataError};
use crate::llm::{ChatMessage, ChatModel, ModelEvent, ModelStream, ToolCall};
use crate::tools::ToolSpec;

/// Market data with fixed prices; unknown tickers fail like the real provider.
#[derive(Clone, Default)]
pub struct FakeMarketData {
    prices: HashMap<String, f64>,
    hanging: HashSet<String>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, ticker: &str, price: f64) -> Self {
        self.prices.insert(ticker.to_string(), price);
        self
    }

    /// Lookups for `ticker` are recorded and then never complete.
    pub fn with_hang(mut self, ticker: &str) -> Self {
        self.hanging.insert(ticker.to_string());
        self
    }

    /// `(lookup, ticker)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, lookup: &str, ticker: &str) -> MarketDataResult<f64> {
        self.calls
            .lock()
            .unwrap()
            .push((lookup.to_string(), ticker.to_string()));
        if self.hanging.contains(ticker) {
            std::future::pending::<()>().await;
        }
        self.prices
            .get(ticker)
            .copied()
            .ok_or_else(|| MarketDataError::NotFound {
                ticker: ticker.to_string(),
                reason: "No data found, symbol may be delisted".to_string(),
            })
    }
}

#[async_trait]
impl MarketData for FakeMarketData {
    async fn latest_price(&self, ticker: &str) -> MarketDataResult<f64> {
        self.record("latest_price", ticker).await
    }

    async fn price_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> MarketDataResult<Value> {
        let price = self.record("price_history", ticker).await?;
        let ts = format!("{start}T14:30:00+00:00");
        Ok(json!({
            "Open": {&ts: price},
            "High": {&ts: price},
            "Low": {&ts: price},
            "Close": {&ts: price},
            "Volume": {&ts: 1000.0}
        }))
    }

    async fn balance_sheet(&self, ticker: &str) -> MarketDataResult<Value> {
        self.record("balance_sheet", ticker).await?;
        Ok(json!({"2023-09-30": {"TotalAssets": 352583000000i64}}))
    }

    async fn news(&self, ticker: &str) -> MarketDataResult<Value> {
        self.record("news", ticker).await?;
        Ok(json!([{"title": format!("{ticker} headline"), "publisher": "Wire"}]))
    }

    async fn company_info(&self, ticker: &str) -> MarketDataResult<Value> {
        self.record("company_info", ticker).await?;
        Ok(json!({"sector": "Technology"}))
    }

    async fn dividends(&self, ticker: &str) -> MarketDataResult<Value> {
        self.record("dividends", ticker).await?;
        Ok(json!({"2024-02-09T14:30:00+00:00": 0.24}))
    }

    async fn financials(&self, ticker: &str) -> MarketDataResult<Value> {
        self.record("financials", ticker).await?;
        Ok(json!({"2023-09-30": {"TotalRevenue": 383285000000i64}}))
    }
}

/// One scripted model response.
#[derive(Clone, Debug)]
pub enum ScriptedTurn {
    /// Stream these tokens, then these tool calls.
    Reply {
        tokens: Vec<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// Stream these tokens, then fail.
    FailAfter { tokens: Vec<String>, error: String },
    /// Stream these tokens, then stall forever.
    Hang { tokens: Vec<String> },
    /// The request itself never completes.
    NeverOpens,
}

impl ScriptedTurn {
    pub fn text(tokens: &[&str]) -> Self {
        ScriptedTurn::Reply {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: Value) -> Self {
        ScriptedTurn::Reply {
            tokens: Vec::new(),
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        }
    }
}

/// Model that replays scripted turns and records every request it sees.
///
/// With a responder installed, turns are computed from the request instead.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<ScriptedTurn>>>,
    requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    tools_seen: Arc<Mutex<Vec<String>>>,
    responder: Option<Arc<dyn Fn(&[ChatMessage]) -> ScriptedTurn + Send + Sync>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            script: Arc::new(Mutex::new(turns.into())),
            ..Self::default()
        }
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> ScriptedTurn + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(responder)),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    pub fn tools_seen(&self) -> Vec<String> {
        self.tools_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelStream, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        *self.tools_seen.lock().unwrap() = tools.iter().map(|t| t.name.clone()).collect();

        let turn = match &self.responder {
            Some(responder) => responder(messages),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Stream("script exhausted".to_string()))?,
        };

        let token_events = |tokens: Vec<String>| {
            tokens
                .into_iter()
                .map(|t| Ok::<_, LlmError>(ModelEvent::Token(t)))
        };

        let stream: ModelStream = match turn {
            ScriptedTurn::Reply { tokens: t, tool_calls } => Box::pin(stream::iter(
                token_events(t)
                    .chain(tool_calls.into_iter().map(|c| Ok(ModelEvent::ToolCall(c))))
                    .collect::<Vec<_>>(),
            )),
            ScriptedTurn::FailAfter { tokens: t, error } => Box::pin(stream::iter(
                token_events(t)
                    .chain(std::iter::once(Err(LlmError::Stream(error))))
                    .collect::<Vec<_>>(),
            )),
            ScriptedTurn::Hang { tokens: t } => Box::pin(
                stream::iter(token_events(t).collect::<Vec<_>>()).chain(stream::pending()),
            ),
            ScriptedTurn::NeverOpens => return std::future::pending().await,
        };
        Ok(stream)
    }
}
