//! Application-wide constants
//!
//! Default endpoints, limits and the fixed system instruction live here so
//! the rest of the code never hardcodes them.

/// Server defaults
pub mod server {
    /// Bind on all interfaces
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub const DEFAULT_PORT: u16 = 8888;

    /// Capacity of the channel between the agent task and the response body
    pub const DEFAULT_STREAM_BUFFER: usize = 64;

    pub const CHAT_ROUTE: &str = "/api/chat";
    pub const HEALTH_ROUTE: &str = "/health";
}

/// LLM provider defaults
pub mod llm {
    pub const DEFAULT_BASE_URL: &str = "https://api.thesys.dev/v1/embed/";

    pub const DEFAULT_MODEL: &str = "c1/openai/gpt-5/v-20250930";

    /// Upper bound on model round-trips within one user turn
    pub const DEFAULT_MAX_ROUNDS: usize = 8;

    pub const SYSTEM_PROMPT: &str = "You are a stock analysis assistant. You have the ability to get real-time stock prices, historical stock prices (given a date range), news, balance sheet data, company information, dividend history, and financial statements for publicly traded companies using the provided tools. Use these tools to provide accurate and up-to-date information about stocks when responding to user queries.";
}

/// Market-data provider defaults
pub mod market_data {
    use std::time::Duration;

    pub const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

    /// Sets the session cookie that crumb requests depend on
    pub const DEFAULT_COOKIE_URL: &str = "https://fc.yahoo.com";

    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

    /// Yahoo rejects requests without a browser-like agent
    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) stock-chat/0.1";

    /// Range used for the "current" price lookup
    pub const PRICE_RANGE: &str = "1mo";

    pub const NEWS_COUNT: usize = 10;

    /// 2016-12-31, earliest period requested from fundamentals-timeseries
    pub const FUNDAMENTALS_START: i64 = 1_483_142_400;

    pub const BALANCE_SHEET_ITEMS: &[&str] = &[
        "TotalAssets",
        "CurrentAssets",
        "CashAndCashEquivalents",
        "AccountsReceivable",
        "Inventory",
        "TotalLiabilitiesNetMinorityInterest",
        "CurrentLiabilities",
        "AccountsPayable",
        "LongTermDebt",
        "TotalDebt",
        "NetDebt",
        "StockholdersEquity",
        "CommonStockEquity",
        "RetainedEarnings",
        "WorkingCapital",
        "TangibleBookValue",
        "InvestedCapital",
        "OrdinarySharesNumber",
    ];

    pub const INCOME_STATEMENT_ITEMS: &[&str] = &[
        "TotalRevenue",
        "CostOfRevenue",
        "GrossProfit",
        "ResearchAndDevelopment",
        "SellingGeneralAndAdministration",
        "OperatingExpense",
        "OperatingIncome",
        "InterestExpense",
        "PretaxIncome",
        "TaxProvision",
        "NetIncome",
        "NetIncomeCommonStockholders",
        "EBIT",
        "EBITDA",
        "BasicEPS",
        "DilutedEPS",
        "BasicAverageShares",
        "DilutedAverageShares",
    ];
}

/// Tool names exposed to the model
pub mod tools {
    pub const GET_STOCK_PRICE: &str = "get_stock_price";
    pub const GET_HISTORICAL_STOCK_PRICE: &str = "get_historical_stock_price";
    pub const GET_BALANCE_SHEET: &str = "get_balance_sheet";
    pub const GET_STOCK_NEWS: &str = "get_stock_news";
    pub const GET_COMPANY_INFO: &str = "get_company_info";
    pub const GET_DIVIDENDS: &str = "get_dividends";
    pub const GET_FINANCIALS: &str = "get_financials";
}
