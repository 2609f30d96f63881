//! Market data provider and ticker resolution
//!
//! The finance tools only see the [`MarketData`] trait; the production
//! implementation is backed by Yahoo Finance.

use crate::error::AdvisorError;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use time::OffsetDateTime;
use tracing::{debug, info};
use yahoo_finance_api as yahoo;

/// Quote types that can actually be priced
const TRADABLE_TYPES: &[&str] = &["EQUITY", "ETF", "MUTUALFUND", "INDEX"];

/// One hit of a symbol search, in provider ranking order
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub quote_type: String,
}

/// Daily close
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Free-text symbol search
    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>>;

    /// Daily closes in `[start, end)`, oldest first
    async fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>>;

    /// Provider metadata for a symbol, rendered as text
    async fn metadata(&self, symbol: &str) -> Result<String>;

    /// Most recent close, if the provider has one for the last week
    async fn latest_close(&self, symbol: &str) -> Result<Option<PricePoint>> {
        let end = Utc::now();
        let history = self.history(symbol, end - Duration::days(7), end).await?;
        Ok(history.into_iter().last())
    }
}

/// Map a free-text company name to a ticker symbol.
///
/// Only tradable quote types are considered. An exact (case-insensitive)
/// match on the symbol or company name wins; otherwise the provider's
/// top-ranked candidate is used and the choice is logged together with the
/// alternatives.
pub async fn resolve_ticker(provider: &dyn MarketData, company: &str) -> Result<String> {
    let company = company.trim();
    if company.is_empty() {
        return Err(AdvisorError::Lookup("Company name is empty".to_string()));
    }

    let candidates: Vec<SymbolMatch> = provider
        .search(company)
        .await?
        .into_iter()
        .filter(|m| {
            m.quote_type.is_empty()
                || TRADABLE_TYPES
                    .iter()
                    .any(|t| m.quote_type.eq_ignore_ascii_case(t))
        })
        .collect();

    let wanted = company.to_lowercase();
    if let Some(exact) = candidates.iter().find(|m| {
        m.symbol.to_lowercase() == wanted || m.name.to_lowercase() == wanted
    }) {
        debug!(company, symbol = %exact.symbol, "Exact ticker match");
        return Ok(exact.symbol.clone());
    }

    let top = candidates.first().ok_or_else(|| {
        AdvisorError::Lookup(format!(
            "Company name '{}' not found, try again by providing a valid company name.",
            company
        ))
    })?;

    if candidates.len() > 1 {
        let alternatives: Vec<&str> = candidates[1..].iter().map(|m| m.symbol.as_str()).collect();
        info!(
            company,
            symbol = %top.symbol,
            ?alternatives,
            "Ambiguous company name, using top-ranked match"
        );
    }

    Ok(top.symbol.clone())
}

/// Yahoo Finance backed provider
#[derive(Default, Clone)]
pub struct YahooMarketData;

impl YahooMarketData {
    pub fn new() -> Self {
        Self
    }

    fn connector() -> Result<yahoo::YahooConnector> {
        yahoo::YahooConnector::new().map_err(|e| AdvisorError::MarketData(e.to_string()))
    }
}

#[async_trait]
impl MarketData for YahooMarketData {
    async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let provider = Self::connector()?;
        let result = provider
            .search_ticker(query)
            .await
            .map_err(|e| AdvisorError::MarketData(e.to_string()))?;

        Ok(result
            .quotes
            .into_iter()
            .map(|q| SymbolMatch {
                name: if q.long_name.is_empty() {
                    q.short_name
                } else {
                    q.long_name
                },
                symbol: q.symbol,
                exchange: q.exchange,
                quote_type: q.quote_type,
            })
            .collect())
    }

    async fn history(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let provider = Self::connector()?;

        // Convert chrono DateTime to time OffsetDateTime
        let start_odt = OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| AdvisorError::MarketData(format!("Invalid start timestamp: {}", e)))?;
        let end_odt = OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| AdvisorError::MarketData(format!("Invalid end timestamp: {}", e)))?;

        let response = provider
            .get_quote_history(symbol, start_odt, end_odt)
            .await
            .map_err(|e| AdvisorError::MarketData(e.to_string()))?;

        let quotes = response
            .quotes()
            .map_err(|e| AdvisorError::MarketData(e.to_string()))?;

        Ok(quotes
            .iter()
            .filter_map(|q| {
                DateTime::from_timestamp(q.timestamp as i64, 0).map(|ts| PricePoint {
                    date: ts.date_naive(),
                    close: q.close,
                })
            })
            .collect())
    }

    async fn metadata(&self, symbol: &str) -> Result<String> {
        let provider = Self::connector()?;
        let response = provider
            .get_latest_quotes(symbol, "1d")
            .await
            .map_err(|e| AdvisorError::MarketData(e.to_string()))?;

        let metadata = response
            .metadata()
            .map_err(|e| AdvisorError::MarketData(e.to_string()))?;

        Ok(format!("{:?}", metadata))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory provider for tool tests
    #[derive(Default)]
    pub struct FakeMarketData {
        pub matches: Vec<SymbolMatch>,
        pub prices: Vec<PricePoint>,
        pub metadata: String,
        pub fail_history: bool,
        pub history_calls: AtomicUsize,
    }

    impl FakeMarketData {
        pub fn with_company(symbol: &str, name: &str) -> Self {
            Self {
                matches: vec![SymbolMatch {
                    symbol: symbol.to_string(),
                    name: name.to_string(),
                    exchange: "NSI".to_string(),
                    quote_type: "EQUITY".to_string(),
                }],
                ..Self::default()
            }
        }

        pub fn with_prices(mut self, prices: &[(&str, f64)]) -> Self {
            self.prices = prices
                .iter()
                .map(|(d, close)| PricePoint {
                    date: NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap(),
                    close: *close,
                })
                .collect();
            self
        }
    }

    #[async_trait]
    impl MarketData for FakeMarketData {
        async fn search(&self, query: &str) -> Result<Vec<SymbolMatch>> {
            let q = query.to_lowercase();
            Ok(self
                .matches
                .iter()
                .filter(|m| {
                    m.name.to_lowercase().contains(&q)
                        || q.contains(&m.name.to_lowercase())
                        || m.symbol.to_lowercase().contains(&q)
                })
                .cloned()
                .collect())
        }

        async fn history(
            &self,
            _symbol: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<PricePoint>> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_history {
                return Err(AdvisorError::MarketData("provider unavailable".to_string()));
            }
            let (start, end) = (start.date_naive(), end.date_naive());
            Ok(self
                .prices
                .iter()
                .filter(|p| p.date >= start && p.date < end)
                .cloned()
                .collect())
        }

        async fn metadata(&self, _symbol: &str) -> Result<String> {
            Ok(self.metadata.clone())
        }

        async fn latest_close(&self, _symbol: &str) -> Result<Option<PricePoint>> {
            if self.fail_history {
                return Err(AdvisorError::MarketData("provider unavailable".to_string()));
            }
            Ok(self.prices.last().cloned())
        }
    }
}
