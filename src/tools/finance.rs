//! Stock market tools
//!
//! All four tools resolve a free-text company name to a ticker first. They
//! never fail: provider and parse errors come back as the tool's text so the
//! model can read them and adjust.

use super::{InputSchema, Tool, NO_DATA};
use crate::error::AdvisorError;
use crate::market::{resolve_ticker, MarketData};
use crate::models::{ToolInput, ToolOutput};
use crate::Result;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

const MAX_HISTORY_DAYS: i64 = 30;

/// `evaluate_returns` looks back at most one month
const MAX_RETURN_DAYS: i64 = 31;

fn fields(input: &ToolInput, expected: usize) -> Result<&[String]> {
    match input {
        ToolInput::Fields(f) if f.len() == expected => Ok(f.as_slice()),
        other => Err(AdvisorError::InvalidToolInput(format!(
            "Expected {} comma separated values, got {:?}",
            expected, other
        ))),
    }
}

fn text(input: &ToolInput) -> Result<&str> {
    input
        .as_text()
        .ok_or_else(|| AdvisorError::InvalidToolInput(format!("Expected text, got {:?}", input)))
}

/// Turn a tool failure into observation text.
fn recover(tool: &str, result: Result<String>) -> ToolOutput {
    match result {
        Ok(text) => ToolOutput::text(text),
        Err(e) => {
            warn!(tool_name = tool, error = %e, "Finance tool failed");
            ToolOutput::text(e.to_string())
        }
    }
}

//
// ================= Historical Price =================
//

pub struct HistoricalPriceTool {
    market: Arc<dyn MarketData>,
}

impl HistoricalPriceTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    async fn run(&self, input: &ToolInput) -> Result<String> {
        let f = fields(input, 3)?;
        let (company, start, days) = (&f[0], &f[1], &f[2]);

        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").map_err(|e| {
            AdvisorError::InvalidToolInput(format!(
                "Invalid start date {:?}, expected YYYY-MM-DD: {}",
                start, e
            ))
        })?;
        let days: i64 = days.parse().map_err(|_| {
            AdvisorError::InvalidToolInput(format!("Invalid duration {:?}, expected days", days))
        })?;
        if !(1..=MAX_HISTORY_DAYS).contains(&days) {
            return Err(AdvisorError::InvalidToolInput(format!(
                "Duration must be between 1 and {} days, got {}",
                MAX_HISTORY_DAYS, days
            )));
        }

        let symbol = resolve_ticker(self.market.as_ref(), company).await?;

        let start = start.and_time(NaiveTime::default()).and_utc();
        let end = start.checked_add_signed(Duration::days(days)).ok_or_else(|| {
            AdvisorError::InvalidToolInput(format!(
                "Start date {} is out of range",
                start.date_naive()
            ))
        })?;
        let history = self.market.history(&symbol, start, end).await?;

        if history.is_empty() {
            return Ok(NO_DATA.to_string());
        }

        let values: BTreeMap<String, String> = history
            .iter()
            .map(|p| (p.date.format("%Y-%m-%d").to_string(), format!("{:.2}", p.close)))
            .collect();

        Ok(serde_json::to_string(&values)?)
    }
}

#[async_trait::async_trait]
impl Tool for HistoricalPriceTool {
    fn name(&self) -> &'static str {
        "get_historical_price"
    }

    fn description(&self) -> &'static str {
        "Fetches daily closing prices of a company's stock starting at a date \
         (YYYY-MM-DD) for a number of days (max 30)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Fields(&["company_name", "start_date", "duration_days"])
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        Ok(recover(self.name(), self.run(input).await))
    }
}

//
// ================= Current Price =================
//

pub struct CurrentPriceTool {
    market: Arc<dyn MarketData>,
}

impl CurrentPriceTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    async fn run(&self, input: &ToolInput) -> Result<String> {
        let symbol = resolve_ticker(self.market.as_ref(), text(input)?).await?;
        Ok(match self.market.latest_close(&symbol).await? {
            Some(point) => format!("{:.2}", point.close),
            None => NO_DATA.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Tool for CurrentPriceTool {
    fn name(&self) -> &'static str {
        "get_current_price"
    }

    fn description(&self) -> &'static str {
        "Returns the latest closing price of a company's stock."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Text { required: true }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        Ok(recover(self.name(), self.run(input).await))
    }
}

//
// ================= Company Info =================
//

pub struct CompanyInfoTool {
    market: Arc<dyn MarketData>,
}

impl CompanyInfoTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    async fn run(&self, input: &ToolInput) -> Result<String> {
        let symbol = resolve_ticker(self.market.as_ref(), text(input)?).await?;
        let info = self.market.metadata(&symbol).await?;
        if info.trim().is_empty() {
            Ok(NO_DATA.to_string())
        } else {
            Ok(info)
        }
    }
}

#[async_trait::async_trait]
impl Tool for CompanyInfoTool {
    fn name(&self) -> &'static str {
        "get_company_info"
    }

    fn description(&self) -> &'static str {
        "Returns exchange and quote information for a company."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Text { required: true }
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        Ok(recover(self.name(), self.run(input).await))
    }
}

//
// ================= Evaluate Returns =================
//

pub struct EvaluateReturnsTool {
    market: Arc<dyn MarketData>,
}

impl EvaluateReturnsTool {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }

    async fn run(&self, input: &ToolInput) -> Result<String> {
        let f = fields(input, 2)?;
        let (company, token) = (&f[0], &f[1]);

        let window = parse_period(token)?;
        let symbol = resolve_ticker(self.market.as_ref(), company).await?;

        let end = Utc::now();
        let start = end.checked_sub_signed(window).ok_or_else(|| {
            AdvisorError::InvalidToolInput(format!("Duration {:?} is out of range", token))
        })?;
        let history = self.market.history(&symbol, start, end).await?;

        let (Some(first), Some(last)) = (history.first(), history.last()) else {
            return Ok(NO_DATA.to_string());
        };
        if first.close == 0.0 {
            return Err(AdvisorError::Arithmetic(format!(
                "{} has a zero opening close on {}",
                symbol, first.date
            )));
        }

        let change = (last.close - first.close) / first.close * 100.0;
        Ok(format!(
            "The stock price of {} has changed by {:.2}% in the last {}",
            company, change, token
        ))
    }
}

/// Parse a period token like `1M`, `2W`, `10D` or `Y`. Windows longer than
/// a month are rejected.
pub fn parse_period(token: &str) -> Result<Duration> {
    let token = token.trim();
    let invalid = || {
        AdvisorError::InvalidToolInput(format!(
            "Invalid duration {:?}, expected something like 1D, 1W, 1M or 1Y",
            token
        ))
    };

    let unit = token.chars().last().ok_or_else(invalid)?;
    let count = &token[..token.len() - unit.len_utf8()];
    let count: i64 = if count.is_empty() {
        1
    } else {
        count.trim().parse().map_err(|_| invalid())?
    };
    if count <= 0 {
        return Err(invalid());
    }

    let days = match unit.to_ascii_uppercase() {
        'D' => 1,
        'W' => 7,
        'M' => 30,
        'Y' => 365,
        _ => return Err(invalid()),
    };
    let total = count.checked_mul(days).ok_or_else(invalid)?;
    if total > MAX_RETURN_DAYS {
        return Err(AdvisorError::InvalidToolInput(format!(
            "Duration {:?} is longer than the {} day maximum",
            token, MAX_RETURN_DAYS
        )));
    }
    Duration::try_days(total).ok_or_else(invalid)
}

#[async_trait::async_trait]
impl Tool for EvaluateReturnsTool {
    fn name(&self) -> &'static str {
        "evaluate_returns"
    }

    fn description(&self) -> &'static str {
        "Percentage change of a company's stock price over a recent period \
         such as 1D, 1W or 1M (max one month), counted back from today."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::Fields(&["company_name", "duration"])
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        Ok(recover(self.name(), self.run(input).await))
    }
}
