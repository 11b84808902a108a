use crate::error::{FrontierError, FrontierResult};
use crate::returns::PriceMatrix;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Represents a single candlestick data point (OHLCV).
#[derive(Clone, Debug)]
#[allow(dead_code)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Holds historical stock data for a specific symbol.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooChartError>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Deserialize, Debug)]
struct YahooSearchResponse {
    #[serde(default)]
    news: Vec<NewsItem>,
}

/// One headline from the Yahoo search feed.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NewsItem {
    #[serde(default)]
    pub uuid: Option<String>,
    pub title: String,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(rename = "providerPublishTime")]
    pub provider_publish_time: i64,
}

/// `[timestamp_ms, open, high, low, close]` rows, shaped for candlestick charts.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HistorySeries {
    pub series: Vec<SeriesData>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SeriesData {
    pub data: Vec<(i64, f64, f64, f64, f64)>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StockSnapshot {
    pub symbol: String,
    pub today_open: f64,
    pub news: Vec<NewsItem>,
}

const NEWS_ITEMS: usize = 3;

fn batch_fetch_delay_ms() -> u64 {
    std::env::var("FRONTIER_BATCH_FETCH_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(0, 5_000))
        .unwrap_or(350)
}

/// Recovers the typed error from an anyhow chain; anything untyped is a
/// provider failure.
pub fn into_frontier_error(err: anyhow::Error) -> FrontierError {
    match err.downcast::<FrontierError>() {
        Ok(typed) => typed,
        Err(other) => FrontierError::Provider(format!("{:#}", other)),
    }
}

fn chart_to_stock_data(symbol: &str, response: &YahooChartResponse) -> Result<StockData> {
    if let Some(err) = &response.chart.error {
        let reason = err
            .description
            .clone()
            .or_else(|| err.code.clone())
            .unwrap_or_else(|| "unknown chart error".to_string());
        return Err(FrontierError::InvalidTicker(format!("{}: {}", symbol, reason)).into());
    }

    let result = response
        .chart
        .result
        .as_ref()
        .and_then(|r| r.first())
        .ok_or_else(|| FrontierError::InvalidTicker(format!("{}: no chart data found", symbol)))?;

    let quotes = result
        .indicators
        .quote
        .first()
        .ok_or_else(|| FrontierError::InvalidTicker(format!("{}: no quote data found", symbol)))?;

    let mut history = Vec::new();
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        if let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quotes.open),
            field(&quotes.high),
            field(&quotes.low),
            field(&quotes.close),
        ) {
            let Some(date) = Utc.timestamp_opt(timestamp, 0).single() else {
                continue;
            };
            history.push(Candle {
                date,
                open,
                high,
                low,
                close,
                volume: field(&quotes.volume).unwrap_or(0.0),
            });
        }
    }

    if history.is_empty() {
        return Err(FrontierError::InvalidTicker(format!("{}: empty price history", symbol)).into());
    }

    Ok(StockData {
        symbol: symbol.to_uppercase(),
        history,
    })
}

/// Fetches historical stock data from Yahoo Finance.
///
/// Responses are cached under `.cache/` for 24 hours.
///
/// # Arguments
/// * `symbol` - The stock ticker symbol (e.g., "AAPL").
/// * `range` - The time range to fetch (e.g., "1y", "5y").
pub async fn fetch_range(symbol: &str, range: &str) -> Result<StockData> {
    let cache_dir = std::path::Path::new(".cache");
    if !cache_dir.exists() {
        std::fs::create_dir(cache_dir)?;
    }

    let cache_file = cache_dir.join(format!("{}_{}.json", symbol, range));

    let response: YahooChartResponse = if cache_file.exists() {
        // Check if cache is fresh (e.g. < 24 hours)
        let metadata = std::fs::metadata(&cache_file)?;
        let modified = metadata.modified()?;
        let age = std::time::SystemTime::now().duration_since(modified)?;

        if age.as_secs() < 86400 {
            info!("Loading {} from cache...", symbol);
            let file = std::fs::File::open(&cache_file)?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader)?
        } else {
            info!("Cache expired for {}, fetching...", symbol);
            fetch_from_api(symbol, range, Some(&cache_file)).await?
        }
    } else {
        info!("Cache miss for {}, fetching...", symbol);
        fetch_from_api(symbol, range, Some(&cache_file)).await?
    };

    chart_to_stock_data(symbol, &response)
}

pub async fn fetch_ranges_prefetch(
    symbols: &[String],
    range: &str,
) -> Result<HashMap<String, StockData>> {
    let mut out: HashMap<String, StockData> = HashMap::new();
    let delay_ms = batch_fetch_delay_ms();

    for (idx, raw_symbol) in symbols.iter().enumerate() {
        let symbol = raw_symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(FrontierError::InvalidTicker("<empty>".to_string()).into());
        }
        if out.contains_key(&symbol) {
            continue;
        }

        let data = fetch_range(&symbol, range).await.map_err(|e| {
            warn!(
                "historical prefetch failed: symbol={}, range={}, reason={:#}",
                symbol, range, e
            );
            e
        })?;
        out.insert(symbol.clone(), data);

        if idx + 1 < symbols.len() && delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    Ok(out)
}

/// Aligns close series by calendar date: union of dates, `None` where a
/// symbol has no close that day. Column order follows `symbols`.
pub fn align_close_prices(symbols: &[String], data: &HashMap<String, StockData>) -> PriceMatrix {
    let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();

    for (col, symbol) in symbols.iter().enumerate() {
        let Some(stock) = data.get(symbol) else {
            continue;
        };
        for candle in &stock.history {
            let row = by_date
                .entry(candle.date.date_naive())
                .or_insert_with(|| vec![None; symbols.len()]);
            row[col] = Some(candle.close);
        }
    }

    let mut timestamps = Vec::with_capacity(by_date.len());
    let mut rows = Vec::with_capacity(by_date.len());
    for (date, row) in by_date {
        let ts = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_default();
        timestamps.push(ts);
        rows.push(row);
    }

    PriceMatrix::new(symbols.to_vec(), timestamps, rows)
}

/// Trimmed, upper-cased, empties dropped, first occurrence kept.
pub fn dedup_symbols(symbols: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols.iter().map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// Fetches every symbol and aligns their closes into one matrix.
pub async fn fetch_price_matrix(symbols: &[String], range: &str) -> FrontierResult<PriceMatrix> {
    if symbols.is_empty() {
        return Err(FrontierError::InsufficientData("no tickers requested".to_string()));
    }
    let normalized = dedup_symbols(symbols);
    if normalized.len() < symbols.len() {
        warn!("Ignoring repeated or empty symbols in {:?}", symbols);
    }
    if normalized.is_empty() {
        return Err(FrontierError::InsufficientData("no tickers requested".to_string()));
    }
    let data = fetch_ranges_prefetch(&normalized, range)
        .await
        .map_err(into_frontier_error)?;

    let matrix = align_close_prices(&normalized, &data);
    info!(
        "Aligned {} symbols over {} trading dates",
        matrix.num_tickers(),
        matrix.rows.len()
    );
    Ok(matrix)
}

async fn fetch_from_api(
    symbol: &str,
    range: &str,
    cache_path: Option<&std::path::Path>,
) -> Result<YahooChartResponse> {
    let url = format!("https://query1.finance.yahoo.com/v8/finance/chart/{}", symbol);

    let mut attempts = 0;
    let max_attempts = 3;

    loop {
        attempts += 1;
        match reqwest::Client::new()
            .get(&url)
            .query(&[("range", range), ("interval", "1d")])
            .header("User-Agent", "Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await
        {
            Ok(resp) => {
                // Unknown symbols come back as 404 with a chart.error body.
                let status = resp.status();
                match resp.json::<YahooChartResponse>().await {
                    Ok(resp_json) => {
                        let usable = resp_json.chart.error.is_none()
                            && resp_json.chart.result.as_ref().is_some_and(|r| !r.is_empty());
                        if usable {
                            if let Some(path) = cache_path {
                                let file = std::fs::File::create(path)?;
                                let writer = std::io::BufWriter::new(file);
                                serde_json::to_writer(writer, &resp_json)?;
                            }
                        }
                        return Ok(resp_json);
                    }
                    Err(e) => {
                        if status == reqwest::StatusCode::NOT_FOUND {
                            return Err(FrontierError::InvalidTicker(symbol.to_string()).into());
                        }
                        if attempts >= max_attempts {
                            return Err(e.into());
                        }
                        warn!("Failed to parse JSON for {} (attempt {}/{}): {}", symbol, attempts, max_attempts, e);
                    }
                }
            }
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(e.into());
                }
                warn!("Failed to fetch data for {} (attempt {}/{}): {}", symbol, attempts, max_attempts, e);
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

/// One year of daily OHLC for charting.
pub async fn get_history(symbol: &str) -> Result<HistorySeries> {
    let data = fetch_range(&symbol.trim().to_uppercase(), "1y").await?;
    Ok(history_series(&data))
}

pub fn history_series(data: &StockData) -> HistorySeries {
    let rows = data
        .history
        .iter()
        .map(|c| (c.date.timestamp_millis(), c.open, c.high, c.low, c.close))
        .collect();
    HistorySeries {
        series: vec![SeriesData { data: rows }],
    }
}

/// Today's open plus the most recent headlines.
pub async fn get_stock_snapshot(symbol: &str) -> Result<StockSnapshot> {
    let symbol = symbol.trim().to_uppercase();
    let response = fetch_from_api(&symbol, "1d", None).await?;
    let today = chart_to_stock_data(&symbol, &response)?;
    let today_open = today
        .history
        .first()
        .map(|c| c.open)
        .ok_or_else(|| FrontierError::InvalidTicker(format!("{}: no session today", symbol)))?;

    let news = match fetch_news(&symbol).await {
        Ok(items) => top_news(items, NEWS_ITEMS),
        Err(e) => {
            warn!("News fetch failed for {}: {:#}", symbol, e);
            Vec::new()
        }
    };

    Ok(StockSnapshot {
        symbol,
        today_open,
        news,
    })
}

async fn fetch_news(symbol: &str) -> Result<Vec<NewsItem>> {
    let parsed = reqwest::Client::new()
        .get("https://query2.finance.yahoo.com/v1/finance/search")
        .query(&[("q", symbol), ("quotesCount", "0"), ("newsCount", "10")])
        .header("User-Agent", "Mozilla/5.0")
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await?
        .error_for_status()?
        .json::<YahooSearchResponse>()
        .await?;
    Ok(parsed.news)
}

/// Newest first, at most `limit` items.
pub fn top_news(mut items: Vec<NewsItem>, limit: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| b.provider_publish_time.cmp(&a.provider_publish_time));
    items.truncate(limit);
    items
}
