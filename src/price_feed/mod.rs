//! Historical/realtime USD price feed (spec §4.4): stablecoin shortcut, then a historical
//! CoinGecko-class provider, then a realtime Jupiter-class provider for recent timestamps.
//! Backed by a process-wide TTL+LRU cache keyed by `(mint, timestamp_minute)`.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

const CACHE_TTL: Duration = Duration::from_secs(3600);
const LRU_SWEEP_THRESHOLD: usize = 1000;
const REALTIME_WINDOW: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub source: String,
    pub confidence: f64,
}

struct CacheEntry {
    quote: PriceQuote,
    inserted_at: Instant,
}

struct PriceCache {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl PriceCache {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<PriceQuote> {
        self.entries.get(key).and_then(|e| {
            if e.inserted_at.elapsed() < CACHE_TTL {
                Some(e.quote.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, key: String, quote: PriceQuote) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                quote,
                inserted_at: Instant::now(),
            },
        );
        while self.entries.len() > LRU_SWEEP_THRESHOLD {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            } else {
                break;
            }
        }
    }
}

fn cache_key(mint: &str, timestamp: DateTime<Utc>) -> String {
    format!("{mint}:{}", timestamp.timestamp() / 60)
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    market_data: Option<HistoricalMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoricalMarketData {
    current_price: HistoricalCurrentPrice,
}

#[derive(Debug, Deserialize)]
struct HistoricalCurrentPrice {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RealtimeResponse {
    data: HashMap<String, RealtimePrice>,
}

#[derive(Debug, Deserialize)]
struct RealtimePrice {
    price: f64,
}

pub struct PriceFeedConfig {
    pub historical_base_url: String,
    pub realtime_base_url: String,
    pub symbol_to_id: HashMap<String, String>,
}

/// Historical/realtime price lookup with stablecoin shortcut and provider fallback.
pub struct PriceFeed {
    http: Client,
    config: PriceFeedConfig,
    cache: Mutex<PriceCache>,
    fetch_semaphore: Semaphore,
}

impl PriceFeed {
    pub fn new(config: PriceFeedConfig) -> Self {
        Self {
            http: Client::new(),
            config,
            cache: Mutex::new(PriceCache::new()),
            fetch_semaphore: Semaphore::new(5),
        }
    }

    /// `price(mint, timestamp, symbol?) -> (price_usd, source, confidence)` (spec §4.4).
    pub async fn price(
        &self,
        mint: &str,
        timestamp: DateTime<Utc>,
        symbol: Option<&str>,
    ) -> Option<PriceQuote> {
        if let Some(sym) = symbol {
            if sym == "USDC" || sym == "USDT" {
                return Some(PriceQuote {
                    price_usd: 1.0,
                    source: "stablecoin".to_string(),
                    confidence: 0.99,
                });
            }
        }

        let key = cache_key(mint, timestamp);
        if let Some(hit) = self.cache.lock().get(&key) {
            debug!(mint, "price cache hit");
            return Some(hit);
        }

        let _permit = self.fetch_semaphore.acquire().await.ok()?;

        let quote = self.fetch_historical(symbol, timestamp).await.or(
            if Utc::now().signed_duration_since(timestamp).abs() < REALTIME_WINDOW {
                self.fetch_realtime(mint).await
            } else {
                None
            },
        )?;

        self.cache.lock().put(key, quote.clone());
        Some(quote)
    }

    /// Batch variant, bounded to `≤ 5` concurrent fetches via `fetch_semaphore`, keyed by
    /// cache key (spec §4.4).
    pub async fn prices(
        &self,
        requests: Vec<(String, DateTime<Utc>, Option<String>)>,
    ) -> HashMap<String, PriceQuote> {
        let futures = requests.into_iter().map(|(mint, ts, symbol)| async move {
            let quote = self.price(&mint, ts, symbol.as_deref()).await;
            (cache_key(&mint, ts), quote)
        });
        let results = futures::future::join_all(futures).await;
        results
            .into_iter()
            .filter_map(|(key, quote)| quote.map(|q| (key, q)))
            .collect()
    }

    async fn fetch_historical(
        &self,
        symbol: Option<&str>,
        timestamp: DateTime<Utc>,
    ) -> Option<PriceQuote> {
        let symbol = symbol?;
        let id = self.config.symbol_to_id.get(symbol)?;
        let date = timestamp.format("%d-%m-%Y").to_string();
        let url = format!(
            "{}/coins/{id}/history?date={date}",
            self.config.historical_base_url
        );
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            warn!(symbol, %date, status = %response.status(), "historical price fetch failed");
            return None;
        }
        let body: HistoricalResponse = response.json().await.ok()?;
        let price_usd = body.market_data?.current_price.usd?;
        Some(PriceQuote {
            price_usd,
            source: "historical".to_string(),
            confidence: 0.9,
        })
    }

    async fn fetch_realtime(&self, mint: &str) -> Option<PriceQuote> {
        let url = format!("{}/price?ids={mint}", self.config.realtime_base_url);
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            warn!(mint, status = %response.status(), "realtime price fetch failed");
            return None;
        }
        let body: RealtimeResponse = response.json().await.ok()?;
        let price_usd = body.data.get(mint)?.price;
        Some(PriceQuote {
            price_usd,
            source: "realtime".to_string(),
            confidence: 0.75,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> PriceFeed {
        PriceFeed::new(PriceFeedConfig {
            historical_base_url: "http://localhost:1".to_string(),
            realtime_base_url: "http://localhost:1".to_string(),
            symbol_to_id: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn stablecoin_shortcut_skips_network() {
        let feed = feed();
        let quote = feed
            .price("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", Utc::now(), Some("USDC"))
            .await
            .expect("stablecoin shortcut");
        assert_eq!(quote.price_usd, 1.0);
        assert_eq!(quote.source, "stablecoin");
    }

    #[test]
    fn cache_key_buckets_by_minute() {
        let t1 = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let t2 = DateTime::<Utc>::from_timestamp(1_700_000_030, 0).unwrap();
        assert_eq!(cache_key("mint", t1), cache_key("mint", t2));
    }
}
