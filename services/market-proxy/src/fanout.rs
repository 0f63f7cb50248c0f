//! Multi-currency fan-out for market listings
//!
//! The upstream listing endpoint prices assets in a single currency per call.
//! A request for `vs_currencies=usd,brl` becomes one call per currency, issued
//! concurrently, and the listings are merged in request order: the first
//! currency seeds the result set and later currencies add their price to the
//! records already present.

use futures_util::future::try_join_all;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    config::MergeStrategy,
    errors::{ProxyError, ProxyResult},
    models::{AssetRecord, MarketRow},
    upstream::{UpstreamClient, UpstreamRequestSpec},
};

/// Upstream path of the markets listing
pub const MARKETS_PATH: &str = "coins/markets";
/// Single-currency query parameter understood by the upstream
pub const CURRENCY_PARAM: &str = "vs_currency";
/// Currency-list query parameter understood by the proxy
pub const CURRENCY_LIST_PARAM: &str = "vs_currencies";

/// Split a `vs_currencies` value into normalized, de-duplicated codes
pub fn parse_currency_list(raw: &str) -> ProxyResult<Vec<String>> {
    let mut currencies: Vec<String> = Vec::new();
    for code in raw.split(',').map(|c| c.trim().to_lowercase()) {
        if !code.is_empty() && !currencies.contains(&code) {
            currencies.push(code);
        }
    }

    if currencies.is_empty() {
        return Err(ProxyError::MalformedRequest(format!(
            "{CURRENCY_LIST_PARAM} must name at least one currency"
        )));
    }
    Ok(currencies)
}

/// Merge per-currency listings, given in request order.
///
/// The first listing decides the record order. With
/// [`MergeStrategy::FirstCurrency`] assets missing from it are dropped; with
/// [`MergeStrategy::Union`] they are appended in order of first appearance.
/// A currency whose listing lacks an asset contributes an explicit `null`
/// price under both strategies. The key is never omitted, so clients can rely
/// on every requested currency being present in `current_price`; a `null`
/// means that currency's listing did not include the asset.
pub fn merge_listings(
    listings: Vec<(String, Vec<MarketRow>)>,
    strategy: MergeStrategy,
) -> Vec<AssetRecord> {
    let currencies: Vec<String> = listings.iter().map(|(code, _)| code.clone()).collect();
    let mut records: Vec<AssetRecord> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    for (position, (currency, rows)) in listings.into_iter().enumerate() {
        let seeding = position == 0 || strategy == MergeStrategy::Union;

        for row in rows {
            if let Some(&slot) = index.get(&row.id) {
                records[slot]
                    .current_price
                    .entry(currency.clone())
                    .or_insert(row.current_price);
            } else if seeding {
                index.insert(row.id.clone(), records.len());
                records.push(AssetRecord::seed(row, &currency));
            } else {
                debug!(
                    "Dropping asset {} absent from the {} listing",
                    row.id, currencies[0]
                );
            }
        }
    }

    for record in &mut records {
        for currency in &currencies {
            record.current_price.entry(currency.clone()).or_insert(None);
        }
    }

    records
}

/// Serves multi-currency listing requests from single-currency upstream calls
pub struct CurrencyFanoutMerger {
    upstream: Arc<UpstreamClient>,
    strategy: MergeStrategy,
}

impl CurrencyFanoutMerger {
    pub const fn new(upstream: Arc<UpstreamClient>, strategy: MergeStrategy) -> Self {
        Self { upstream, strategy }
    }

    /// Fetch `currencies` concurrently and merge them.
    ///
    /// `forwarded` is sent unchanged with every call. Any failing call fails
    /// the whole operation.
    pub async fn fetch_merged(
        &self,
        currencies: &[String],
        forwarded: &[(String, String)],
    ) -> ProxyResult<Vec<AssetRecord>> {
        info!(
            "Fanning out market listing over {} currencies: {}",
            currencies.len(),
            currencies.join(",")
        );

        let calls = currencies.iter().map(|currency| {
            let spec = UpstreamRequestSpec::new(MARKETS_PATH)
                .param(CURRENCY_PARAM, currency.as_str())
                .params(forwarded.iter().cloned());
            async move {
                let rows = self.upstream.fetch_markets(&spec).await?;
                Ok::<_, ProxyError>((currency.clone(), rows))
            }
        });

        // try_join_all yields results in input order whatever the completion order
        let listings = try_join_all(calls).await?;
        Ok(merge_listings(listings, self.strategy))
    }
}
