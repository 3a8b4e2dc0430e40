use crate::config::toml_config::ScanSettings;
use crate::domain::model::{
    CustomerQuery, MatchStrategy, OrderFilter, RemoteOrder, Resolution, ResolutionCandidate,
};
use crate::domain::ports::OrderSearch;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::normalize::{clean_identifier, compact, reference_matches};
use chrono::Utc;
use std::collections::HashSet;

pub const GET_ORDER: &str = "GetOrder";

/// 解析訂單時需要的輸出欄位
pub const ORDER_OUTPUT: &[&str] = &[
    "OrderID",
    "PurchaseOrderNumber",
    "SalesChannel",
    "OrderStatus",
    "DatePlaced",
    "BillFirstName",
    "BillLastName",
    "Username",
    "Email",
    "OrderLine",
    "OrderLine.ProductName",
    "OrderLine.Quantity",
    "OrderLine.ExternalSystemIdentifier",
    "OrderLine.ExternalOrderReference",
    "OrderLine.ExternalOrderLineReference",
    "OrderLine.eBay.eBayTransactionID",
    "OrderLine.eBay.eBayAuctionID",
    "OrderLine.eBay.eBayUsername",
];

const DATE_FILTER_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Finds the remote order behind a user-typed reference.
///
/// Strategies run cheapest first and stop at the first hit:
/// 1. `Last, First` names go to the customer lookup.
/// 2. Exact purchase-order number, then exact order id.
/// 3. A bounded, channel-filtered scan of recent orders, matching line references.
///
/// The resolver never retries; transport failures surface to the caller,
/// except for the single unfiltered fallback inside the scan.
pub struct OrderResolver<S: OrderSearch> {
    search: S,
    settings: ScanSettings,
}

impl<S: OrderSearch> OrderResolver<S> {
    pub fn new(search: S, settings: ScanSettings) -> Self {
        Self { search, settings }
    }

    pub fn search(&self) -> &S {
        &self.search
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub async fn resolve(&self, identifier: &str) -> Result<Resolution> {
        let target = clean_identifier(identifier);
        if target.is_empty() {
            return Err(ReconcileError::validation("An order reference is required"));
        }

        if target.contains(',') {
            let query = CustomerQuery::from_last_first(&target).ok_or_else(|| {
                ReconcileError::validation(format!(
                    "'{}' looks like a name; write it as 'Last, First'",
                    target
                ))
            })?;
            return self
                .find_customer_candidates(&query)
                .await?
                .into_iter()
                .next()
                .map(Resolution::from)
                .ok_or_else(|| self.not_found(&target));
        }

        if let Some(candidate) = self.direct_lookup(&target).await? {
            return Ok(candidate.into());
        }

        if let Some(candidate) = self.scan_recent_orders(&target).await? {
            return Ok(candidate.into());
        }

        Err(self.not_found(&target))
    }

    /// Resolves a `;`- or newline-separated batch. Blank or duplicate entries
    /// reject the whole batch before any remote call.
    pub async fn resolve_many(&self, batch: &str) -> Result<Vec<(String, Result<Resolution>)>> {
        let references = split_batch(batch)?;
        let mut outcomes = Vec::with_capacity(references.len());
        for reference in references {
            let outcome = self.resolve(&reference).await;
            outcomes.push((reference, outcome));
        }
        Ok(outcomes)
    }

    /// Orders for a customer, deduplicated by order id and limited to the
    /// allow-listed statuses.
    pub async fn find_customer_orders(&self, query: &CustomerQuery) -> Result<Vec<RemoteOrder>> {
        Ok(self
            .find_customer_candidates(query)
            .await?
            .into_iter()
            .map(|candidate| candidate.order)
            .collect())
    }

    async fn find_customer_candidates(
        &self,
        query: &CustomerQuery,
    ) -> Result<Vec<ResolutionCandidate>> {
        if query.is_empty() {
            return Err(ReconcileError::validation(
                "A customer lookup needs a name or a username",
            ));
        }

        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let mut lookups: Vec<(OrderFilter, MatchStrategy)> = Vec::new();
        let first = present(&query.first_name);
        let last = present(&query.last_name);
        if first.is_some() || last.is_some() {
            let mut filter = OrderFilter::new();
            if let Some(first) = first {
                filter = filter.with("BillFirstName", first);
            }
            if let Some(last) = last {
                filter = filter.with("BillLastName", last);
            }
            lookups.push((filter, MatchStrategy::CustomerName));
        }
        if let Some(username) = present(&query.username) {
            lookups.push((
                OrderFilter::new().with("Username", username.clone()),
                MatchStrategy::ChannelUsername,
            ));
            lookups.push((
                OrderFilter::new().with("eBayUsername", username),
                MatchStrategy::MarketplaceUsername,
            ));
        }

        let mut candidates = Vec::new();
        for (filter, strategy) in lookups {
            let orders = self
                .search
                .search(GET_ORDER, &filter.output(ORDER_OUTPUT), None)
                .await?;
            tracing::debug!("👤 {:?} lookup returned {} orders", strategy, orders.len());
            candidates.extend(
                orders
                    .into_iter()
                    .map(|order| ResolutionCandidate { order, strategy }),
            );
        }

        let allowed = &self.settings.allowed_statuses;
        let candidates: Vec<ResolutionCandidate> = dedupe_candidates(candidates)
            .into_iter()
            .filter(|c| c.order.status_is_one_of(allowed))
            .collect();

        tracing::info!("👤 Customer lookup matched {} orders", candidates.len());
        Ok(candidates)
    }

    async fn direct_lookup(&self, target: &str) -> Result<Option<ResolutionCandidate>> {
        let strategies = [
            ("PurchaseOrderNumber", MatchStrategy::PurchaseOrderNumber),
            ("OrderID", MatchStrategy::OrderId),
        ];

        for (field, strategy) in strategies {
            let filter = OrderFilter::new().with(field, target).output(ORDER_OUTPUT);
            let orders = self.search.search(GET_ORDER, &filter, None).await?;

            // 直接條件由遠端比對，回傳的第一筆即為結果
            let hit = orders.into_iter().next();

            if let Some(order) = hit {
                tracing::info!("✅ '{}' matched order {} by {}", target, order.order_id, field);
                return Ok(Some(ResolutionCandidate { order, strategy }));
            }
        }
        Ok(None)
    }

    async fn scan_recent_orders(&self, target: &str) -> Result<Option<ResolutionCandidate>> {
        let settings = &self.settings;
        let since = (Utc::now() - chrono::Duration::days(settings.window_days))
            .format(DATE_FILTER_FORMAT)
            .to_string();
        let mut channel_filtered = true;

        tracing::info!(
            "🔎 Scanning up to {} pages of {} orders since {} for '{}'",
            settings.max_pages,
            settings.page_size,
            since,
            target
        );

        for page in 0..settings.max_pages {
            let base = OrderFilter::new()
                .with_scalar("DatePlacedFrom", since.clone())
                .output(ORDER_OUTPUT)
                .page(page, settings.page_size);

            let mut orders = if channel_filtered {
                let filtered = base
                    .clone()
                    .with("SalesChannel", settings.priority_channel.clone());
                match self
                    .search
                    .search(GET_ORDER, &filtered, Some(settings.timeout))
                    .await
                {
                    Ok(orders) => orders,
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(
                            "⚠️ Channel-filtered scan failed on page {} ({}); retrying unfiltered",
                            page,
                            e
                        );
                        channel_filtered = false;
                        self.search
                            .search(GET_ORDER, &base, Some(settings.timeout))
                            .await?
                    }
                    Err(e) => return Err(e),
                }
            } else {
                self.search
                    .search(GET_ORDER, &base, Some(settings.timeout))
                    .await?
            };

            let fetched = orders.len();
            prioritise_channel(&mut orders, &settings.priority_channel);

            if let Some(order) = find_by_line_reference(orders, target) {
                let strategy = if channel_filtered {
                    MatchStrategy::ReferenceScan
                } else {
                    MatchStrategy::UnfilteredReferenceScan
                };
                tracing::info!(
                    "✅ '{}' matched a line reference on order {} (page {})",
                    target,
                    order.order_id,
                    page
                );
                return Ok(Some(ResolutionCandidate { order, strategy }));
            }

            if fetched < settings.page_size {
                tracing::debug!("Scan reached the last page ({} orders)", fetched);
                break;
            }
        }

        Ok(None)
    }

    fn not_found(&self, target: &str) -> ReconcileError {
        ReconcileError::NotFound {
            message: format!("No order matched '{}'", target),
            hint: Some(format!(
                "Search by order number (e.g. N12345), purchase-order number, an eBay order or \
                 line reference (e.g. 22-12345-67890), or a customer name as 'Last, First'. \
                 Marketplace references are only searched among orders placed in the last {} days.",
                self.settings.window_days
            )),
        }
    }
}

/// 依 order id 去重，保留第一次出現的候選；order id 空白的候選直接丟棄
pub fn dedupe_candidates(candidates: Vec<ResolutionCandidate>) -> Vec<ResolutionCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| {
            let id = c.order.order_id.trim();
            !id.is_empty() && seen.insert(id.to_string())
        })
        .collect()
}

/// Stable sort putting orders from `channel` first.
pub fn prioritise_channel(orders: &mut [RemoteOrder], channel: &str) {
    orders.sort_by_key(|order| !order.is_on_channel(channel));
}

pub fn find_by_line_reference(orders: Vec<RemoteOrder>, target: &str) -> Option<RemoteOrder> {
    orders.into_iter().find(|order| {
        order
            .lines
            .iter()
            .any(|line| line.reference_values().any(|value| reference_matches(value, target)))
    })
}

fn split_batch(batch: &str) -> Result<Vec<String>> {
    let entries: Vec<String> = batch
        .split(|c: char| c == ';' || c == '\n')
        .map(clean_identifier)
        .collect();

    if entries.iter().all(|e| e.is_empty()) {
        return Err(ReconcileError::validation("No order references supplied"));
    }

    let mut seen = HashSet::new();
    for (position, entry) in entries.iter().enumerate() {
        if entry.is_empty() {
            return Err(ReconcileError::validation(format!(
                "Entry {} of the batch is blank",
                position + 1
            )));
        }
        if !seen.insert(compact(entry)) {
            return Err(ReconcileError::validation(format!(
                "'{}' appears more than once in the batch",
                entry
            )));
        }
    }
    Ok(entries)
}
