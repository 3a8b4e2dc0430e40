use crate::adapters::{OrderClient, SheetsClient};
use crate::config::toml_config::{AppConfig, ScanSettings, TableSpec};
use crate::core::listing::list_records;
use crate::core::resolver::OrderResolver;
use crate::core::store::RecordStore;
use crate::domain::model::{
    AppendOutcome, CapacityReport, CustomerQuery, ListPage, ListQuery, RemoteOrder, Resolution,
    ResortOutcome, UpdateOutcome,
};
use crate::domain::ports::{OrderSearch, SheetBackend};
use crate::utils::a1;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::Validate;
use std::collections::BTreeMap;
use std::time::Duration;

/// Entry point for every workflow: order resolution plus the keyed table store.
///
/// Tables are addressed by their configured id (`[tables.<id>]`).
pub struct ReconcileService<O: OrderSearch, B: SheetBackend> {
    resolver: OrderResolver<O>,
    store: RecordStore<B>,
    tables: BTreeMap<String, TableSpec>,
}

impl ReconcileService<OrderClient, SheetsClient> {
    /// 依配置建立使用 HTTP adapters 的服務
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            OrderClient::new(&config.orders),
            config.orders.scan_settings(),
            SheetsClient::new(&config.sheets),
            config.sheets.cache_ttl(),
            config.tables.clone(),
        ))
    }
}

impl<O: OrderSearch, B: SheetBackend> ReconcileService<O, B> {
    pub fn new(
        orders: O,
        scan: ScanSettings,
        backend: B,
        cache_ttl: Duration,
        tables: BTreeMap<String, TableSpec>,
    ) -> Self {
        Self {
            resolver: OrderResolver::new(orders, scan),
            store: RecordStore::new(backend, cache_ttl),
            tables,
        }
    }

    pub fn resolver(&self) -> &OrderResolver<O> {
        &self.resolver
    }

    pub fn store(&self) -> &RecordStore<B> {
        &self.store
    }

    fn table(&self, id: &str) -> Result<&TableSpec> {
        self.tables.get(id).ok_or_else(|| {
            ReconcileError::validation(format!(
                "Unknown table '{}'. Configured tables: {}",
                id,
                self.tables.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// 已設定的表格 id 與對應的工作表名稱
    pub fn tables(&self) -> Vec<(&str, &TableSpec)> {
        self.tables
            .iter()
            .map(|(id, spec)| (id.as_str(), spec))
            .collect()
    }

    pub async fn resolve(&self, reference: &str) -> Result<Resolution> {
        self.resolver.resolve(reference).await
    }

    pub async fn resolve_many(&self, batch: &str) -> Result<Vec<(String, Result<Resolution>)>> {
        self.resolver.resolve_many(batch).await
    }

    pub async fn resolve_customer(&self, query: &CustomerQuery) -> Result<Vec<RemoteOrder>> {
        let orders = self.resolver.find_customer_orders(query).await?;
        if orders.is_empty() {
            return Err(ReconcileError::NotFound {
                message: "No open orders for that customer".to_string(),
                hint: Some(
                    "Check the spelling of the billing name, or search by username instead"
                        .to_string(),
                ),
            });
        }
        Ok(orders)
    }

    pub async fn list(&self, table_id: &str, query: &ListQuery) -> Result<ListPage> {
        let table = self.table(table_id)?;
        let snapshot = self.store.read_table(table).await?;
        list_records(&snapshot, table, query)
    }

    /// Updates one field of the first row whose key column matches `key`.
    pub async fn update_by_key(
        &self,
        table_id: &str,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<UpdateOutcome> {
        let table = self.table(table_id)?;
        if key.trim().is_empty() {
            return Err(ReconcileError::validation("A record key is required"));
        }
        let column = table.column_for_field(field)?;

        match self.store.update_by_key(table, key, &column, value).await? {
            Some(row_number) => Ok(UpdateOutcome {
                success: true,
                row_number,
            }),
            None => Err(ReconcileError::NotFound {
                message: format!("No record in '{}' has key '{}'", table.sheet, key),
                hint: Some(format!(
                    "Keys are matched against column {} of '{}'",
                    table.key_column, table.sheet
                )),
            }),
        }
    }

    pub async fn append(&self, table_id: &str, row: Vec<String>) -> Result<AppendOutcome> {
        let table = self.table(table_id)?;
        let updated_range = self.store.append_row(table, row).await?;
        Ok(AppendOutcome {
            success: true,
            updated_range,
        })
    }

    /// Appends a row given as `field -> value`; missing fields are left blank.
    pub async fn append_fields(
        &self,
        table_id: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<AppendOutcome> {
        let table = self.table(table_id)?;
        let first = a1::column_index(table.first_column())?;

        let mut row: Vec<String> = Vec::new();
        for (field, value) in fields {
            let offset = a1::column_index(&table.column_for_field(field)?)? - first;
            if row.len() <= offset {
                row.resize(offset + 1, String::new());
            }
            row[offset] = value.clone();
        }
        self.append(table_id, row).await
    }

    pub async fn resort(&self, table_id: &str) -> Result<ResortOutcome> {
        let table = self.table(table_id)?;
        let rows_sorted = self.store.resort_table(table).await?;
        Ok(ResortOutcome { rows_sorted })
    }

    pub async fn capacity(&self, table_id: &str) -> Result<CapacityReport> {
        let table = self.table(table_id)?;
        self.store.capacity_report(table).await
    }

    pub async fn expand(&self, table_id: &str, additional_rows: usize) -> Result<CapacityReport> {
        let table = self.table(table_id)?;
        self.store.expand_capacity(table, additional_rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{filter_is, returns_table, row, FakeOrders, MemorySheet};
    use crate::domain::model::MatchStrategy;

    fn service(grid: Vec<Vec<String>>) -> ReconcileService<FakeOrders, MemorySheet> {
        let sheet = MemorySheet::new();
        sheet.put_grid("Returns", grid);
        sheet.set_row_count("Returns", 100);

        let orders = FakeOrders::new(|filter| {
            if filter_is(filter, "OrderID", "N100") {
                Ok(vec![RemoteOrder {
                    order_id: "N100".to_string(),
                    order_status: Some("Dispatched".to_string()),
                    ..Default::default()
                }])
            } else {
                Ok(vec![])
            }
        });

        let mut tables = BTreeMap::new();
        tables.insert("returns".to_string(), returns_table());
        ReconcileService::new(
            orders,
            ScanSettings::default(),
            sheet,
            Duration::from_secs(60),
            tables,
        )
    }

    fn grid() -> Vec<Vec<String>> {
        vec![
            row(&["Timestamp", "Name", "Type", "Order", "Reason", "Notes", "Status", "Staff"]),
            row(&["3/2/2024 10:00:00", "Ben", "Return Product", "N100-2", "", "", "Open", ""]),
            row(&["3/1/2024 10:00:00", "Ann", "Return Product", "N100-1", "", "", "Open", ""]),
        ]
    }

    #[tokio::test]
    async fn test_resolve_goes_through_the_resolver() {
        let service = service(grid());

        let resolution = service.resolve("N100").await.unwrap();
        assert_eq!(resolution.strategy, MatchStrategy::OrderId);
    }

    #[tokio::test]
    async fn test_unknown_table_is_a_validation_error() {
        let service = service(grid());

        let result = service.list("pickups", &ListQuery::default()).await;
        match result {
            Err(ReconcileError::ValidationError { message }) => {
                assert!(message.contains("returns"));
            }
            other => panic!("expected ValidationError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_by_field_name() {
        let service = service(grid());

        let outcome = service
            .update_by_key("returns", "1001", "status", "Refunded")
            .await
            .unwrap();

        // DigitsOnly：N100-1 的數字是 1001
        assert_eq!(outcome.row_number, 3);
        assert_eq!(service.store().backend().cell("Returns", 3, 6), "Refunded");
    }

    #[tokio::test]
    async fn test_update_missing_key_is_not_found() {
        let service = service(grid());

        let err = service
            .update_by_key("returns", "777", "Status", "Refunded")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .update_by_key("returns", "1001", "Colour", "Red")
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_append_fields_places_values_by_column() {
        let service = service(grid());
        let mut fields = BTreeMap::new();
        fields.insert("Name".to_string(), "Cy".to_string());
        fields.insert("Order".to_string(), "N200".to_string());
        fields.insert("Type".to_string(), "Return Product".to_string());

        let outcome = service.append_fields("returns", &fields).await.unwrap();

        assert!(outcome.success);
        let sheet = service.store().backend();
        assert_eq!(sheet.cell("Returns", 4, 1), "Cy");
        assert_eq!(sheet.cell("Returns", 4, 3), "N200");
        assert_eq!(sheet.cell("Returns", 4, 0), "");
    }

    #[tokio::test]
    async fn test_resort_keeps_listing_newest_first() {
        let service = service(grid());

        let outcome = service.resort("returns").await.unwrap();
        assert_eq!(outcome.rows_sorted, 2);

        let page = service.list("returns", &ListQuery::default()).await.unwrap();
        // 最新的一列排第一
        assert_eq!(page.items[0].fields["Name"], "Ben");
        assert_eq!(page.items[1].fields["Name"], "Ann");
    }

    #[tokio::test]
    async fn test_capacity_and_expand() {
        let service = service(grid());

        let report = service.capacity("returns").await.unwrap();
        assert_eq!(report.used_rows, 3);
        assert_eq!(report.total_rows, 100);
        assert_eq!(report.available_pct, 97.0);

        let expanded = service.expand("returns", 50).await.unwrap();
        assert_eq!(expanded.total_rows, 150);

        let unchanged = service.expand("returns", 0).await.unwrap();
        assert_eq!(unchanged.total_rows, 150);
        assert_eq!(service.store().backend().count_calls("set-rows"), 1);
    }

    #[tokio::test]
    async fn test_customer_without_orders_is_not_found() {
        let service = service(grid());
        let query = CustomerQuery {
            username: Some("nobody".to_string()),
            ..Default::default()
        };

        let err = service.resolve_customer(&query).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
