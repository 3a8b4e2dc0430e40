use anyhow::Context;
use clap::Parser;
use kiosk_reconcile::domain::model::{CustomerQuery, ListPage, ListQuery};
use kiosk_reconcile::utils::error::{ErrorSeverity, ReconcileError};
use kiosk_reconcile::utils::{logger, retry::retry_transient};
use kiosk_reconcile::{AppConfig, Cli, Command, OrderClient, ReconcileService, SheetsClient};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

type Service = ReconcileService<OrderClient, SheetsClient>;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("🚀 Starting kiosk-reconcile");
    tracing::debug!("CLI args: {:?}", cli);

    // 載入 TOML 配置
    let config = match AppConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 驗證配置並建立服務
    let service = match ReconcileService::from_config(&config) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(exit_code(&e));
        }
    };

    if let Err(e) = run(&cli, &service).await {
        match e.downcast_ref::<ReconcileError>() {
            Some(err) => {
                // 記錄詳細錯誤信息
                tracing::error!(
                    "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
                    err,
                    err.category(),
                    err.severity()
                );
                eprintln!("❌ {}", err.user_friendly_message());
                eprintln!("💡 建議: {}", err.recovery_suggestion());
                std::process::exit(exit_code(err));
            }
            None => {
                tracing::error!("❌ Command failed: {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

/// 根據錯誤嚴重程度決定退出碼
fn exit_code(e: &ReconcileError) -> i32 {
    if e.is_not_found() {
        return 4;
    }
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,   // 重試錯誤
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    }
}

async fn run(cli: &Cli, service: &Service) -> anyhow::Result<()> {
    let attempts = cli.retries.saturating_add(1);

    match &cli.command {
        Command::Resolve { reference } => {
            if reference.contains(';') || reference.contains('\n') {
                let outcomes = service.resolve_many(reference).await?;
                let report: Vec<serde_json::Value> = outcomes
                    .into_iter()
                    .map(|(reference, outcome)| match outcome {
                        Ok(resolution) => serde_json::json!({
                            "reference": reference,
                            "resolution": resolution,
                        }),
                        Err(e) => serde_json::json!({
                            "reference": reference,
                            "error": e.user_friendly_message(),
                        }),
                    })
                    .collect();
                print_json(&report)?;
            } else {
                let resolution =
                    retry_transient(attempts, RETRY_BASE_DELAY, || service.resolve(reference))
                        .await?;
                print_json(&resolution)?;
            }
        }
        Command::Customer {
            first,
            last,
            username,
        } => {
            let query = CustomerQuery {
                first_name: first.clone(),
                last_name: last.clone(),
                username: username.clone(),
            };
            let orders =
                retry_transient(attempts, RETRY_BASE_DELAY, || service.resolve_customer(&query))
                    .await?;
            print_json(&orders)?;
        }
        Command::List {
            table,
            status,
            q,
            page,
            page_size,
            csv,
        } => {
            let query = ListQuery {
                status: status.clone(),
                q: q.clone(),
                page: *page,
                page_size: *page_size,
            };
            let listed =
                retry_transient(attempts, RETRY_BASE_DELAY, || service.list(table, &query)).await?;
            if *csv {
                let spec = config_columns(service, table);
                write_csv(&listed, &spec)?;
            } else {
                print_json(&listed)?;
            }
        }
        Command::Update {
            table,
            key,
            field,
            value,
        } => {
            let outcome = retry_transient(attempts, RETRY_BASE_DELAY, || {
                service.update_by_key(table, key, field, value)
            })
            .await?;
            print_json(&outcome)?;
        }
        Command::Append { table, fields } => {
            let fields: BTreeMap<String, String> = fields.iter().cloned().collect();
            // 新增不重試：失敗後重送可能產生重複列
            let outcome = service.append_fields(table, &fields).await?;
            print_json(&outcome)?;
        }
        Command::Resort { table } => {
            let outcome = service.resort(table).await?;
            print_json(&outcome)?;
        }
        Command::Capacity { table } => {
            let report =
                retry_transient(attempts, RETRY_BASE_DELAY, || service.capacity(table)).await?;
            print_json(&report)?;
        }
        Command::Expand { table, rows } => {
            let report = service.expand(table, *rows).await?;
            print_json(&report)?;
        }
        Command::Tables => {
            let tables: Vec<serde_json::Value> = service
                .tables()
                .into_iter()
                .map(|(id, spec)| {
                    serde_json::json!({
                        "id": id,
                        "sheet": spec.sheet,
                        "range": spec.full_range(),
                        "key_column": spec.key_column,
                    })
                })
                .collect();
            print_json(&tables)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing command output")?;
    println!("{}", text);
    Ok(())
}

fn config_columns(service: &Service, table: &str) -> Vec<String> {
    service
        .tables()
        .into_iter()
        .find(|(id, _)| *id == table)
        .map(|(_, spec)| spec.columns.clone())
        .unwrap_or_default()
}

/// 以 CSV 輸出列表，第一欄是試算表列號
fn write_csv(page: &ListPage, columns: &[String]) -> kiosk_reconcile::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());

    let mut header = vec!["row".to_string()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for item in &page.items {
        let mut record = vec![item.row_number.to_string()];
        record.extend(columns.iter().map(|name| {
            item.fields
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        }));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    tracing::info!(
        "📄 Wrote {} of {} records (page {}/{})",
        page.items.len(),
        page.total,
        page.page,
        page.total_pages
    );
    Ok(())
}
