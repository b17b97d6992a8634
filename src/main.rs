use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::Parser;
use serde_json::{Map, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tablegate::app::{build_router, AppState};
use tablegate::client::settings::ClientSettings;
use tablegate::client::TableClient;
use tablegate::config::{self, Config};
use tablegate::ledger::entries::{self, FormulaInput, PurchaseInput, SaleInput};
use tablegate::ledger::pricing::MaterialLine;
use tablegate::ledger::stats::{ProfitStats, StatsRange};
use tablegate::ledger::{self, Ledger};
use tablegate::models::table::{fields, TableKind};

mod cli;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Export spans over OTLP only when a collector is configured.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "tablegate"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let (fmt_plain, fmt_json) = if json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "tablegate=debug,tower_http=debug".into()),
        ))
        .with(fmt_plain)
        .with(fmt_json)
        .with(telemetry_layer)
        .init();

    let args = cli::Cli::parse();

    match args.command {
        Some(cli::Commands::Serve { port }) => {
            let mut cfg = config::load()?;
            if let Some(port) = port {
                cfg.port = port;
            }
            run_server(cfg).await
        }
        None => run_server(config::load()?).await,
        Some(cli::Commands::Settings { command }) => handle_settings_command(&args.settings, command),
        Some(cli::Commands::Setup) => handle_setup(&args.proxy_url, &args.settings).await,
        Some(command) => run_client(&args.proxy_url, &args.settings, command).await,
    }
}

async fn run_server(cfg: Config) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let prefix = cfg.route_prefix.clone();
    let upstream = cfg.upstream_origin.clone();

    let state = Arc::new(AppState::new(cfg)?);
    if !state.credentials.has_credentials() {
        tracing::warn!("FEISHU_APP_ID/FEISHU_APP_SECRET not set, requests are forwarded without a tenant token");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Proxy listening on {} ({} -> {})", addr, prefix, upstream);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

fn handle_settings_command(path: &Path, cmd: cli::SettingsCommands) -> anyhow::Result<()> {
    let mut settings = ClientSettings::load(path)?;
    match cmd {
        cli::SettingsCommands::Show => {
            let secret = if settings.app_secret.is_empty() { "" } else { "********" };
            println!("Settings file: {}", path.display());
            println!("  App ID:       {}", settings.app_id);
            println!("  App Secret:   {}", secret);
            println!("  Sheet token:  {}", settings.sheet_token);
            for kind in TableKind::ALL {
                println!(
                    "  {:<13} {}",
                    format!("{} table:", kind),
                    settings.table_id(kind).unwrap_or("(not set up)")
                );
            }
        }
        cli::SettingsCommands::Set {
            app_id,
            app_secret,
            sheet_token,
        } => {
            settings.set_credentials(&app_id, &app_secret, &sheet_token)?;
            settings.save(path)?;
            println!("Settings saved to {}", path.display());
        }
    }
    Ok(())
}

async fn handle_setup(proxy_url: &str, path: &Path) -> anyhow::Result<()> {
    let settings = ClientSettings::load(path)?;
    let mut client = TableClient::new(proxy_url, settings)?;
    let report = client.setup().await?;
    client.settings().save(path)?;

    for kind in report.existing {
        println!("Found   {} ({})", kind.display_name(), kind);
    }
    for kind in report.created {
        println!("Created {} ({})", kind.display_name(), kind);
    }
    println!("Table ids saved to {}", path.display());
    Ok(())
}

async fn run_client(proxy_url: &str, path: &Path, cmd: cli::Commands) -> anyhow::Result<()> {
    let settings = ClientSettings::load(path)?;
    let client = TableClient::new(proxy_url, settings)?;
    if client.settings().has_tables() {
        if let Err(e) = client.refresh_field_maps().await {
            tracing::warn!("Failed to load field maps, sending field names as-is: {}", e);
        }
    }
    handle_client_command(&client, cmd).await
}

async fn handle_client_command(client: &TableClient, cmd: cli::Commands) -> anyhow::Result<()> {
    match cmd {
        cli::Commands::Records { command } => handle_record_command(client, command).await?,
        cli::Commands::Purchase {
            material,
            spec,
            quantity,
            unit,
            total,
            date,
            supplier,
        } => {
            let fields = entries::purchase_fields(&PurchaseInput {
                material,
                spec,
                quantity,
                unit,
                total_price: total,
                date: ledger::date_to_millis(&date)?,
                supplier,
            })?;
            let record = client.create(TableKind::Purchase, fields).await?;
            println!("Purchase recorded: {}", record.id);
        }
        cli::Commands::Formula {
            product,
            quantity,
            materials,
            packaging,
            utility,
        } => {
            let mut book = Ledger::default();
            book.reload(client).await?;
            let prices = book.material_prices();

            let mut lines = Vec::with_capacity(materials.len());
            for pair in &materials {
                let (name, amount) = split_pair(pair)?;
                let amount: f64 = amount
                    .parse()
                    .with_context(|| format!("invalid amount for material '{}'", name))?;
                let known = prices
                    .get(name)
                    .with_context(|| format!("no purchase recorded for material '{}'", name))?;
                lines.push(MaterialLine {
                    name: name.to_string(),
                    amount,
                    unit: known.unit.clone(),
                    price: known.price,
                });
            }

            let fields = entries::formula_fields(&FormulaInput {
                product,
                quantity,
                materials: lines,
                packaging_cost: packaging,
                utility_cost: utility,
            })?;
            let record = client.create(TableKind::Formula, fields).await?;
            println!("Formula recorded: {}", record.id);
        }
        cli::Commands::Sale {
            date,
            product,
            quantity,
            amount,
        } => {
            let mut book = Ledger::default();
            book.reload(client).await?;
            let unit_cost = book
                .unit_cost(&product)
                .with_context(|| format!("no formula recorded for product '{}'", product))?;

            let fields = entries::sale_fields(&SaleInput {
                date: ledger::date_to_millis(&date)?,
                product,
                quantity,
                total_amount: amount,
                unit_cost,
            })?;
            let record = client.create(TableKind::Sales, fields).await?;
            println!("Sale recorded: {}", record.id);
        }
        cli::Commands::Materials => {
            let mut book = Ledger::default();
            book.reload(client).await?;
            let prices = book.material_prices();
            if prices.is_empty() {
                println!("No purchases recorded.");
            }
            for (name, price) in prices {
                println!("{:<20} {:>10.2} / {}", name, price.price, price.unit);
            }
        }
        cli::Commands::Sales { limit } => {
            let mut book = Ledger::default();
            book.reload(client).await?;
            let sales = book.sales_by_date_desc();
            if sales.is_empty() {
                println!("No sales recorded.");
            }
            for sale in sales.into_iter().take(limit) {
                println!(
                    "{:<10} {:<20} {:>8} {:>12.2} {:>12.2}",
                    ledger::millis_to_date(sale.millis_field(fields::SALE_DATE).unwrap_or(0)),
                    sale.str_field(fields::PRODUCT_NAME).unwrap_or_default(),
                    sale.num_field(fields::SALE_QUANTITY),
                    sale.num_field(fields::SALE_TOTAL),
                    sale.num_field(fields::PROFIT),
                );
            }
        }
        cli::Commands::Stats { range, from, to } => {
            let range = parse_range(range, from.as_deref(), to.as_deref())?;
            let mut book = Ledger::default();
            book.reload(client).await?;
            print_stats(&ProfitStats::compute(&book.sales, range, Local::now()));
        }
        cli::Commands::Serve { .. } | cli::Commands::Settings { .. } | cli::Commands::Setup => {
            anyhow::bail!("command does not run against the table client")
        }
    }
    Ok(())
}

async fn handle_record_command(client: &TableClient, cmd: cli::RecordCommands) -> anyhow::Result<()> {
    match cmd {
        cli::RecordCommands::List { table } => {
            let records = client.list(table).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        cli::RecordCommands::Create { table, fields } => {
            let record = client.create(table, parse_fields(&fields)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        cli::RecordCommands::Update { table, id, fields } => {
            let record = client.update(table, &id, parse_fields(&fields)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        cli::RecordCommands::Delete { table, id } => {
            client.delete(table, &id).await?;
            println!("Deleted {} from {}", id, table);
        }
    }
    Ok(())
}

fn split_pair(pair: &str) -> anyhow::Result<(&str, &str)> {
    pair.split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .with_context(|| format!("expected name=value, got '{}'", pair))
}

/// Values that parse as JSON (numbers, booleans) keep that type; anything
/// else is sent as text.
fn parse_fields(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (name, raw) = split_pair(pair)?;
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(v @ (Value::Number(_) | Value::Bool(_))) => v,
            _ => Value::String(raw.to_string()),
        };
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

fn parse_range(range: cli::RangeArg, from: Option<&str>, to: Option<&str>) -> anyhow::Result<StatsRange> {
    Ok(match range {
        cli::RangeArg::Today => StatsRange::Today,
        cli::RangeArg::Week => StatsRange::Week,
        cli::RangeArg::Month => StatsRange::Month,
        cli::RangeArg::Custom => {
            let (Some(from), Some(to)) = (from, to) else {
                anyhow::bail!("--range custom needs both --from and --to");
            };
            let start = NaiveDate::parse_from_str(from, "%Y-%m-%d")
                .with_context(|| format!("invalid --from '{}'", from))?;
            let end = NaiveDate::parse_from_str(to, "%Y-%m-%d")
                .with_context(|| format!("invalid --to '{}'", to))?;
            if end < start {
                anyhow::bail!("--to is before --from");
            }
            StatsRange::Custom { start, end }
        }
    })
}

fn print_stats(stats: &ProfitStats) {
    println!("Sales:   {:>12.2}", stats.total_sales);
    println!("Cost:    {:>12.2}", stats.total_cost);
    println!("Profit:  {:>12.2}", stats.total_profit);
    println!("Margin:  {:>11.2}%", stats.profit_rate);
    if stats.by_product.is_empty() {
        return;
    }
    println!();
    println!("{:<20} {:>8} {:>12} {:>12} {:>8}", "Product", "Qty", "Sales", "Profit", "Margin");
    for (name, p) in &stats.by_product {
        println!(
            "{:<20} {:>8} {:>12.2} {:>12.2} {:>7.2}%",
            name,
            p.quantity,
            p.sales,
            p.profit,
            p.profit_rate()
        );
    }
}
