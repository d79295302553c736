//! khqr CLI entry point.

mod cli;

use bakong_khqr::khqr::{decode, KhqrPayload};
use bakong_khqr::monitor::{LoggingHooks, MonitorBuilder, SessionOutcome};
use bakong_khqr::{AppConfig, StatusClient};
use clap::Parser;
use cli::{Cli, Command, EncodeArgs};
use color_eyre::eyre::{bail, eyre};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Logs go to stderr so stdout stays clean for payloads and JSON
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("khqr v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Encode(args) => encode(&config, args, cli.json),
        Command::Decode { raw } => decode_payload(raw, cli.json),
        Command::Check { hash } => {
            let client = StatusClient::from_config(&config.settlement)?;
            let record = client.check_status(hash).await?;
            print_json(&record)
        }
        Command::CheckBulk { hashes } => {
            let client = StatusClient::from_config(&config.settlement)?;
            let monitor = MonitorBuilder::new(client, Arc::new(LoggingHooks))
                .app_config(&config)
                .build();
            let results = monitor.verify_bulk(hashes).await?;
            let ordered: Vec<_> = hashes.iter().filter_map(|h| results.get(h)).collect();
            if ordered.len() < hashes.len() {
                warn!(
                    "{} of {} hashes could not be checked",
                    hashes.len() - ordered.len(),
                    hashes.len()
                );
            }
            print_json(&ordered)
        }
        Command::Watch { hash, .. } => watch(&config, hash).await,
    }
}

fn encode(config: &AppConfig, args: &EncodeArgs, json: bool) -> color_eyre::Result<()> {
    let request =
        config
            .merchant
            .payment_request(args.currency, args.amount, args.bill_number.clone());
    let payload = KhqrPayload::encode(&request)?;

    if json {
        print_json(&serde_json::json!({
            "raw": payload.raw(),
            "md5": payload.md5_hash(),
        }))
    } else {
        println!("{}", payload.raw());
        println!("md5: {}", payload.md5_hash());
        Ok(())
    }
}

fn decode_payload(raw: &str, json: bool) -> color_eyre::Result<()> {
    let decoded = decode(raw)?;
    let fields = serde_json::json!({
        "dynamic": decoded.dynamic,
        "merchantId": decoded.merchant_id,
        "phoneNumber": decoded.phone_number,
        "merchantName": decoded.merchant_name,
        "merchantCity": decoded.merchant_city,
        "currency": decoded.currency,
        "amount": decoded.amount.map(|a| a.to_string()),
        "billNumber": decoded.bill_number,
        "storeLabel": decoded.store_label,
        "terminalLabel": decoded.terminal_label,
        "checksum": decoded.checksum,
    });

    if json {
        return print_json(&fields);
    }
    if let Some(map) = fields.as_object() {
        for (key, value) in map {
            match value {
                serde_json::Value::Null => {}
                serde_json::Value::String(s) => println!("{key}: {s}"),
                other => println!("{key}: {other}"),
            }
        }
    }
    Ok(())
}

async fn watch(config: &AppConfig, hash: &str) -> color_eyre::Result<()> {
    let client = StatusClient::from_config(&config.settlement)?;
    let monitor = MonitorBuilder::new(client, Arc::new(LoggingHooks))
        .app_config(config)
        .build();
    let mut ticket = monitor.monitor(hash)?;

    let settled = tokio::select! {
        outcome = ticket.wait() => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match settled {
        Some(outcome) => outcome,
        None => {
            info!("Ctrl-C received, stopping");
            monitor.shutdown().await;
            ticket.wait().await
        }
    };

    match outcome {
        SessionOutcome::Confirmed(record) => print_json(&record),
        SessionOutcome::Expired { reason, .. } => {
            println!("{hash}: {} ({reason})", ticket.payer_status());
            Ok(())
        }
        SessionOutcome::Aborted { reason } => bail!("Polling aborted: {reason}"),
        SessionOutcome::Cancelled => Err(eyre!("Watch cancelled before {hash} settled")),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
