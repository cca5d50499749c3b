//! Daemon status CLI commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_error, print_info, OutputFormat};

/// Combined view rendered by `overseer status`
#[derive(Serialize)]
struct StatusView {
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    health: HealthResponse,
}

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show daemon health and readiness
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = match client.get("healthz").await {
        Ok(health) => health,
        Err(err) => {
            print_error("Daemon is unreachable or reported itself unhealthy");
            print_info("Check that overseerd is running and --api-url points at it");
            return Err(err);
        }
    };

    // /readyz answers 503 while the orchestrator is starting or unhealthy,
    // which the client surfaces as an error. Treat that as not ready.
    let (ready, reason) = match client.get::<ReadinessResponse>("readyz").await {
        Ok(readiness) => (readiness.ready, readiness.reason),
        Err(_) => (false, Some("Daemon reported not ready".to_string())),
    };

    match format {
        OutputFormat::Json => {
            let view = StatusView {
                ready,
                reason,
                health,
            };
            let json = serde_json::to_string_pretty(&view)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Daemon Status".bold());
            println!("{}", "=".repeat(50));
            println!("Overall:                {}", color_status(&health.status));
            println!(
                "Ready:                  {}",
                if ready {
                    "yes".green().to_string()
                } else {
                    "no".red().to_string()
                }
            );
            if let Some(reason) = &reason {
                println!("Reason:                 {}", reason.yellow());
            }
            println!();

            if health.components.is_empty() {
                print_info("No components registered yet");
                return Ok(());
            }

            let mut names: Vec<_> = health.components.keys().cloned().collect();
            names.sort();

            let rows: Vec<ComponentRow> = names
                .iter()
                .map(|name| {
                    let component = &health.components[name];
                    ComponentRow {
                        component: name.clone(),
                        status: color_status(&component.status),
                        message: component.message.clone().unwrap_or_default(),
                        last_check: format_epoch(component.last_check_timestamp),
                    }
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Format an epoch-seconds timestamp for display
fn format_epoch(ts: i64) -> String {
    match chrono::DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}
