//! Mitigation action CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, MitigationAction};
use crate::output::{color_status, print_info, OutputFormat};

/// Row for the actions table
#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// List recent mitigation actions, newest first
pub async fn list_actions(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/actions?limit={}", limit);
    let result: Vec<MitigationAction> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if result.is_empty() {
                print_info("No mitigation actions recorded yet");
                return Ok(());
            }

            let rows: Vec<ActionRow> = result
                .iter()
                .map(|action| ActionRow {
                    time: format_timestamp(&action.issued_at),
                    kind: action.kind.clone(),
                    target: action.target.clone(),
                    outcome: color_status(&action.outcome),
                    detail: action.detail.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} actions", result.len());
        }
    }

    Ok(())
}

/// Format timestamp for display
fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}
