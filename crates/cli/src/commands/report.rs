//! System report CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, SystemReport};
use crate::output::{color_quality, color_status, format_duration, format_percent, OutputFormat};

/// Row for the resource units table
#[derive(Tabled)]
struct UnitRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Capacity")]
    capacity: u64,
    #[tabled(rename = "Active")]
    active: u64,
    #[tabled(rename = "Quality")]
    quality: String,
}

/// Row for the queue saturation table
#[derive(Tabled)]
struct QueueRow {
    #[tabled(rename = "Topic")]
    topic: String,
    #[tabled(rename = "Saturation")]
    saturation: String,
}

/// Show the aggregated system report
pub async fn show_report(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: SystemReport = client.get("api/v1/report").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "System Report".bold());
            println!("{}", "=".repeat(60));
            println!("Status:                 {}", color_status(&report.status));
            println!("Health Score:           {:.3}", report.health_score);
            println!(
                "Uptime:                 {}",
                format_duration(report.uptime_secs)
            );
            println!(
                "Generated:              {}",
                format_timestamp(&report.generated_at)
            );
            println!(
                "Snapshot Captured:      {}",
                format_timestamp(&report.snapshot.captured_at)
            );
            println!();

            println!("{}", "Rates".bold());
            println!("{}", "-".repeat(60));
            println!(
                "Task Success:           {}",
                format_percent(report.task_success_rate)
            );
            println!(
                "Event Delivery:         {}",
                format_percent(report.delivery_rate)
            );
            println!(
                "Queue Headroom:         {}",
                format_percent(report.queue_headroom)
            );
            println!("Events/sec:             {:.1}", report.snapshot.events_per_sec);
            println!("Tasks/sec:              {:.1}", report.snapshot.tasks_per_sec);
            println!();

            println!("{}", "Counters".bold());
            println!("{}", "-".repeat(60));
            println!(
                "Events Published:       {}",
                report.snapshot.events_published
            );
            println!("Events Dropped:         {}", report.snapshot.events_dropped);
            println!("Tasks Succeeded:        {}", report.snapshot.tasks_succeeded);
            println!("Tasks Failed:           {}", report.snapshot.tasks_failed);
            println!();

            if !report.snapshot.units.is_empty() {
                println!("{}", "Resource Units".bold());
                println!("{}", "-".repeat(60));
                println!(
                    "Utilization:            {}",
                    format_percent(report.snapshot.pool_utilization)
                );
                println!(
                    "Mean Quality:           {}",
                    color_quality(report.snapshot.mean_quality)
                );

                let rows: Vec<UnitRow> = report
                    .snapshot
                    .units
                    .iter()
                    .map(|unit| UnitRow {
                        unit: unit.id.clone(),
                        capacity: unit.capacity,
                        active: unit.active,
                        quality: color_quality(unit.quality),
                    })
                    .collect();

                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
                println!();
            }

            if !report.snapshot.queue_saturation.is_empty() {
                println!("{}", "Queue Saturation".bold());
                println!("{}", "-".repeat(60));

                let rows: Vec<QueueRow> = report
                    .snapshot
                    .queue_saturation
                    .iter()
                    .map(|(topic, saturation)| QueueRow {
                        topic: topic.clone(),
                        saturation: format_percent(*saturation),
                    })
                    .collect();

                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
                println!();
            }

            if report.issues.is_empty() {
                println!("{}", "No critical issues".green());
            } else {
                println!("{}", "Critical Issues".bold());
                println!("{}", "-".repeat(60));
                for issue in &report.issues {
                    let severity = match issue.severity.as_str() {
                        "high" => issue.severity.red().bold().to_string(),
                        _ => issue.severity.yellow().to_string(),
                    };
                    println!("[{}] {}: {}", severity, issue.component, issue.message);
                    println!("    {}", issue.recommendation.dimmed());
                }
            }
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
