//! Event publishing and task submission commands

use anyhow::{Context, Result};
use colored::Colorize;

use crate::client::{ApiClient, PublishResponse, SubmitRequest, TaskResult};
use crate::output::{color_status, print_success, print_warning, OutputFormat};

/// Publish a telemetry event to a topic
pub async fn publish_event(
    client: &ApiClient,
    topic: &str,
    payload: &str,
    format: OutputFormat,
) -> Result<()> {
    let payload: serde_json::Value =
        serde_json::from_str(payload).context("Payload is not valid JSON")?;

    let path = format!("api/v1/events/{}", topic);
    let response: PublishResponse = client.post(&path, &payload).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if response.accepted {
                print_success(&format!("Event accepted on topic '{}'", response.topic));
            } else {
                print_warning(&format!("Event refused on topic '{}'", response.topic));
            }
        }
    }

    Ok(())
}

/// Submit a task and wait for its result
pub async fn submit_task(
    client: &ApiClient,
    kind: &str,
    params: &str,
    format: OutputFormat,
) -> Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).context("Params are not valid JSON")?;

    let request = SubmitRequest {
        kind: kind.to_string(),
        params,
    };

    let result: TaskResult = client.post("api/v1/tasks", &request).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("{}", "Task Result".bold());
            println!("{}", "=".repeat(50));
            println!("Task:                   {}", result.task_id.cyan());
            println!("Kind:                   {}", result.kind);
            println!("Status:                 {}", color_status(&result.status));
            if let Some(unit) = &result.unit_id {
                println!("Unit:                   {}", unit);
            }
            println!("Duration:               {:.1}ms", result.duration_ms);
            if result.from_cache {
                println!("Source:                 {}", "cache".blue());
            }

            if let Some(output) = &result.output {
                println!();
                println!("{}", "Output".bold());
                println!("{}", "-".repeat(50));
                println!("{}", serde_json::to_string_pretty(output)?);
            }

            if let Some(error) = &result.error {
                println!();
                print_warning(&format!("Task failed: {}", error));
            }
        }
    }

    Ok(())
}
