//! anteroom-cli — operational CLI for the Anteroom chat service
//!
//! # Subcommands
//! - `status`          — show server health
//! - `chat <prompt>`   — send a one-shot prompt and stream the reply to stdout

use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "anteroom-cli",
    version,
    about = "Anteroom access-gated chat — operational CLI"
)]
struct Cli {
    /// Anteroom HTTP server URL (overrides ANTEROOM_HTTP_URL env var)
    #[arg(long, env = "ANTEROOM_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show Anteroom server status
    Status,

    /// Send a chat prompt and stream the reply to stdout
    Chat {
        /// Prompt text to send
        prompt: String,

        /// Access token (enables persisting into a conversation)
        #[arg(long, env = "ANTEROOM_ACCESS_TOKEN")]
        token: Option<String>,

        /// Conversation id to append the exchange to
        #[arg(long)]
        conversation: Option<String>,
    },
}

// ============================================================================
// SSE parsing
// ============================================================================

/// Extract the text delta from a `token` event's data payload.
fn token_text(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value["text"].as_str().map(|text| text.to_string())
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Anteroom server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:      {}", body["postgresql"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("anteroom-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("anteroom-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Stream a chat completion to stdout. No read timeout: the reply arrives
/// token by token for as long as the model generates.
fn do_chat(
    server: &str,
    prompt: &str,
    token: Option<String>,
    conversation: Option<String>,
) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder().build()?;

    let url = format!("{}/api/chat", server);
    let mut body = serde_json::json!({
        "messages": [{ "role": "user", "content": prompt }],
    });
    if let Some(conversation) = conversation {
        body["conversationId"] = serde_json::json!(conversation);
    }

    let mut request = client.post(&url).json(&body);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }

    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("anteroom-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("anteroom-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let reader = BufReader::new(resp);
    let mut current_event = String::new();

    for line in reader.lines() {
        let line = line?;

        if let Some(event) = line.strip_prefix("event: ") {
            current_event = event.trim().to_string();
        } else if let Some(data) = line.strip_prefix("data: ") {
            match current_event.as_str() {
                "token" => {
                    if let Some(text) = token_text(data) {
                        print!("{}", text);
                        std::io::stdout().flush()?;
                    }
                }
                "error" => {
                    println!();
                    eprintln!("anteroom-cli: completion failed upstream");
                    std::process::exit(1);
                }
                "done" => {
                    println!();
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    println!();
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Chat {
            prompt,
            token,
            conversation,
        } => do_chat(&server, &prompt, token, conversation),
    };

    if let Err(e) = result {
        eprintln!("anteroom-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_text_extracts_delta() {
        assert_eq!(
            token_text("{\"text\":\"hello \"}"),
            Some("hello ".to_string())
        );
        assert_eq!(token_text("{\"text\":\"\"}"), Some(String::new()));
    }

    #[test]
    fn test_token_text_rejects_garbage() {
        assert_eq!(token_text("not json"), None);
        assert_eq!(token_text("{\"other\":1}"), None);
    }
}
