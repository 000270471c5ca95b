//! gardenstate-cli: talk to a running GardenState server over HTTP
//!
//! # Subcommands
//! - `send <subject> <entry> <text> [--image URL]...`  post a user message
//! - `show <subject> <entry>`  print conversation and summary
//! - `status`  show server health

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "gardenstate-cli", version, about = "GardenState plant journal CLI")]
struct Cli {
    /// GardenState HTTP server URL (overrides GARDENSTATE_HTTP_URL env var)
    #[arg(long, env = "GARDENSTATE_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Append a user message to an entry
    Send {
        subject: String,
        entry: String,
        /// Message text; may be empty when images are attached
        #[arg(default_value = "")]
        text: String,

        /// Image URL to attach (repeatable)
        #[arg(long = "image")]
        images: Vec<String>,

        #[arg(long, env = "GARDENSTATE_UID", default_value = "cli-user")]
        uid: String,
    },

    /// Print an entry's conversation, name and summary
    Show { subject: String, entry: String },

    /// Show GardenState server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl MessageView {
    /// RFC 3339 instant; `None` sorts before every valid timestamp.
    fn instant(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<MessageView>,
}

// ============================================================================
// Formatting
// ============================================================================

pub fn message_body(uid: &str, text: &str, images: &[String]) -> serde_json::Value {
    serde_json::json!({
        "uid": uid,
        "content": text,
        "images": images,
    })
}

fn speaker(role: &str) -> &str {
    match role {
        "user" => "You",
        "assistant" => "Assistant",
        other => other,
    }
}

/// Human-readable rendering of an entry, messages in timestamp order.
pub fn format_entry(entry: &EntryView) -> String {
    let title = entry
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("(unnamed)");
    let mut out = format!("{} [{}]\n", title, entry.id);

    if !entry.summary.trim().is_empty() {
        out.push_str(&format!("Summary: {}\n", entry.summary.trim()));
    }

    let mut messages: Vec<&MessageView> = entry.messages.iter().collect();
    messages.sort_by_key(|m| m.instant());

    for m in messages {
        out.push_str(&format!("\n{}: {}", speaker(&m.role), m.content));
        if !m.images.is_empty() {
            out.push_str(&format!(" (+{} image(s))", m.images.len()));
        }
        out.push('\n');
    }
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn entry_url(server: &str, subject: &str, entry: &str) -> String {
    format!("{}/subjects/{}/entries/{}", server, subject, entry)
}

fn do_send(
    server: &str,
    subject: &str,
    entry: &str,
    text: &str,
    images: &[String],
    uid: &str,
) -> anyhow::Result<()> {
    let url = format!("{}/messages", entry_url(server, subject, entry));
    let resp = client(30)?
        .post(&url)
        .json(&message_body(uid, text, images))
        .send();

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("gardenstate-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        eprintln!(
            "gardenstate-cli: server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }

    println!("Sent message {}", body["id"].as_str().unwrap_or("?"));
    if body["queued"] == false {
        println!("The server will pick it up from the database.");
    }
    Ok(())
}

fn do_show(server: &str, subject: &str, entry: &str) -> anyhow::Result<()> {
    let url = entry_url(server, subject, entry);
    let resp = match client(10)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("gardenstate-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        eprintln!("gardenstate-cli: server returned {}", resp.status());
        std::process::exit(1);
    }

    let entry: EntryView = resp.json()?;
    print!("{}", format_entry(&entry));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);

    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("GardenState server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:            {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:              {}", body["store"].as_str().unwrap_or("?"));
            println!("Backend:            {}", body["backend"].as_str().unwrap_or("?"));
            println!("Socket:             {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("gardenstate-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("gardenstate-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Send {
            subject,
            entry,
            text,
            images,
            uid,
        } => {
            if text.trim().is_empty() && images.is_empty() {
                eprintln!("gardenstate-cli: nothing to send, give text or --image");
                std::process::exit(2);
            }
            do_send(&server, &subject, &entry, &text, &images, &uid)
        }
        Commands::Show { subject, entry } => do_show(&server, &subject, &entry),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("gardenstate-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
