#![allow(clippy::expect_used, clippy::doc_markdown, clippy::uninlined_format_args)]
//! Example: Inspect the scripts stored for an account
//!
//! Connects to a ManageSieve server over TLS, lists the stored scripts
//! and shows which one currently filters incoming mail.
//!
//! ## Running
//!
//! ```bash
//! cargo run --package sievemgr --example quickstart
//! ```

use std::io::{self, Write};

use sievemgr::{Security, SessionConfig, SieveSession};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sievemgr=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("sievemgr - ManageSieve Quick Start");
    println!("==================================\n");

    // Get the server and credentials
    print!("Server: ");
    io::stdout().flush()?;
    let mut host = String::new();
    io::stdin().read_line(&mut host)?;
    let host = host.trim();

    print!("Username: ");
    io::stdout().flush()?;
    let mut user = String::new();
    io::stdin().read_line(&mut user)?;
    let user = user.trim();

    print!("Password: ");
    io::stdout().flush()?;
    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim();

    let config = SessionConfig::builder(host)
        .security(Security::Implicit)
        .credentials(user, password)
        .build();

    // Connect with TLS and authenticate
    println!("\nConnecting to {}:{}...", config.host, config.port);
    let mut session = SieveSession::connect(config).await?;
    println!("✓ Connected and authenticated");

    if let Some(implementation) = &session.capabilities().implementation {
        println!("  Server: {}", implementation);
    }

    // List scripts
    println!("\nStored scripts:");
    let scripts = session.list_scripts().await?;
    if scripts.is_empty() {
        println!("  (none)");
    }
    for name in scripts {
        println!("  - {}", name);
    }

    match session.get_active().await? {
        Some(name) => println!("\nActive script: {}", name),
        None => println!("\nNo script is active; incoming mail is not filtered."),
    }

    // Logout
    println!("\nDisconnecting...");
    session.logout().await?;
    println!("✓ Disconnected");

    Ok(())
}
