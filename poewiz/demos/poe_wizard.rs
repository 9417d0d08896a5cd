//! PoE wizard example: scan a switch and bring a dead PoE port back up
//!
//! Connects to the switch, scans its topology, then runs the remediation
//! wizard on one port. Changes flagged by a check action are confirmed on
//! the terminal. Ctrl-C cancels the run between two polls.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example poe_wizard -- --host 192.168.1.10 --user admin --password switch --port 1/1/12
//! ```
//!
//! Add `--profile phone` (or `camera`, `ap`, `other`) to pick the action order.

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use poewiz::{
    Confirm, DeviceProfile, LogProgress, PortId, RemediationAction, SessionBuilder,
};
use tokio_util::sync::CancellationToken;

/// Asks on the terminal before each gated change.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, port: PortId, action: RemediationAction, alert: Option<&str>) -> bool {
        if let Some(alert) = alert {
            println!("  ! {alert}");
        }
        print!("Run '{action}' on port {port}? [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output,
    // RUST_LOG=poewiz::audit=debug for the command trail)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let port: PortId = args.port.parse()?;

    let mut session = SessionBuilder::new(&args.host)
        .username(&args.user)
        .password(&args.password)
        .timeout(Duration::from_secs(args.timeout))
        .progress(Arc::new(LogProgress))
        .build()?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    println!("Connecting to {}...", args.host);
    session.connect(&cancel).await?;
    let switch = session.switch();
    println!(
        "{} ({} {}), {} ports, PoE {}",
        switch.name,
        switch.model,
        switch.version,
        switch.ports().count(),
        if switch.supports_poe { "supported" } else { "not supported" }
    );
    if let Some(changes) = &switch.config_changes {
        println!("\nConfiguration changes since last scan:\n{changes}");
    }

    println!("\nRunning the {:?} wizard on port {port}", args.profile);
    println!("{}", "-".repeat(50));
    let result = session
        .run_poe_wizard(port, args.profile, &TerminalConfirm, &cancel)
        .await;
    match &result {
        Ok(report) => print!("{report}"),
        Err(e) => eprintln!("Wizard stopped: {e}"),
    }
    println!("{}", "-".repeat(50));

    session.close().await?;
    result?;
    Ok(())
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    user: String,
    password: String,
    port: String,
    profile: DeviceProfile,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "192.168.1.1".to_string();
        let mut user = "admin".to_string();
        let mut password = String::new();
        let mut port = "1/1/1".to_string();
        let mut profile = DeviceProfile::Other;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).cloned();
            match (args[i].as_str(), value) {
                ("--host" | "-h", Some(v)) => host = v,
                ("--user" | "-u", Some(v)) => user = v,
                ("--password" | "-P", Some(v)) => password = v,
                ("--port" | "-p", Some(v)) => port = v,
                ("--timeout" | "-t", Some(v)) => timeout = v.parse().unwrap_or(30),
                ("--profile", Some(v)) => {
                    profile = match v.as_str() {
                        "camera" => DeviceProfile::Camera,
                        "phone" => DeviceProfile::Phone,
                        "ap" => DeviceProfile::AccessPoint,
                        _ => DeviceProfile::Other,
                    }
                }
                ("--help", _) => {
                    println!(
                        "USAGE:\n    cargo run --example poe_wizard -- --host <HOST> --user <USER> \
                         --password <PASS> --port <C/S/P> [--profile camera|phone|ap|other] \
                         [--timeout <SECS>]"
                    );
                    std::process::exit(0);
                }
                (other, _) => {
                    eprintln!("Unknown argument: {other}");
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        Self {
            host,
            user,
            password,
            port,
            profile,
            timeout,
        }
    }
}
