use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_hw::{Camera, CaptureController, V4lDevice};
use serde_json::Value;

// Determinations wait on a remote model; allow well past its own timeout.
const CALL_TIMEOUT: Duration = Duration::from_secs(120);

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn enroll(&self, name: &str, photo: Vec<u8>) -> zbus::Result<String>;
    fn remove_identity(&self, id: &str) -> zbus::Result<bool>;
    fn list_roster(&self) -> zbus::Result<String>;
    fn take_attendance(&self, image: Vec<u8>) -> zbus::Result<String>;
    fn take_attendance_live(&self) -> zbus::Result<String>;
    fn history(&self) -> zbus::Result<String>;
    fn stats(&self) -> zbus::Result<String>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance CLI")]
struct Cli {
    /// Print raw JSON replies instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from a reference photo
    Enroll {
        /// Display name the recognition service will report
        #[arg(short, long)]
        name: String,
        /// Reference photo (JPEG, PNG, WebP, ...)
        photo: PathBuf,
    },
    /// Remove an enrolled identity
    Remove {
        /// Identity ID to remove
        id: String,
    },
    /// List enrolled identities
    List,
    /// Take attendance from an image file, or from the camera if none given
    Take {
        /// Scene image; omit to capture one still from the camera
        #[arg(short, long)]
        image: Option<PathBuf>,
    },
    /// Show past sessions, most recent first
    History,
    /// Show aggregate attendance statistics
    Stats,
    /// Show daemon status
    Status,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device to test
        #[arg(short, long, env = "ROLLCALL_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        /// Where to write the captured still
        #[arg(short, long, default_value = "rollcall-test.jpg")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Test { device, output } = &cli.command {
        return camera_test(device, output);
    }

    let connection = zbus::connection::Builder::session()?
        .method_timeout(CALL_TIMEOUT)
        .build()
        .await
        .context("connecting to the session bus")?;
    let proxy = AttendanceProxy::new(&connection).await?;
    tracing::debug!(timeout_secs = CALL_TIMEOUT.as_secs(), "connected to rollcalld");

    match cli.command {
        Commands::Enroll { name, photo } => {
            let bytes = std::fs::read(&photo)
                .with_context(|| format!("reading {}", photo.display()))?;
            let id = proxy.enroll(&name, bytes).await?;
            println!("Enrolled {name} ({id})");
        }
        Commands::Remove { id } => {
            if proxy.remove_identity(&id).await? {
                println!("Removed {id}");
            } else {
                println!("No identity with id {id}");
            }
        }
        Commands::List => {
            let reply = proxy.list_roster().await?;
            render(cli.json, &reply, print_roster)?;
        }
        Commands::Take { image } => {
            let reply = match image {
                Some(path) => {
                    let bytes = std::fs::read(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    proxy.take_attendance(bytes).await?
                }
                None => {
                    println!("Capturing from camera...");
                    proxy.take_attendance_live().await?
                }
            };
            render(cli.json, &reply, print_report)?;
        }
        Commands::History => {
            let reply = proxy.history().await?;
            render(cli.json, &reply, print_history)?;
        }
        Commands::Stats => {
            let reply = proxy.stats().await?;
            render(cli.json, &reply, print_stats)?;
        }
        Commands::Status => {
            let reply = proxy.status().await?;
            let value: Value = serde_json::from_str(&reply)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Test { .. } => unreachable!("handled before connecting"),
    }

    Ok(())
}

fn render(json: bool, reply: &str, summary: fn(&Value)) -> Result<()> {
    if json {
        println!("{reply}");
    } else {
        let value: Value = serde_json::from_str(reply).context("daemon sent invalid JSON")?;
        summary(&value);
    }
    Ok(())
}

fn names(value: &Value) -> String {
    let list: Vec<&str> = value
        .as_array()
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if list.is_empty() {
        "-".to_string()
    } else {
        list.join(", ")
    }
}

fn print_roster(value: &Value) {
    let entries = value.as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        println!("No identities enrolled");
        return;
    }
    for e in &entries {
        println!(
            "{}  {}  (enrolled {})",
            e["id"].as_str().unwrap_or("?"),
            e["name"].as_str().unwrap_or("?"),
            e["enrolled_at"].as_str().unwrap_or("?"),
        );
    }
    println!("{} enrolled", entries.len());
}

fn print_report(value: &Value) {
    println!("Session  {}", value["record_id"].as_str().unwrap_or("?"));
    println!("Present  {}", names(&value["present"]));
    println!("Absent   {}", names(&value["absent"]));
    if let Some(confidence) = value["confidence"].as_str() {
        println!("Confidence  {confidence}");
    }
    if let Some(reasoning) = value["reasoning"].as_str() {
        println!("Reasoning   {reasoning}");
    }
    let ambiguous = names(&value["ambiguous_names"]);
    if ambiguous != "-" {
        println!("Warning: {ambiguous} matched more than one enrolled identity");
    }
}

fn print_history(value: &Value) {
    let sessions = value.as_array().cloned().unwrap_or_default();
    if sessions.is_empty() {
        println!("No sessions recorded");
        return;
    }
    for s in &sessions {
        println!(
            "{}  {}/{} present  {}",
            s["captured_at"].as_str().unwrap_or("?"),
            s["present_count"].as_u64().unwrap_or(0),
            s["roster_size"].as_u64().unwrap_or(0),
            names(&s["present"]),
        );
    }
}

fn print_stats(value: &Value) {
    println!("Roster size       {}", value["roster_size"].as_u64().unwrap_or(0));
    println!("Sessions          {}", value["session_count"].as_u64().unwrap_or(0));
    println!("Avg attendance    {}%", value["average_attendance_pct"].as_u64().unwrap_or(0));
    println!(
        "Last absentees    {}",
        value["last_session_absentees"].as_u64().unwrap_or(0)
    );
    if let Some(trend) = value["trend"].as_array() {
        for point in trend {
            println!(
                "  {:<8} present {:>3}  absent {:>3}",
                point["label"].as_str().unwrap_or("?"),
                point["present"].as_u64().unwrap_or(0),
                point["absent"].as_u64().unwrap_or(0),
            );
        }
    }
}

/// Direct camera check: list devices, grab one still, write it to disk.
fn camera_test(device: &str, output: &Path) -> Result<()> {
    println!("Running camera diagnostics...");

    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in &devices {
        println!("  {}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }

    let mut controller = CaptureController::new(V4lDevice::new(device, 4));
    controller
        .enter_live()
        .with_context(|| format!("opening {device}"))?;
    let jpeg = controller.snapshot().context("capturing a still")?;
    controller.enter_upload();

    std::fs::write(output, &jpeg).with_context(|| format!("writing {}", output.display()))?;
    println!("Captured {} bytes from {device} -> {}", jpeg.len(), output.display());
    Ok(())
}
