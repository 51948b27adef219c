mod actions;
mod backend;
mod columns;
mod config;
mod db;
mod error;
mod form;
mod imports;
mod ipc;
mod listing;
mod logging;
mod performance;
mod record;
mod registrations;
mod render;
mod schema;
mod storage;

use std::io::{self, BufRead, Write};

use serde_json::json;
use tracing::{error, info, warn};

fn main() {
    let config = config::Config::from_env();
    if let Err(e) = logging::init_logging(&config.log_level, config.log_format) {
        eprintln!("centerdeskd: {e:#}");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "centerdeskd starting");

    let initial_workspace = config.workspace.clone();
    let mut state = ipc::AppState::new(config);
    if let Some(path) = initial_workspace {
        if let Err(e) = state.open_workspace(&path) {
            // The client can still pick another workspace.
            error!(workspace = %path.to_string_lossy(), error = %format!("{e:#}"), "initial workspace failed to open");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request");
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("centerdeskd exiting");
}
