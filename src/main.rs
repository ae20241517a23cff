mod attendance;
mod calc;
mod config;
mod dates;
mod db;
mod error;
mod history;
mod ipc;
mod logging;
mod model;
mod registry;
mod roster;
mod tenants;

use std::io::{self, BufRead, Write};

fn main() -> anyhow::Result<()> {
    let settings = config::Settings::load()?;
    logging::init_logging(&settings)?;

    let mut state = ipc::AppState::new(settings);
    if let Some(path) = state.settings.workspace.clone() {
        // A bad configured workspace must not stop the sidecar; workspace.select still works.
        match db::open_db(&path) {
            Ok(conn) => {
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::error!(path = %path.display(), error = %e, "configured workspace failed to open"),
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rosterd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                tracing::debug!(id = %req.id, method = %req.method, "request");
                ipc::handle_request(&mut state, req)
            }
            Err(e) => {
                // Can't recover the id from a malformed line.
                tracing::warn!(error = %e, "unparseable request");
                ipc::error::err("", "bad_json", e.to_string(), None)
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, shutting down");
    Ok(())
}
