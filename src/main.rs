mod catalog;
mod config;
mod db;
mod error;
mod flow;
mod http;
mod ipc;
mod results;
mod session;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use catalog::Catalog;
use clap::Parser;
use config::Config;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // stdout belongs to the stdio transport; logs always go to stderr.
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    if config.instructor_key().is_none() {
        warn!("INSTRUCTOR_KEY is not set; instructor mode is disabled");
    }

    let catalog = Arc::new(Catalog::load(&config.questions_dir)?);
    let config = Arc::new(config);

    if config.stdio {
        run_stdio(config, catalog);
        return Ok(());
    }

    // Create the schema up front; a failure here leaves requests answering
    // database_unavailable instead of stopping the process.
    if let Err(e) = db::open_db(&config.data_dir) {
        error!("cannot initialize response store: {e:?}");
    }

    info!(port = config.port, course = %config.course, "starting HTTP server");
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(http::serve(config, catalog))
}

fn run_stdio(config: Arc<Config>, catalog: Arc<Catalog>) {
    let db = open_store(&config);
    let mut state = ipc::AppState {
        config,
        catalog,
        db,
        file_export: true,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        // A store that failed earlier is retried until it opens.
        if state.db.is_none() {
            state.db = open_store(&state.config);
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&state, req),
            // Can't reply with an id we could not read.
            Err(e) => ipc::err("", "bad_json", e.to_string(), None),
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, exiting");
}

fn open_store(config: &Config) -> Option<rusqlite::Connection> {
    match db::open_db(&config.data_dir) {
        Ok(conn) => Some(conn),
        Err(e) => {
            error!("cannot open response store: {e:?}");
            None
        }
    }
}
