//! `mothership-monitor` bootstrap: config, logging, store, ingestion, UI.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use mothership_core::config::{load_config, Config, ConfigError};
use mothership_core::logging::{init_logging, LogConfig, LogTarget};
use mothership_core::{ErrorSink, QueryStore};
use mothership_db::SqliteStore;
use mothership_ingest::{IngestPump, IngestServer, MessageSource};
use mothership_notebook::{
    HeadlessHost, Notebook, NotebookError, PageHost, RefreshConfig, RefreshQueue,
    RefreshSchedule, RefreshTimer,
};

use crate::app::App;
use crate::page_strip::PageStrip;
use crate::render::render_snapshot;
use crate::runtime::{self, UI_TICK};
use crate::MonitorError;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mothership-monitor", version, about = "EDSAC status monitor")]
pub struct MonitorArgs {
    /// Path to config.yaml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Database file, overriding the config
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Listen address for node error reports
    #[arg(long)]
    pub bind: Option<String>,
    /// Print the All tab once and exit
    #[arg(long, default_value_t = false)]
    pub snapshot: bool,
}

/// Load config and apply command-line overrides on top.
pub fn resolve_config(
    config_file: Option<&Path>,
    db: Option<PathBuf>,
    bind: Option<String>,
) -> Result<Config, ConfigError> {
    let (mut config, _source) = load_config(config_file)?;
    if let Some(path) = db {
        config.database.path = Some(path);
    }
    if let Some(bind) = bind {
        config.ingest.bind = bind;
    }
    config.validate()?;
    Ok(config)
}

#[must_use]
pub fn db_config(config: &Config) -> mothership_db::Config {
    mothership_db::Config::new(config.database_path())
        .with_busy_timeout_ms(config.database.busy_timeout_ms)
}

pub fn run(args: MonitorArgs) -> Result<(), MonitorError> {
    let config = resolve_config(args.config.as_deref(), args.db, args.bind)?;
    let interactive = !args.snapshot && io::stdout().is_terminal();
    let target = if interactive {
        LogTarget::File(config.log_file_path())
    } else {
        LogTarget::Stderr
    };
    init_logging(&LogConfig::from_config(&config.logging, target))?;
    config.ensure_directories()?;

    let store = Arc::new(SqliteStore::open(db_config(&config))?);
    tracing::info!(
        db = %config.database_path().display(),
        interactive,
        "monitor starting"
    );

    if !interactive {
        let text = snapshot(store)?;
        let mut stdout = io::stdout();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    }
    run_interactive(&config, store)
}

/// Plain-text view of the `All` tab.
pub fn snapshot(store: Arc<dyn QueryStore>) -> Result<String, NotebookError> {
    let notebook = Notebook::new(store, Arc::new(HeadlessHost::new()));
    notebook.open_initial()?;
    let count = notebook.total_visible_error_count()?;
    let Some(tab) = notebook.tab_at(0) else {
        return Err(NotebookError::NoSuchPage { position: 0 });
    };
    Ok(render_snapshot(&tab.snapshot(), count))
}

fn run_interactive(config: &Config, store: Arc<SqliteStore>) -> Result<(), MonitorError> {
    let queue = Arc::new(RefreshQueue::new());
    let strip = Arc::new(PageStrip::new());
    let notebook = Arc::new(Notebook::with_refresh_config(
        Arc::clone(&store) as Arc<dyn QueryStore>,
        Arc::clone(&strip) as Arc<dyn PageHost>,
        RefreshConfig {
            parallel: config.refresh.parallel,
        },
    ));

    let server = Arc::new(IngestServer::start(&config.ingest.bind)?);
    let pump = IngestPump::spawn(
        Arc::clone(&server) as Arc<dyn MessageSource>,
        Arc::clone(&store) as Arc<dyn ErrorSink>,
        Arc::clone(&queue),
        config.ingest_read_timeout(),
    )?;
    let timer = RefreshTimer::spawn(
        RefreshSchedule::from_config(&config.refresh),
        Arc::clone(&queue),
    )?;

    let mut app = App::new(notebook, strip, Arc::clone(&queue));
    let result = match app.start() {
        Ok(()) => runtime::run(&mut app, UI_TICK).map_err(MonitorError::from),
        Err(err) => Err(MonitorError::from(err)),
    };

    let ticks = timer.stop();
    let pumped = pump.stop();
    let ingest = server.stats();
    drop(server);
    tracing::info!(
        timer_ticks = ticks,
        persisted = pumped.persisted,
        failed = pumped.failed,
        connections = ingest.connections,
        rejected = ingest.rejected,
        "monitor stopped"
    );
    result
}
