//! `mothership` admin CLI: nodes, errors, counts, test reports, migrations.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use mothership_core::logging::{init_logging, LogConfig, LogTarget};
use mothership_core::models::timestamp_from_unix;
use mothership_core::{
    ErrorKind, ErrorRecord, ErrorReport, ErrorSink, FilterDescriptor, MemoryStore, Node,
    QueryStore,
};
use mothership_db::{Db, MigrationStatus, SqliteStore};
use serde_json::json;
use tabwriter::TabWriter;

use crate::monitor::{db_config, resolve_config};

pub const DEFAULT_REPORT_ADDR: &str = "127.0.0.1:4801";

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "mothership", version, about = "Administer the EDSAC status monitor")]
pub struct Cli {
    /// Path to config.yaml
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Database file, overriding the config
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Print JSON instead of tables
    #[arg(long, default_value_t = false)]
    pub json: bool,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Manage registered rig nodes
    #[command(subcommand)]
    Node(NodeCommand),
    /// Manage stored errors
    #[command(subcommand)]
    Error(ErrorCommand),
    /// Count errors matching a filter
    Count(FilterArgs),
    /// Send an error report to a running monitor
    Report(ReportArgs),
    /// Apply or roll back schema migrations
    Migrate(MigrateArgs),
}

#[derive(Debug, Subcommand)]
pub enum NodeCommand {
    /// Register a node
    Add(NodeAddArgs),
    /// Remove a node
    #[command(alias = "remove")]
    Rm(NodeLocation),
    /// List registered nodes
    List,
}

#[derive(Debug, Args)]
pub struct NodeAddArgs {
    #[arg(long)]
    pub rack: u32,
    #[arg(long)]
    pub chassis: u32,
    /// MAC address, ff:ff:ff:ff:ff:ff form
    #[arg(long)]
    pub mac: String,
    /// Node configuration file
    #[arg(long = "config")]
    pub config_path: String,
    /// Register the node as disabled
    #[arg(long, default_value_t = false)]
    pub disabled: bool,
}

#[derive(Debug, Args)]
pub struct NodeLocation {
    #[arg(long)]
    pub rack: u32,
    #[arg(long)]
    pub chassis: u32,
}

#[derive(Debug, Subcommand)]
pub enum ErrorCommand {
    /// Store an error as if a node had reported it
    Add(ReportFields),
    /// Delete every stored error
    Clear,
    /// List errors matching a filter
    List(FilterArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    #[arg(long)]
    pub rack: Option<u32>,
    #[arg(long, requires = "rack")]
    pub chassis: Option<u32>,
    #[arg(long, requires = "chassis")]
    pub valve: Option<u32>,
}

impl FilterArgs {
    #[must_use]
    pub fn descriptor(&self) -> FilterDescriptor {
        FilterDescriptor::from_parts(self.rack, self.chassis, self.valve)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ReportFields {
    #[arg(long)]
    pub rack: u32,
    #[arg(long)]
    pub chassis: u32,
    #[arg(long)]
    pub valve: Option<u32>,
    /// hardware or software
    #[arg(long, default_value = "hardware", value_parser = parse_kind)]
    pub kind: ErrorKind,
    #[arg(long)]
    pub message: String,
}

impl ReportFields {
    #[must_use]
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport::new(
            self.rack,
            self.chassis,
            self.valve,
            self.kind,
            &self.message,
        )
    }
}

fn parse_kind(value: &str) -> Result<ErrorKind, String> {
    ErrorKind::parse(value)
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Monitor ingest address
    #[arg(long, default_value = DEFAULT_REPORT_ADDR)]
    pub addr: String,
    /// Node timestamp, unix seconds
    #[arg(long)]
    pub timestamp: Option<i64>,
    #[command(flatten)]
    pub fields: ReportFields,
}

#[derive(Debug, Args)]
pub struct MigrateArgs {
    #[command(subcommand)]
    pub action: Option<MigrateAction>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum MigrateAction {
    /// Apply pending migrations, or migrate to a version
    Up {
        #[arg(long)]
        to: Option<i32>,
    },
    /// Roll back applied migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: i32,
    },
    /// Show migration status
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Side effects the CLI needs. Errors are rendered messages.
pub trait AdminBackend {
    fn add_node(&mut self, node: &Node) -> Result<(), String>;
    fn remove_node(&mut self, rack: u32, chassis: u32) -> Result<(), String>;
    fn list_nodes(&mut self) -> Result<Vec<Node>, String>;
    fn add_error(&mut self, report: &ErrorReport) -> Result<ErrorRecord, String>;
    fn clear_errors(&mut self) -> Result<usize, String>;
    fn search_errors(&mut self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, String>;
    fn count_errors(&mut self, filter: &FilterDescriptor) -> Result<u64, String>;
    fn send_report(&mut self, addr: &str, report: &ErrorReport) -> Result<(), String>;
    fn migrate_up(&mut self) -> Result<usize, String>;
    fn migrate_to(&mut self, target_version: i32) -> Result<(), String>;
    fn migrate_down(&mut self, steps: i32) -> Result<usize, String>;
    fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, String>;
}

/// Backend over the monitor's SQLite database, opened on first use.
#[derive(Debug)]
pub struct SqliteBackend {
    config: mothership_db::Config,
    auto_migrate: bool,
    store: Option<SqliteStore>,
}

impl SqliteBackend {
    /// `auto_migrate` applies pending migrations when the database opens.
    #[must_use]
    pub fn new(config: mothership_db::Config, auto_migrate: bool) -> Self {
        Self {
            config,
            auto_migrate,
            store: None,
        }
    }

    fn store(&mut self) -> Result<&SqliteStore, String> {
        if self.store.is_none() {
            let mut db = Db::open(self.config.clone()).map_err(|err| err.to_string())?;
            if self.auto_migrate {
                db.migrate_up().map_err(|err| err.to_string())?;
            }
            self.store = Some(SqliteStore::from_db(db));
        }
        self.store
            .as_ref()
            .ok_or_else(|| "database is not open".to_string())
    }
}

impl AdminBackend for SqliteBackend {
    fn add_node(&mut self, node: &Node) -> Result<(), String> {
        self.store()?.add_node(node).map_err(|err| err.to_string())
    }

    fn remove_node(&mut self, rack: u32, chassis: u32) -> Result<(), String> {
        self.store()?
            .remove_node(rack, chassis)
            .map_err(|err| err.to_string())
    }

    fn list_nodes(&mut self) -> Result<Vec<Node>, String> {
        self.store()?.list_nodes().map_err(|err| err.to_string())
    }

    fn add_error(&mut self, report: &ErrorReport) -> Result<ErrorRecord, String> {
        self.store()?
            .persist(report, Utc::now())
            .map_err(|err| err.to_string())
    }

    fn clear_errors(&mut self) -> Result<usize, String> {
        self.store()?
            .remove_all_errors()
            .map_err(|err| err.to_string())
    }

    fn search_errors(&mut self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, String> {
        self.store()?.search(filter).map_err(|err| err.to_string())
    }

    fn count_errors(&mut self, filter: &FilterDescriptor) -> Result<u64, String> {
        self.store()?.count(filter).map_err(|err| err.to_string())
    }

    fn send_report(&mut self, addr: &str, report: &ErrorReport) -> Result<(), String> {
        mothership_ingest::send_report_blocking(addr, report, REPORT_TIMEOUT)
            .map_err(|err| err.to_string())
    }

    fn migrate_up(&mut self) -> Result<usize, String> {
        self.store()?
            .with_db(|db| db.migrate_up())
            .map_err(|err| err.to_string())
    }

    fn migrate_to(&mut self, target_version: i32) -> Result<(), String> {
        self.store()?
            .with_db(|db| db.migrate_to(target_version))
            .map_err(|err| err.to_string())
    }

    fn migrate_down(&mut self, steps: i32) -> Result<usize, String> {
        self.store()?
            .with_db(|db| db.migrate_down(steps))
            .map_err(|err| err.to_string())
    }

    fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, String> {
        self.store()?
            .with_db(|db| db.migration_status())
            .map_err(|err| err.to_string())
    }
}

/// In-memory backend for tests and dry runs. Reports are recorded, not sent.
#[derive(Debug)]
pub struct MemoryBackend {
    store: MemoryStore,
    clock: DateTime<Utc>,
    sent: Vec<(String, ErrorReport)>,
    schema_version: i32,
}

const MEMORY_SCHEMA: (i32, &str) = (1, "initial_schema");

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            store: MemoryStore::new(),
            clock: timestamp_from_unix(1_700_000_000),
            sent: Vec::new(),
            schema_version: MEMORY_SCHEMA.0,
        }
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    #[must_use]
    pub fn sent(&self) -> &[(String, ErrorReport)] {
        &self.sent
    }

    #[must_use]
    pub fn schema_version(&self) -> i32 {
        self.schema_version
    }
}

impl AdminBackend for MemoryBackend {
    fn add_node(&mut self, node: &Node) -> Result<(), String> {
        self.store.add_node(node).map_err(|err| err.to_string())
    }

    fn remove_node(&mut self, rack: u32, chassis: u32) -> Result<(), String> {
        self.store
            .remove_node(rack, chassis)
            .map_err(|err| err.to_string())
    }

    fn list_nodes(&mut self) -> Result<Vec<Node>, String> {
        Ok(self.store.list_nodes())
    }

    fn add_error(&mut self, report: &ErrorReport) -> Result<ErrorRecord, String> {
        self.store
            .add_error(report, self.clock)
            .map_err(|err| err.to_string())
    }

    fn clear_errors(&mut self) -> Result<usize, String> {
        Ok(self.store.remove_all_errors())
    }

    fn search_errors(&mut self, filter: &FilterDescriptor) -> Result<Vec<ErrorRecord>, String> {
        self.store.search(filter).map_err(|err| err.to_string())
    }

    fn count_errors(&mut self, filter: &FilterDescriptor) -> Result<u64, String> {
        self.store.count(filter).map_err(|err| err.to_string())
    }

    fn send_report(&mut self, addr: &str, report: &ErrorReport) -> Result<(), String> {
        report.validate()?;
        self.sent.push((addr.to_string(), report.clone()));
        Ok(())
    }

    fn migrate_up(&mut self) -> Result<usize, String> {
        if self.schema_version >= MEMORY_SCHEMA.0 {
            return Ok(0);
        }
        self.schema_version = MEMORY_SCHEMA.0;
        Ok(1)
    }

    fn migrate_to(&mut self, target_version: i32) -> Result<(), String> {
        if target_version != 0 && target_version != MEMORY_SCHEMA.0 {
            return Err(format!("unknown migration version {target_version}"));
        }
        self.schema_version = target_version;
        Ok(())
    }

    fn migrate_down(&mut self, steps: i32) -> Result<usize, String> {
        if steps <= 0 || self.schema_version == 0 {
            return Ok(0);
        }
        self.schema_version = 0;
        Ok(1)
    }

    fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, String> {
        let applied = self.schema_version >= MEMORY_SCHEMA.0;
        Ok(vec![MigrationStatus {
            version: MEMORY_SCHEMA.0,
            description: MEMORY_SCHEMA.1.to_string(),
            applied,
            applied_at: if applied {
                self.clock.format("%Y-%m-%d %H:%M:%S").to_string()
            } else {
                String::new()
            },
        }])
    }
}

/// Entry point for the `mothership` binary.
pub fn run_from_env() -> i32 {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(err) => return report_parse_error(&err, &mut stdout, &mut stderr),
    };

    let config = match resolve_config(cli.config.as_deref(), cli.db.clone(), None) {
        Ok(config) => config,
        Err(err) => {
            let _ = writeln!(stderr, "error: {err}");
            return 1;
        }
    };
    if let Err(err) = init_logging(&LogConfig::from_config(&config.logging, LogTarget::Stderr)) {
        let _ = writeln!(stderr, "warning: {err}");
    }

    let auto_migrate = !matches!(cli.command, CliCommand::Migrate(_));
    let mut backend = SqliteBackend::new(db_config(&config), auto_migrate);
    run_parsed(&cli, &mut backend, &mut stdout, &mut stderr)
}

pub fn run_for_test(args: &[&str], backend: &mut dyn AdminBackend) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_backend(&owned_args, backend, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

/// Parse `args` (without the program name) and run against `backend`.
pub fn run_with_backend(
    args: &[String],
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match parse_args(args) {
        Ok(cli) => run_parsed(&cli, backend, stdout, stderr),
        Err(err) => report_parse_error(&err, stdout, stderr),
    }
}

fn parse_args(args: &[String]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("mothership").chain(args.iter().map(String::as_str)))
}

fn report_parse_error(err: &clap::Error, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let rendered = err.render().to_string();
    if err.use_stderr() {
        let _ = write!(stderr, "{rendered}");
    } else {
        let _ = write!(stdout, "{rendered}");
    }
    err.exit_code()
}

fn run_parsed(
    cli: &Cli,
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match execute(cli, backend, stdout, stderr) {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "error: {message}");
            1
        }
    }
}

fn execute(
    cli: &Cli,
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), String> {
    match &cli.command {
        CliCommand::Node(command) => execute_node(command, cli.json, backend, stdout),
        CliCommand::Error(command) => execute_error(command, cli.json, backend, stdout),
        CliCommand::Count(filter) => {
            let descriptor = filter.descriptor();
            let count = backend
                .count_errors(&descriptor)
                .map_err(|err| format!("count errors: {err}"))?;
            if cli.json {
                let value = json!({ "filter": descriptor.title(), "count": count });
                return write_json(stdout, &value);
            }
            writeln!(stdout, "{count}").map_err(|err| err.to_string())
        }
        CliCommand::Report(args) => {
            let mut report = args.fields.to_report();
            report.timestamp = args.timestamp;
            backend
                .send_report(&args.addr, &report)
                .map_err(|err| format!("send report: {err}"))?;
            writeln!(stdout, "Report sent to {}", args.addr).map_err(|err| err.to_string())
        }
        CliCommand::Migrate(args) => execute_migrate(args, cli.json, backend, stdout, stderr),
    }
}

fn execute_node(
    command: &NodeCommand,
    json_output: bool,
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    match command {
        NodeCommand::Add(args) => {
            let node = Node {
                rack: args.rack,
                chassis: args.chassis,
                mac_address: args.mac.clone(),
                enabled: !args.disabled,
                config_path: args.config_path.clone(),
            };
            backend
                .add_node(&node)
                .map_err(|err| format!("add node: {err}"))?;
            writeln!(
                stdout,
                "Added node rack {} chassis {}",
                args.rack, args.chassis
            )
            .map_err(|err| err.to_string())
        }
        NodeCommand::Rm(location) => {
            backend
                .remove_node(location.rack, location.chassis)
                .map_err(|err| format!("remove node: {err}"))?;
            writeln!(
                stdout,
                "Removed node rack {} chassis {}",
                location.rack, location.chassis
            )
            .map_err(|err| err.to_string())
        }
        NodeCommand::List => {
            let nodes = backend
                .list_nodes()
                .map_err(|err| format!("list nodes: {err}"))?;
            if json_output {
                return write_json(stdout, &nodes);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "RACK\tCHASSIS\tMAC\tENABLED\tCONFIG").map_err(|err| err.to_string())?;
            for node in &nodes {
                writeln!(
                    tw,
                    "{}\t{}\t{}\t{}\t{}",
                    node.rack,
                    node.chassis,
                    node.mac_address,
                    if node.enabled { "yes" } else { "no" },
                    node.config_path
                )
                .map_err(|err| err.to_string())?;
            }
            tw.flush().map_err(|err| err.to_string())
        }
    }
}

fn execute_error(
    command: &ErrorCommand,
    json_output: bool,
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    match command {
        ErrorCommand::Add(fields) => {
            let record = backend
                .add_error(&fields.to_report())
                .map_err(|err| format!("add error: {err}"))?;
            if json_output {
                return write_json(stdout, &record_json(&record));
            }
            writeln!(stdout, "Added error {}: {}", record.id, record.message)
                .map_err(|err| err.to_string())
        }
        ErrorCommand::Clear => {
            let removed = backend
                .clear_errors()
                .map_err(|err| format!("clear errors: {err}"))?;
            writeln!(stdout, "Removed {removed} error(s)").map_err(|err| err.to_string())
        }
        ErrorCommand::List(filter) => {
            let records = backend
                .search_errors(&filter.descriptor())
                .map_err(|err| format!("list errors: {err}"))?;
            if json_output {
                let rows: Vec<serde_json::Value> = records.iter().map(record_json).collect();
                return write_json(stdout, &rows);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "ID\tRECEIVED\tRACK\tCHASSIS\tVALVE\tMESSAGE")
                .map_err(|err| err.to_string())?;
            for record in &records {
                let valve = record
                    .valve
                    .map_or_else(|| "-".to_string(), |valve| valve.to_string());
                writeln!(
                    tw,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    record.id,
                    record.received_at.format("%Y-%m-%d %H:%M:%S"),
                    record.rack,
                    record.chassis,
                    valve,
                    record.message
                )
                .map_err(|err| err.to_string())?;
            }
            tw.flush().map_err(|err| err.to_string())
        }
    }
}

fn execute_migrate(
    args: &MigrateArgs,
    json_output: bool,
    backend: &mut dyn AdminBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), String> {
    match args.action.unwrap_or(MigrateAction::Up { to: None }) {
        MigrateAction::Up { to: Some(target) } => {
            backend
                .migrate_to(target)
                .map_err(|err| format!("migration failed: {err}"))?;
            writeln!(stderr, "Migrated to version {target}").map_err(|err| err.to_string())
        }
        MigrateAction::Up { to: None } => {
            let applied = backend
                .migrate_up()
                .map_err(|err| format!("migration failed: {err}"))?;
            if applied == 0 {
                writeln!(stderr, "No pending migrations").map_err(|err| err.to_string())
            } else {
                writeln!(stderr, "Applied {applied} migration(s)").map_err(|err| err.to_string())
            }
        }
        MigrateAction::Down { steps } => {
            let rolled_back = backend
                .migrate_down(steps)
                .map_err(|err| format!("rollback failed: {err}"))?;
            if rolled_back == 0 {
                writeln!(stderr, "No migrations to roll back").map_err(|err| err.to_string())
            } else {
                writeln!(stderr, "Rolled back {rolled_back} migration(s)")
                    .map_err(|err| err.to_string())
            }
        }
        MigrateAction::Status => {
            let status = backend
                .migration_status()
                .map_err(|err| format!("failed to get migration status: {err}"))?;
            if json_output {
                let rows: Vec<serde_json::Value> = status
                    .iter()
                    .map(|row| {
                        json!({
                            "version": row.version,
                            "description": row.description,
                            "applied": row.applied,
                            "applied_at": row.applied_at,
                        })
                    })
                    .collect();
                return write_json(stdout, &rows);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "VERSION\tDESCRIPTION\tSTATUS\tAPPLIED AT")
                .map_err(|err| err.to_string())?;
            for row in status {
                let (state, applied_at) = if row.applied {
                    ("applied", row.applied_at)
                } else {
                    ("pending", "-".to_string())
                };
                writeln!(
                    tw,
                    "{}\t{}\t{}\t{}",
                    row.version, row.description, state, applied_at
                )
                .map_err(|err| err.to_string())?;
            }
            tw.flush().map_err(|err| err.to_string())
        }
    }
}

fn record_json(record: &ErrorRecord) -> serde_json::Value {
    json!({
        "id": record.id,
        "received_at": record.received_at.to_rfc3339(),
        "reported_at": record.reported_at.map(|at| at.to_rfc3339()),
        "rack": record.rack,
        "chassis": record.chassis,
        "valve": record.valve,
        "message": record.message,
        "enabled": record.enabled,
    })
}

fn write_json<T: serde::Serialize + ?Sized>(stdout: &mut dyn Write, value: &T) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut *stdout, value).map_err(|err| err.to_string())?;
    writeln!(stdout).map_err(|err| err.to_string())
}
