//! pg2mysql CLI - reconcile rows between PostgreSQL and MySQL.

mod printer;

use clap::{Parser, Subcommand, ValueEnum};
use pg2mysql::{
    drivers, Config, Database, DiagnosticsConfig, EngineOptions, MigrateError, MigrationWatcher,
    Migrator, NoopWatcher, ValidationResult, Validator, VerificationWatcher, Verifier,
};
use printer::StdoutPrinter;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "pg2mysql")]
#[command(about = "Validate, migrate and verify rows between PostgreSQL and MySQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy rows missing from the destination
    Migrate {
        /// Truncate destination tables before migrating data
        #[arg(long)]
        truncate: bool,

        /// Diagnostics to enable (repeatable)
        #[arg(long, value_enum, value_delimiter = ',')]
        debug: Vec<DebugFlag>,
    },

    /// Find source rows that would not fit the destination columns
    Validate {
        /// Diagnostics to enable (repeatable)
        #[arg(long, value_enum, value_delimiter = ',')]
        debug: Vec<DebugFlag>,
    },

    /// Report source rows missing from the destination
    Verify {
        /// Diagnostics to enable (repeatable)
        #[arg(long, value_enum, value_delimiter = ',')]
        debug: Vec<DebugFlag>,
    },
}

impl Commands {
    fn debug_flags(&self) -> &[DebugFlag] {
        match self {
            Commands::Migrate { debug, .. }
            | Commands::Validate { debug }
            | Commands::Verify { debug } => debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DebugFlag {
    /// Log generated SQL
    Sql,
    /// Log scanned row values
    Data,
    /// Dump the schema comparison
    Schema,
    /// Stop after the schema dump
    Stop,
}

fn apply_debug_flags(diagnostics: &mut DiagnosticsConfig, flags: &[DebugFlag]) {
    for flag in flags {
        match flag {
            DebugFlag::Sql => diagnostics.log_sql = true,
            DebugFlag::Data => diagnostics.log_row_values = true,
            DebugFlag::Schema => diagnostics.dump_schema_diff = true,
            DebugFlag::Stop => diagnostics.stop_after_schema_dump = true,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    apply_debug_flags(&mut config.diagnostics, cli.command.debug_flags());
    if let Commands::Migrate { truncate: true, .. } = cli.command {
        config.migration.truncate_first = true;
    }
    config.validate()?;

    let mut dest = drivers::connect(&config.dest).await?;
    info!("Connected to destination {}", config.dest.endpoint());
    let mut source = match drivers::connect(&config.source).await {
        Ok(db) => db,
        Err(e) => {
            close(dest.as_mut(), "destination").await;
            return Err(e);
        }
    };
    info!("Connected to source {}", config.source.endpoint());

    let outcome = execute(&cli, &config, source.as_mut(), dest.as_mut()).await;

    close(source.as_mut(), "source").await;
    close(dest.as_mut(), "destination").await;
    outcome
}

async fn execute(
    cli: &Cli,
    config: &Config,
    source: &mut dyn Database,
    dest: &mut dyn Database,
) -> Result<(), MigrateError> {
    let options = EngineOptions::from(config);
    let printer = StdoutPrinter;

    match cli.command {
        Commands::Migrate { .. } => {
            let watcher: &dyn MigrationWatcher = if cli.output_json { &NoopWatcher } else { &printer };
            let result = Migrator::new(source, dest, options, watcher)
                .migrate()
                .await
                .map_err(|e| e.context("failed migrating"))?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables.len());
                println!("  Rows inserted: {}", result.rows_inserted);
                let failed = result.rows_failed();
                if failed > 0 {
                    println!("  Rows failed: {}", failed);
                }
            }
        }

        Commands::Validate { .. } => {
            let results = Validator::new(source, dest, options)
                .validate()
                .await
                .map_err(|e| e.context("failed to validate"))?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in &results {
                    println!("{}", describe_validation(result));
                }
            }
        }

        Commands::Verify { .. } => {
            let watcher: &dyn VerificationWatcher =
                if cli.output_json { &NoopWatcher } else { &printer };
            let result = Verifier::new(source, dest, options, watcher)
                .verify()
                .await
                .map_err(|e| e.context("failed to verify"))?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nVerification Summary:");
                println!("  Tables checked: {}", result.tables.len());
                println!("  Missing rows: {}", result.missing_rows());
                println!(
                    "  Status: {}",
                    if result.is_in_sync() { "IN SYNC" } else { "DIFFERS" }
                );
            }
        }
    }

    Ok(())
}

fn describe_validation(result: &ValidationResult) -> String {
    if !result.incompatible_row_ids.is_empty() {
        format!(
            "found {} incompatible rows in {} with IDs [{}]",
            result.incompatible_row_count,
            result.table_name,
            result.incompatible_row_ids.join(" ")
        )
    } else if result.incompatible_row_count > 0 {
        format!(
            "found {} incompatible rows in {} (which has no 'id' column)",
            result.incompatible_row_count, result.table_name
        )
    } else {
        format!("{} OK", result.table_name)
    }
}

async fn close(db: &mut dyn Database, side: &str) {
    if let Err(e) = db.close().await {
        warn!("Failed to close {} connection: {}", side, e);
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flags_set_diagnostics() {
        let mut diagnostics = DiagnosticsConfig::default();
        apply_debug_flags(&mut diagnostics, &[DebugFlag::Sql, DebugFlag::Schema]);
        assert!(diagnostics.log_sql);
        assert!(diagnostics.dump_schema_diff);
        assert!(!diagnostics.log_row_values);
        assert!(!diagnostics.stop_after_schema_dump);
    }

    #[test]
    fn test_debug_flags_parse_repeated_and_delimited() {
        let cli = Cli::parse_from([
            "pg2mysql",
            "migrate",
            "--truncate",
            "--debug",
            "sql",
            "--debug",
            "schema,stop",
        ]);
        assert_eq!(
            cli.command.debug_flags(),
            &[DebugFlag::Sql, DebugFlag::Schema, DebugFlag::Stop]
        );
        assert!(matches!(cli.command, Commands::Migrate { truncate: true, .. }));
        assert_eq!(cli.config, PathBuf::from("config.yml"));
    }

    #[test]
    fn test_describe_validation() {
        let with_ids = ValidationResult {
            table_name: "users".into(),
            incompatible_columns: vec!["name".into()],
            incompatible_row_ids: vec!["2".into(), "5".into()],
            incompatible_row_count: 2,
        };
        assert_eq!(
            describe_validation(&with_ids),
            "found 2 incompatible rows in users with IDs [2 5]"
        );

        let clean = ValidationResult {
            table_name: "tags".into(),
            ..Default::default()
        };
        assert_eq!(describe_validation(&clean), "tags OK");
    }
}
