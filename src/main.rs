//! DB Studio command line.
//!
//! Thin glue over the library: maps subcommands onto the engine and renders
//! results. Ctrl-C cancels a running backup or restore.

use db_studio::backup::BackupOrchestrator;
use db_studio::config::{Command, Config, OutputFormat};
use db_studio::db::{ExecutionDispatcher, SchemaInspector};
use db_studio::dialect::{classify, extract_database, extract_host, prepare_statement, rewrite};
use db_studio::error::{DbError, DbResult};
use db_studio::models::{
    BackupJob, ExecutionOutcome, JobOutcome, PaginationRequest, RestoreJob, RestoreSource,
};
use db_studio::tools::{format_as_markdown, format_as_table, format_list, outcome_to_json, to_csv};
use std::future::Future;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse_args();
    init_tracing(&config);

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, kind = ?e.kind(), "Command failed");
            eprintln!("Error: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> DbResult<ExitCode> {
    let engine = config.engine_settings();
    let dispatcher = ExecutionDispatcher::new(engine.clone());
    let inspector = SchemaInspector::new(engine.clone());

    match &config.command {
        Command::Classify { connection } => {
            let descriptor = connection.descriptor();
            let dialect = classify(&descriptor);
            let cs = descriptor.connection_string();
            println!("dialect:  {}", dialect.display_name());
            println!("host:     {}", extract_host(dialect, cs));
            println!(
                "database: {}",
                extract_database(dialect, cs).unwrap_or_else(|| "-".to_string())
            );
        }
        Command::Rewrite {
            connection,
            database,
        } => {
            let descriptor = connection.descriptor();
            let dialect = classify(&descriptor);
            println!("{}", rewrite(dialect, descriptor.connection_string(), database));
        }
        Command::Normalize {
            connection,
            sql,
            page,
        } => {
            let descriptor = connection.descriptor();
            let pagination = page_request(*page, config.page_size)?;
            println!(
                "{}",
                prepare_statement(classify(&descriptor), sql, pagination.as_ref())
            );
        }
        Command::Test { connection } => {
            let version = dispatcher.test_connection(&connection.descriptor()).await?;
            match version {
                Some(version) => println!("Connection OK ({})", version),
                None => println!("Connection OK"),
            }
        }
        Command::Query {
            connection,
            sql,
            page,
            format,
        } => {
            let pagination = page_request(*page, config.page_size)?;
            let outcome = dispatcher
                .execute(&connection.descriptor(), sql, pagination)
                .await?;
            println!("{}", render_outcome(&outcome, *format)?);
        }
        Command::Tables { connection } => {
            println!("{}", format_list(&inspector.list_tables(&connection.descriptor()).await?));
        }
        Command::Views { connection } => {
            println!("{}", format_list(&inspector.list_views(&connection.descriptor()).await?));
        }
        Command::Procedures { connection } => {
            let names = inspector.list_procedures(&connection.descriptor()).await?;
            println!("{}", format_list(&names));
        }
        Command::Columns { connection, table } => {
            let names = inspector.list_columns(&connection.descriptor(), table).await?;
            println!("{}", format_list(&names));
        }
        Command::Databases { connection } => {
            let names = inspector.list_databases(&connection.descriptor()).await?;
            println!("{}", format_list(&names));
        }
        Command::Backup { connection } => {
            let orchestrator = BackupOrchestrator::new(config.backup_settings(), &engine);
            let job = BackupJob::new(connection.descriptor(), config.backup_dir.clone());
            let outcome = with_interrupt(&orchestrator, orchestrator.backup(job)).await;
            return report_job(&outcome);
        }
        Command::Restore { connection, file } => {
            let orchestrator = BackupOrchestrator::new(config.backup_settings(), &engine);
            let job = RestoreJob::new(connection.descriptor(), RestoreSource::Path(file.clone()));
            let outcome = with_interrupt(&orchestrator, orchestrator.restore(job)).await;
            return report_job(&outcome);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn page_request(page: Option<u32>, page_size: u32) -> DbResult<Option<PaginationRequest>> {
    page.map(|page| PaginationRequest::new(page, page_size))
        .transpose()
}

fn render_outcome(outcome: &ExecutionOutcome, format: OutputFormat) -> DbResult<String> {
    let rendered = match (outcome, format) {
        (_, OutputFormat::Json) => serde_json::to_string_pretty(&outcome_to_json(outcome))
            .map_err(|e| DbError::internal(e.to_string()))?,
        (ExecutionOutcome::Rows(result), OutputFormat::Table) => format_as_table(result),
        (ExecutionOutcome::Rows(result), OutputFormat::Markdown) => format_as_markdown(result),
        (ExecutionOutcome::Rows(result), OutputFormat::Csv) => to_csv(result)?,
        (
            ExecutionOutcome::Affected {
                affected_count,
                execution_time_ms,
            },
            _,
        ) => format!(
            "Query OK, {} {} affected ({:.2} sec)",
            affected_count,
            if *affected_count == 1 { "row" } else { "rows" },
            *execution_time_ms as f64 / 1000.0
        ),
    };
    Ok(rendered)
}

/// Await a job; on Ctrl-C cancel it and wait for it to wind down.
async fn with_interrupt<F>(orchestrator: &BackupOrchestrator, job: F) -> JobOutcome
where
    F: Future<Output = JobOutcome>,
{
    tokio::pin!(job);
    tokio::select! {
        outcome = &mut job => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling running job");
            orchestrator.registry().cancel_all().await;
            job.await
        }
    }
}

fn report_job(outcome: &JobOutcome) -> DbResult<ExitCode> {
    let rendered =
        serde_json::to_string_pretty(outcome).map_err(|e| DbError::internal(e.to_string()))?;
    println!("{}", rendered);
    if outcome.success {
        info!(job_id = %outcome.job_id, "Job finished");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
