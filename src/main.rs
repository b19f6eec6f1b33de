use anyhow::Context;
use clap::Parser;
use drive_etl::config::cli::{Cli, Command, PlanArgs, RunArgs};
use drive_etl::config::file::FileConfig;
use drive_etl::config::registry::registry;
use drive_etl::config::{AppConfig, DEFAULT_DATASET};
use drive_etl::utils::error::ErrorSeverity;
use drive_etl::utils::logger;
use drive_etl::{CronTrigger, EtlEngine, EtlError, RunReport};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI arguments: {:?}", cli);

    match &cli.command {
        Command::Tables => {
            print_tables(cli.config.as_deref());
            Ok(())
        }
        Command::Plan(args) => {
            let config = load_config(cli.config.as_deref()).unwrap_or_else(|e| fail(&e));
            print_plan(&config, args).unwrap_or_else(|e| fail(&e));
            Ok(())
        }
        Command::Run(args) => {
            let config = Arc::new(load_config(cli.config.as_deref()).unwrap_or_else(|e| fail(&e)));
            let report = run_once(config, args).await.unwrap_or_else(|e| fail(&e));
            write_summary(&report, args.summary_file.as_deref())?;

            if !report.is_success() {
                eprintln!(
                    "{} of {} tasks did not complete",
                    report.failed_tasks().count(),
                    report.tasks.len()
                );
                std::process::exit(1);
            }
            println!(
                "Run {} completed: {} tasks, {} malformed rows dropped",
                report.run_id,
                report.tasks.len(),
                report.dropped_rows()
            );
            Ok(())
        }
        Command::Schedule(args) => {
            let config = Arc::new(load_config(cli.config.as_deref()).unwrap_or_else(|e| fail(&e)));
            let trigger = CronTrigger::new(&config.schedule).unwrap_or_else(|e| fail(&e));
            tracing::info!("Scheduling runs with '{}'", trigger.expression());

            trigger
                .run(|| {
                    let config = config.clone();
                    let args = args.clone();
                    async move {
                        match run_once(config, &args).await {
                            Ok(report) => {
                                if let Err(e) = write_summary(&report, args.summary_file.as_deref()) {
                                    tracing::error!("{:#}", e);
                                }
                            }
                            Err(e) => tracing::error!(
                                "Run aborted: {} ({})",
                                e,
                                e.recovery_suggestion()
                            ),
                        }
                    }
                })
                .await
                .unwrap_or_else(|e| fail(&e));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> drive_etl::Result<AppConfig> {
    let file = path.map(FileConfig::from_file).transpose()?;
    AppConfig::from_env(file)
}

async fn run_once(config: Arc<AppConfig>, args: &RunArgs) -> drive_etl::Result<RunReport> {
    let engine = EtlEngine::connect(config).await?;
    engine.run(&args.plan.only, args.plan.chain_mode).await
}

fn write_summary(report: &RunReport, path: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    report
        .write_json(path)
        .with_context(|| format!("writing run summary to {}", path.display()))?;
    tracing::info!("Run summary written to {}", path.display());
    Ok(())
}

fn print_plan(config: &AppConfig, args: &PlanArgs) -> drive_etl::Result<()> {
    let chain_mode = args.chain_mode.unwrap_or(config.chain_mode);
    let graph = EtlEngine::plan(config, &args.only, chain_mode)?;

    println!("{} tasks ({} chain)", graph.len(), graph.chain_mode());
    for task in graph.task_ids() {
        let upstream = graph.upstream_of(&task);
        if upstream.is_empty() {
            println!("  {}", task);
        } else {
            println!("  {} <- {}", task, upstream.join(", "));
        }
    }
    Ok(())
}

fn print_tables(config_path: Option<&Path>) {
    // Listing works without a complete configuration.
    let (project, dataset) = match load_config(config_path) {
        Ok(config) => (config.project_id, config.dataset),
        Err(e) => {
            tracing::debug!("Listing tables without configuration: {}", e);
            ("<project>".to_string(), DEFAULT_DATASET.to_string())
        }
    };

    for table in registry(&project, &dataset) {
        println!(
            "{} -> {} ({} columns)",
            table.object_path(),
            table.destination,
            table.columns.len()
        );
        println!("    {}", table.column_names().join(", "));
    }
}

fn fail(e: &EtlError) -> ! {
    tracing::error!(
        "{} (category: {:?}, severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("{}", e.user_friendly_message());
    eprintln!("Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code)
}
