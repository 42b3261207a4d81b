use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vacancy_ingest::collectors::hh::HhClient;
use vacancy_ingest::collectors::runner::FetchCoordinator;
use vacancy_ingest::config::{self, Command, Config, FetchArgs};
use vacancy_ingest::repository::PgRepository;
use vacancy_ingest::{db, report, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vacancy_ingest=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Database is unreachable")?;

    execute(PgRepository::new(pool), config.run_migrations, config.command).await
}

/// Runs the command and closes the pool on every exit path.
async fn execute(repo: PgRepository, run_migrations: bool, command: Command) -> anyhow::Result<()> {
    let result = match migrate(&repo, run_migrations).await {
        Ok(()) => run_command(command, &repo).await,
        Err(e) => Err(e),
    };
    repo.close().await;
    result
}

async fn migrate(repo: &PgRepository, enabled: bool) -> anyhow::Result<()> {
    if enabled {
        tracing::info!("Running database migrations...");
        db::run_migrations(repo.pool()).await?;
        tracing::info!("Migrations complete");
    }
    Ok(())
}

async fn run_command(command: Command, repo: &PgRepository) -> anyhow::Result<()> {
    match command {
        Command::Fetch(args) => fetch(args, repo).await,
        Command::Report { report } => {
            let mut stdout = std::io::stdout().lock();
            report::write_report(repo, &report, &mut stdout).await
        }
        Command::Serve { listen_addr } => {
            let app = routes::app(Arc::new(repo.clone()));
            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!("Listening on {listen_addr}");
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}

async fn fetch(args: FetchArgs, repo: &PgRepository) -> anyhow::Result<()> {
    let client = HhClient::new(&args.api_url, &args.user_agent)?;
    let coordinator = FetchCoordinator::new(client, args.settings());

    let summary = match &args.companies {
        Some(path) => {
            let companies = config::load_companies(path)?;
            coordinator.run(repo, companies).await
        }
        None => {
            tracing::info!("No companies file given, fetching the unfiltered listing");
            coordinator.run_unfiltered(repo).await
        }
    };

    tracing::info!(
        companies = summary.companies,
        persisted = summary.persisted,
        empty = summary.empty,
        failed = summary.failed,
        "Inserted {} new vacancies",
        summary.vacancies_inserted
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use vacancy_ingest::config::ReportKind;

    #[tokio::test]
    async fn failed_migration_still_closes_the_pool() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(500))
            .connect_lazy(&format!("postgres://user:pass@{addr}/db"))
            .unwrap();

        let result = execute(
            PgRepository::new(pool.clone()),
            true,
            Command::Report {
                report: ReportKind::AverageSalary,
            },
        )
        .await;

        assert!(result.is_err());
        assert!(pool.is_closed());
    }
}
