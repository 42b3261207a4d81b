use std::num::{NonZeroU32, NonZeroUsize};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use crate::collectors::hh::{DEFAULT_API_URL, DEFAULT_USER_AGENT};
use crate::collectors::runner::FetchSettings;
use crate::models::company::CompanyDescriptor;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vacancy-ingest",
    about = "Fetch hh.ru vacancies into PostgreSQL and report on them"
)]
pub struct Config {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Create the schema on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch vacancies for the listed companies and store them
    Fetch(FetchArgs),
    /// Print a report over stored vacancies
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
    /// Serve the read API
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct FetchArgs {
    /// JSON array of {"id", "name", "industry"?, "area"?}. Without it the
    /// unfiltered listing is fetched and grouped by employer.
    #[arg(long, env = "COMPANIES_FILE")]
    pub companies: Option<PathBuf>,

    /// Maximum pages fetched per company
    #[arg(long, default_value = "5")]
    pub max_pages: NonZeroU32,

    /// Vacancies requested per page
    #[arg(long, default_value = "100")]
    pub per_page: NonZeroU32,

    /// Companies fetched in parallel
    #[arg(long, env = "FETCH_CONCURRENCY", default_value = "10")]
    pub concurrency: NonZeroUsize,

    /// Base URL of the hh.ru API
    #[arg(long, env = "HH_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// User-Agent sent to the API
    #[arg(long, env = "HH_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl FetchArgs {
    pub fn settings(&self) -> FetchSettings {
        FetchSettings::new(
            self.max_pages.get(),
            self.per_page.get(),
            self.concurrency.get(),
        )
    }
}

#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    /// Companies with the most vacancies
    TopCompanies {
        #[arg(long, default_value = "10")]
        limit: i64,
    },
    /// Every stored vacancy with its company
    Vacancies,
    /// Average salary midpoint
    AverageSalary,
    /// Vacancies paying more than the average midpoint
    AboveAverage,
    /// Vacancies whose title contains a keyword, ignoring case
    Search { keyword: String },
}

/// Read the companies file.
pub fn load_companies(path: &Path) -> anyhow::Result<Vec<CompanyDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read companies file {}", path.display()))?;
    parse_companies(&raw).with_context(|| format!("Invalid companies file {}", path.display()))
}

pub fn parse_companies(raw: &str) -> anyhow::Result<Vec<CompanyDescriptor>> {
    let companies: Vec<CompanyDescriptor> = serde_json::from_str(raw)?;
    if let Some(blank) = companies.iter().position(|c| c.name.trim().is_empty()) {
        anyhow::bail!("Company at index {blank} has an empty name");
    }
    Ok(companies)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["vacancy-ingest", "--database-url", "postgres://localhost/test"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn fetch_defaults() {
        let config = parse(&["fetch"]);
        let Command::Fetch(args) = config.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.companies, None);
        assert_eq!(args.settings(), FetchSettings::default());
        assert_eq!(args.api_url, DEFAULT_API_URL);
        assert_eq!(args.user_agent, "vacancy-ingest/0.1");
        assert!(config.run_migrations);
    }

    #[test]
    fn fetch_rejects_zero_concurrency() {
        let result = Config::try_parse_from([
            "vacancy-ingest",
            "--database-url",
            "postgres://localhost/test",
            "fetch",
            "--concurrency",
            "0",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn report_search_takes_keyword() {
        let config = parse(&["report", "search", "rust"]);
        match config.command {
            Command::Report { report } => {
                assert_eq!(report, ReportKind::Search { keyword: "rust".into() });
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_companies_file() {
        let companies = parse_companies(
            r#"[
                {"id": "1", "name": "Компания 1", "industry": "IT", "area": "Moscow"},
                {"id": "2", "name": "Компания 2"}
            ]"#,
        )
        .unwrap();
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].industry.as_deref(), Some("IT"));
        assert_eq!(companies[1].area, None);
    }

    #[test]
    fn rejects_blank_company_name() {
        let err = parse_companies(r#"[{"id": "1", "name": "  "}]"#).unwrap_err();
        assert!(err.to_string().contains("index 0"));
    }
}
