use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};

use crate::collectors::pagination::{self, Completion, CompanyVacancies};
use crate::collectors::{PageSource, RawVacancy};
use crate::error::{IngestError, PersistenceError};
use crate::models::company::{CompanyDescriptor, NewCompany};
use crate::models::vacancy::NewVacancy;
use crate::repository::IngestRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Upper bound on pages requested per company.
    pub max_pages: u32,
    pub per_page: u32,
    /// Companies fetched at the same time.
    pub concurrency: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_pages: 5,
            per_page: 100,
            concurrency: 10,
        }
    }
}

impl FetchSettings {
    pub fn new(max_pages: u32, per_page: u32, concurrency: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
            per_page: per_page.max(1),
            concurrency: concurrency.max(1),
        }
    }
}

/// Per-run tally of company outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub companies: usize,
    /// Companies whose vacancies reached storage.
    pub persisted: usize,
    /// Companies that returned no vacancies; nothing was stored for them.
    pub empty: usize,
    /// Companies whose pagination stopped on an HTTP error status.
    pub truncated: usize,
    pub failed: usize,
    /// Listings dropped in unfiltered mode for lack of an employer name.
    pub skipped_vacancies: usize,
    pub vacancies_inserted: u64,
}

/// Outcome of one company's fetch task, sent to the persisting consumer.
struct FetchReport {
    company: CompanyDescriptor,
    outcome: Result<CompanyVacancies, IngestError>,
}

/// Fans company fetches out over a bounded set of tokio tasks and persists
/// their results one company at a time from the calling task.
pub struct FetchCoordinator<S> {
    source: Arc<S>,
    settings: FetchSettings,
}

impl<S> FetchCoordinator<S>
where
    S: PageSource + 'static,
{
    pub fn new(source: S, settings: FetchSettings) -> Self {
        Self::with_shared_source(Arc::new(source), settings)
    }

    pub fn with_shared_source(source: Arc<S>, settings: FetchSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> FetchSettings {
        self.settings
    }

    /// Fetch every company and persist what came back.
    ///
    /// Fetches run on spawned tasks, at most `concurrency` at once. The
    /// repository is only touched from this task, so storage calls never
    /// overlap. A failing company is logged and counted; it never stops
    /// the others.
    pub async fn run<R>(&self, repo: &R, companies: Vec<CompanyDescriptor>) -> RunSummary
    where
        R: IngestRepository + ?Sized,
    {
        let started = Instant::now();
        let mut summary = RunSummary {
            companies: companies.len(),
            ..Default::default()
        };
        if companies.is_empty() {
            return summary;
        }

        let (tx, mut rx) = mpsc::channel(companies.len());
        let permits = Arc::new(Semaphore::new(self.settings.concurrency));

        tracing::info!(
            companies = companies.len(),
            concurrency = self.settings.concurrency,
            max_pages = self.settings.max_pages,
            "Dispatching company fetches"
        );

        for company in companies {
            let tx = tx.clone();
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let settings = self.settings;

            tokio::spawn(async move {
                let outcome = {
                    // The semaphore is never closed, so acquiring only waits.
                    let _permit = permits.acquire_owned().await.ok();
                    tracing::debug!(company = %company.name, "Fetching vacancies");
                    fetch_company(source.as_ref(), &company, settings).await
                };
                // Capacity equals the number of companies, so this never waits.
                let _ = tx.send(FetchReport { company, outcome }).await;
            });
        }
        drop(tx);

        while let Some(report) = rx.recv().await {
            record(repo, report, &mut summary).await;
        }

        tracing::info!(
            persisted = summary.persisted,
            empty = summary.empty,
            truncated = summary.truncated,
            failed = summary.failed,
            inserted = summary.vacancies_inserted,
            "Fetch run finished in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        summary
    }

    /// Fetch the listing without an employer filter and store the
    /// vacancies grouped by the employer named on each listing.
    pub async fn run_unfiltered<R>(&self, repo: &R) -> RunSummary
    where
        R: IngestRepository + ?Sized,
    {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let fetched = match pagination::fetch_all(
            self.source.as_ref(),
            None,
            self.settings.max_pages,
            self.settings.per_page,
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!("Failed to fetch unfiltered vacancy listing: {e}");
                summary.failed = 1;
                return summary;
            }
        };

        if let Completion::Truncated { status, page } = fetched.completion {
            tracing::warn!(status, page, "Unfiltered listing truncated by HTTP error");
            summary.truncated = 1;
        }

        let (groups, skipped) = group_by_employer(fetched.items);
        if skipped > 0 {
            tracing::warn!("Skipped {skipped} vacancies without an employer name");
        }
        summary.companies = groups.len();
        summary.skipped_vacancies = skipped;

        for (company, items) in groups {
            persist(repo, &company, &items, &mut summary).await;
        }

        tracing::info!(
            companies = summary.companies,
            inserted = summary.vacancies_inserted,
            "Unfiltered fetch finished in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        summary
    }
}

async fn fetch_company<S>(
    source: &S,
    company: &CompanyDescriptor,
    settings: FetchSettings,
) -> Result<CompanyVacancies, IngestError>
where
    S: PageSource + ?Sized,
{
    let fetch = pagination::fetch_all(
        source,
        company.id.as_deref(),
        settings.max_pages,
        settings.per_page,
    );

    match AssertUnwindSafe(fetch).catch_unwind().await {
        Ok(result) => Ok(result?),
        Err(payload) => Err(IngestError::Panicked(panic_message(payload.as_ref()))),
    }
}

async fn record<R>(repo: &R, report: FetchReport, summary: &mut RunSummary)
where
    R: IngestRepository + ?Sized,
{
    let FetchReport { company, outcome } = report;

    let fetched = match outcome {
        Ok(fetched) => fetched,
        Err(e) => {
            tracing::error!(company = %company.name, "Failed to fetch vacancies: {e}");
            summary.failed += 1;
            return;
        }
    };

    if let Completion::Truncated { status, page } = fetched.completion {
        tracing::warn!(
            company = %company.name,
            status,
            page,
            kept = fetched.items.len(),
            "Pagination stopped by HTTP error, keeping earlier pages"
        );
        summary.truncated += 1;
    }

    persist(repo, &company, &fetched.items, summary).await;
}

async fn persist<R>(repo: &R, company: &CompanyDescriptor, items: &[RawVacancy], summary: &mut RunSummary)
where
    R: IngestRepository + ?Sized,
{
    if items.is_empty() {
        tracing::info!(company = %company.name, "No vacancies found");
        summary.empty += 1;
        return;
    }

    match ingest_company(repo, &NewCompany::from(company), items).await {
        Ok(inserted) => {
            tracing::info!(
                company = %company.name,
                fetched = items.len(),
                inserted,
                "Stored vacancies"
            );
            summary.persisted += 1;
            summary.vacancies_inserted += inserted;
        }
        Err(e) => {
            tracing::error!(company = %company.name, "Failed to store vacancies: {e}");
            summary.failed += 1;
        }
    }
}

/// Upsert the company, then insert its vacancies in one batch.
/// Does nothing for an empty batch.
pub async fn ingest_company<R>(
    repo: &R,
    company: &NewCompany,
    items: &[RawVacancy],
) -> Result<u64, PersistenceError>
where
    R: IngestRepository + ?Sized,
{
    if items.is_empty() {
        return Ok(0);
    }

    let company_id = repo.upsert_company(company).await?;

    let vacancies: Vec<NewVacancy> = items
        .iter()
        .map(|raw| NewVacancy::from_raw(raw, company_id))
        .inspect(|v| {
            tracing::debug!(
                company = %company.name,
                salary_min = ?v.salary_min,
                salary_max = ?v.salary_max,
                url = %v.url,
                "Vacancy: {}",
                v.title
            )
        })
        .collect();

    repo.bulk_upsert_vacancies(&vacancies).await
}

/// Group listings by employer name, in first-seen order. Returns the
/// groups and the number of listings without an employer name.
fn group_by_employer(items: Vec<RawVacancy>) -> (Vec<(CompanyDescriptor, Vec<RawVacancy>)>, usize) {
    let mut groups: Vec<(CompanyDescriptor, Vec<RawVacancy>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0;

    for item in items {
        let Some(name) = item.employer_name().map(str::to_string) else {
            skipped += 1;
            continue;
        };

        match index.get(&name) {
            Some(&i) => groups[i].1.push(item),
            None => {
                let descriptor = CompanyDescriptor {
                    id: item.employer.as_ref().and_then(|e| e.id.clone()),
                    name: name.clone(),
                    industry: None,
                    area: item.area_name().map(str::to_string),
                };
                index.insert(name, groups.len());
                groups.push((descriptor, vec![item]));
            }
        }
    }

    (groups, skipped)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
