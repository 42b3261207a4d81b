//! Test doubles for the fetch pipeline.
//!
//! [`ScriptedPageSource`] replays canned pages per employer and records every
//! request; [`MemoryRepository`] implements both repository traits over
//! in-process vectors with the same conflict rules as the Postgres schema.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::collectors::{Page, PageBody, PageSource, RawSalary, RawVacancy};
use crate::error::{FetchError, PersistenceError};
use crate::models::company::{Company, CompanyVacancyCount, NewCompany};
use crate::models::vacancy::{NewVacancy, Vacancy, VacancyListing, salary_midpoint};
use crate::repository::{IngestRepository, ReportRepository};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a listing the way the API would return it.
pub fn vacancy(title: &str, from: Option<i32>, to: Option<i32>, url: &str) -> RawVacancy {
    let salary = (from.is_some() || to.is_some()).then(|| RawSalary {
        from: from.map(f64::from),
        to: to.map(f64::from),
        currency: Some("RUR".to_string()),
    });
    RawVacancy {
        name: Some(title.to_string()),
        salary,
        alternate_url: Some(url.to_string()),
        ..Default::default()
    }
}

/// `count` salary-less listings with urls `{prefix}/0`, `{prefix}/1`, ...
pub fn listings(prefix: &str, count: usize) -> Vec<RawVacancy> {
    (0..count)
        .map(|i| vacancy(&format!("{prefix} #{i}"), None, None, &format!("{prefix}/{i}")))
        .collect()
}

#[derive(Debug, Clone)]
pub enum ScriptedPage {
    Items(Vec<RawVacancy>),
    /// Answer with a non-success HTTP status.
    Status(u16),
    /// Answer with a body that is not JSON.
    Malformed,
    Panic,
}

/// A [`PageSource`] that replays scripted pages. Pages past the end of a
/// script, and employers without one, come back empty.
#[derive(Default)]
pub struct ScriptedPageSource {
    scripts: HashMap<Option<String>, Vec<ScriptedPage>>,
    delays: HashMap<Option<String>, Duration>,
    calls: Mutex<Vec<(Option<String>, u32)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(mut self, employer_id: Option<&str>, pages: Vec<ScriptedPage>) -> Self {
        self.scripts.insert(employer_id.map(str::to_string), pages);
        self
    }

    /// Sleep before answering each page for this employer.
    pub fn with_delay(mut self, employer_id: Option<&str>, delay: Duration) -> Self {
        self.delays.insert(employer_id.map(str::to_string), delay);
        self
    }

    /// Every `(employer_id, page)` requested, in arrival order.
    pub fn calls(&self) -> Vec<(Option<String>, u32)> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, employer_id: Option<&str>) -> Vec<u32> {
        lock(&self.calls)
            .iter()
            .filter(|(id, _)| id.as_deref() == employer_id)
            .map(|(_, page)| *page)
            .collect()
    }

    /// Highest number of page requests that were in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageSource for ScriptedPageSource {
    async fn fetch_page(
        &self,
        employer_id: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page, FetchError> {
        let key = employer_id.map(str::to_string);
        lock(&self.calls).push((key.clone(), page));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }

        let scripted = self
            .scripts
            .get(&key)
            .and_then(|pages| pages.get(page as usize))
            .cloned()
            .unwrap_or(ScriptedPage::Items(Vec::new()));

        match scripted {
            ScriptedPage::Items(items) => Ok(Page::new(items, per_page)),
            ScriptedPage::Status(status) => Err(FetchError::Transport { status }),
            ScriptedPage::Malformed => {
                let err = serde_json::from_str::<PageBody>("<html>Bad gateway</html>")
                    .expect_err("html is not a vacancy page");
                Err(FetchError::Decode(err))
            }
            ScriptedPage::Panic => panic!("scripted panic for page {page}"),
        }
    }
}

#[derive(Default)]
struct MemoryState {
    companies: Vec<Company>,
    vacancies: Vec<Vacancy>,
}

/// In-memory storage with unique company names, unique vacancy urls and
/// the company foreign key enforced.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    failing_companies: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    upsert_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `upsert_company` fail for this name.
    pub fn fail_company(&self, name: &str) {
        lock(&self.failing_companies).insert(name.to_string());
    }

    /// Make every call fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn companies(&self) -> Vec<Company> {
        lock(&self.state).companies.clone()
    }

    pub fn vacancies(&self) -> Vec<Vacancy> {
        lock(&self.state).vacancies.clone()
    }

    pub fn company_id(&self, name: &str) -> Option<i32> {
        lock(&self.state)
            .companies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("connection refused".to_string()));
        }
        Ok(())
    }

    fn listings(&self) -> Vec<VacancyListing> {
        let state = lock(&self.state);
        state
            .vacancies
            .iter()
            .filter_map(|v| {
                let company = state.companies.iter().find(|c| c.id == v.company_id)?;
                Some(VacancyListing {
                    title: v.title.clone(),
                    salary_min: v.salary_min,
                    salary_max: v.salary_max,
                    url: v.url.clone(),
                    company_name: company.name.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl IngestRepository for MemoryRepository {
    async fn upsert_company(&self, company: &NewCompany) -> Result<i32, PersistenceError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if lock(&self.failing_companies).contains(&company.name) {
            return Err(PersistenceError::Backend(format!(
                "insert into companies failed for '{}'",
                company.name
            )));
        }

        let mut state = lock(&self.state);
        if let Some(existing) = state.companies.iter().find(|c| c.name == company.name) {
            return Ok(existing.id);
        }

        let id = state.companies.len() as i32 + 1;
        state.companies.push(Company {
            id,
            name: company.name.clone(),
            industry: company.industry.clone(),
            area: company.area.clone(),
        });
        Ok(id)
    }

    async fn bulk_upsert_vacancies(&self, vacancies: &[NewVacancy]) -> Result<u64, PersistenceError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut state = lock(&self.state);
        if let Some(orphan) = vacancies
            .iter()
            .find(|v| !state.companies.iter().any(|c| c.id == v.company_id))
        {
            return Err(PersistenceError::Backend(format!(
                "company {} does not exist",
                orphan.company_id
            )));
        }

        let mut inserted = 0;
        for vacancy in vacancies {
            if state.vacancies.iter().any(|v| v.url == vacancy.url) {
                continue;
            }
            let id = state.vacancies.len() as i32 + 1;
            state.vacancies.push(Vacancy {
                id,
                title: vacancy.title.clone(),
                salary_min: vacancy.salary_min,
                salary_max: vacancy.salary_max,
                url: vacancy.url.clone(),
                company_id: vacancy.company_id,
            });
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[async_trait]
impl ReportRepository for MemoryRepository {
    async fn ping(&self) -> Result<(), PersistenceError> {
        self.check_available()
    }

    async fn top_companies(&self, limit: i64) -> Result<Vec<CompanyVacancyCount>, PersistenceError> {
        self.check_available()?;
        let state = lock(&self.state);
        let mut counts: Vec<CompanyVacancyCount> = state
            .companies
            .iter()
            .map(|c| CompanyVacancyCount {
                name: c.name.clone(),
                vacancies: state
                    .vacancies
                    .iter()
                    .filter(|v| v.company_id == c.id)
                    .count() as i64,
            })
            .collect();
        counts.sort_by(|a, b| b.vacancies.cmp(&a.vacancies).then_with(|| a.name.cmp(&b.name)));
        counts.truncate(limit.max(0) as usize);
        Ok(counts)
    }

    async fn all_vacancies(&self) -> Result<Vec<VacancyListing>, PersistenceError> {
        self.check_available()?;
        Ok(self.listings())
    }

    async fn average_salary(&self) -> Result<Option<f64>, PersistenceError> {
        self.check_available()?;
        let midpoints: Vec<f64> = lock(&self.state)
            .vacancies
            .iter()
            .filter_map(|v| salary_midpoint(v.salary_min, v.salary_max))
            .collect();
        if midpoints.is_empty() {
            return Ok(None);
        }
        Ok(Some(midpoints.iter().sum::<f64>() / midpoints.len() as f64))
    }

    async fn vacancies_above_average(&self) -> Result<Vec<VacancyListing>, PersistenceError> {
        let Some(avg) = self.average_salary().await? else {
            return Ok(Vec::new());
        };
        Ok(self
            .listings()
            .into_iter()
            .filter(|v| v.midpoint().unwrap_or(0.0) > avg)
            .collect())
    }

    async fn search_vacancies(&self, keyword: &str) -> Result<Vec<VacancyListing>, PersistenceError> {
        self.check_available()?;
        let needle = keyword.to_lowercase();
        Ok(self
            .listings()
            .into_iter()
            .filter(|v| v.title.to_lowercase().contains(&needle))
            .collect())
    }
}
