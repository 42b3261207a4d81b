use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PersistenceError;
use crate::models::company::{Company, CompanyVacancyCount, NewCompany};
use crate::models::vacancy::{NewVacancy, Vacancy, VacancyListing};

/// Write side used by the fetch coordinator.
#[async_trait]
pub trait IngestRepository: Send + Sync {
    /// Insert-or-fetch by name. Never updates an existing company.
    async fn upsert_company(&self, company: &NewCompany) -> Result<i32, PersistenceError>;

    /// Insert every vacancy whose url is new; returns the number inserted.
    async fn bulk_upsert_vacancies(&self, vacancies: &[NewVacancy]) -> Result<u64, PersistenceError>;
}

/// Read side used by the report command and the HTTP API.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn ping(&self) -> Result<(), PersistenceError>;

    async fn top_companies(&self, limit: i64) -> Result<Vec<CompanyVacancyCount>, PersistenceError>;

    async fn all_vacancies(&self) -> Result<Vec<VacancyListing>, PersistenceError>;

    /// Mean salary midpoint over vacancies with at least one known bound.
    async fn average_salary(&self) -> Result<Option<f64>, PersistenceError>;

    async fn vacancies_above_average(&self) -> Result<Vec<VacancyListing>, PersistenceError>;

    /// Case-insensitive substring match on the title.
    async fn search_vacancies(&self, keyword: &str) -> Result<Vec<VacancyListing>, PersistenceError>;
}

/// PostgreSQL-backed repository. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections to return, then close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl IngestRepository for PgRepository {
    async fn upsert_company(&self, company: &NewCompany) -> Result<i32, PersistenceError> {
        Company::find_or_create(&self.pool, company).await
    }

    async fn bulk_upsert_vacancies(&self, vacancies: &[NewVacancy]) -> Result<u64, PersistenceError> {
        Vacancy::bulk_insert(&self.pool, vacancies).await
    }
}

#[async_trait]
impl ReportRepository for PgRepository {
    async fn ping(&self) -> Result<(), PersistenceError> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn top_companies(&self, limit: i64) -> Result<Vec<CompanyVacancyCount>, PersistenceError> {
        Company::top_by_vacancy_count(&self.pool, limit).await
    }

    async fn all_vacancies(&self) -> Result<Vec<VacancyListing>, PersistenceError> {
        Vacancy::list_with_company(&self.pool).await
    }

    async fn average_salary(&self) -> Result<Option<f64>, PersistenceError> {
        Vacancy::average_salary(&self.pool).await
    }

    async fn vacancies_above_average(&self) -> Result<Vec<VacancyListing>, PersistenceError> {
        Vacancy::above_average_salary(&self.pool).await
    }

    async fn search_vacancies(&self, keyword: &str) -> Result<Vec<VacancyListing>, PersistenceError> {
        Vacancy::search_title(&self.pool, keyword).await
    }
}
