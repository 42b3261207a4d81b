use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::PersistenceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub industry: Option<String>,
    pub area: Option<String>,
}

/// A company to fetch vacancies for, as listed in the companies file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompanyDescriptor {
    /// hh.ru employer id. `None` fetches the unfiltered listing.
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
}

impl CompanyDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            industry: None,
            area: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCompany {
    pub name: String,
    pub industry: Option<String>,
    pub area: Option<String>,
}

impl From<&CompanyDescriptor> for NewCompany {
    fn from(descriptor: &CompanyDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            industry: descriptor.industry.clone(),
            area: descriptor.area.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CompanyVacancyCount {
    pub name: String,
    pub vacancies: i64,
}

impl Company {
    /// Insert the company unless one with the same name exists, and return
    /// the id of whichever row ends up owning the name. Existing rows are
    /// never updated.
    pub async fn find_or_create(pool: &PgPool, input: &NewCompany) -> Result<i32, PersistenceError> {
        let inserted: Option<(i32,)> = sqlx::query_as(
            "INSERT INTO companies (name, industry, area) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.industry)
        .bind(&input.area)
        .fetch_optional(pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok(id);
        }

        let (id,): (i32,) = sqlx::query_as("SELECT id FROM companies WHERE name = $1")
            .bind(&input.name)
            .fetch_one(pool)
            .await?;
        Ok(id)
    }

    pub async fn get_by_name(pool: &PgPool, name: &str) -> Result<Option<Company>, PersistenceError> {
        let company = sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(company)
    }

    /// Companies ranked by how many vacancies they own, including those with none.
    pub async fn top_by_vacancy_count(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<CompanyVacancyCount>, PersistenceError> {
        let rows = sqlx::query_as::<_, CompanyVacancyCount>(
            "SELECT c.name, COUNT(v.id) AS vacancies
             FROM companies c
             LEFT JOIN vacancies v ON c.id = v.company_id
             GROUP BY c.id, c.name
             ORDER BY COUNT(v.id) DESC, c.name
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}
