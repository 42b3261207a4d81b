use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::collectors::RawVacancy;
use crate::error::PersistenceError;

/// Five bind parameters per row keeps each statement far below the
/// Postgres limit of 65535.
const MAX_ROWS_PER_INSERT: usize = 1000;

const MIDPOINT_SQL: &str =
    "((COALESCE(v.salary_min, 0)::float8 + COALESCE(v.salary_max, 0)::float8) / 2.0)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Vacancy {
    pub id: i32,
    pub title: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: String,
    pub company_id: i32,
}

/// A vacancy normalized from the API shape, ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVacancy {
    pub title: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: String,
    pub company_id: i32,
}

impl NewVacancy {
    /// Stored when the listing has no `name`.
    pub const DEFAULT_TITLE: &'static str = "Не указано";
    /// Stored when the listing has no `alternate_url`. Every such vacancy
    /// collapses into a single row because `url` is unique.
    pub const DEFAULT_URL: &'static str = "Нет ссылки";

    /// Missing fields take the documented defaults; salary bounds stay
    /// absent when the salary object or the bound itself is missing.
    pub fn from_raw(raw: &RawVacancy, company_id: i32) -> Self {
        let (salary_min, salary_max) = raw
            .salary
            .as_ref()
            .map(|s| (s.from.and_then(to_whole), s.to.and_then(to_whole)))
            .unwrap_or((None, None));

        Self {
            title: raw
                .name
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_TITLE.to_string()),
            salary_min,
            salary_max,
            url: raw
                .alternate_url
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_URL.to_string()),
            company_id,
        }
    }
}

/// Amounts outside the `integer` column range are treated as missing.
fn to_whole(amount: f64) -> Option<i32> {
    let rounded = amount.round();
    (f64::from(i32::MIN)..=f64::from(i32::MAX))
        .contains(&rounded)
        .then_some(rounded as i32)
}

/// Escapes LIKE metacharacters so the keyword matches literally.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Vacancy joined with the owning company's name.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct VacancyListing {
    pub title: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub url: String,
    pub company_name: String,
}

impl VacancyListing {
    pub fn midpoint(&self) -> Option<f64> {
        salary_midpoint(self.salary_min, self.salary_max)
    }
}

/// Midpoint of a salary range with a missing bound counted as zero.
/// `None` when neither bound is known.
pub fn salary_midpoint(min: Option<i32>, max: Option<i32>) -> Option<f64> {
    if min.is_none() && max.is_none() {
        return None;
    }
    Some((f64::from(min.unwrap_or(0)) + f64::from(max.unwrap_or(0))) / 2.0)
}

impl Vacancy {
    /// Insert all vacancies, skipping any whose url already exists.
    /// Returns how many rows were actually inserted.
    pub async fn bulk_insert(pool: &PgPool, vacancies: &[NewVacancy]) -> Result<u64, PersistenceError> {
        if vacancies.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        let mut inserted = 0;

        for chunk in vacancies.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO vacancies (title, salary_min, salary_max, url, company_id) ",
            );
            builder.push_values(chunk, |mut row, vacancy| {
                row.push_bind(&vacancy.title)
                    .push_bind(vacancy.salary_min)
                    .push_bind(vacancy.salary_max)
                    .push_bind(&vacancy.url)
                    .push_bind(vacancy.company_id);
            });
            builder.push(" ON CONFLICT (url) DO NOTHING");

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn get_by_url(pool: &PgPool, url: &str) -> Result<Option<Vacancy>, PersistenceError> {
        let vacancy = sqlx::query_as::<_, Vacancy>("SELECT * FROM vacancies WHERE url = $1")
            .bind(url)
            .fetch_optional(pool)
            .await?;
        Ok(vacancy)
    }

    pub async fn list_with_company(pool: &PgPool) -> Result<Vec<VacancyListing>, PersistenceError> {
        let rows = sqlx::query_as::<_, VacancyListing>(
            "SELECT v.title, v.salary_min, v.salary_max, v.url, c.name AS company_name
             FROM vacancies v
             JOIN companies c ON v.company_id = c.id
             ORDER BY v.id",
        )
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Average midpoint salary over vacancies with at least one known bound.
    pub async fn average_salary(pool: &PgPool) -> Result<Option<f64>, PersistenceError> {
        let (avg,): (Option<f64>,) = sqlx::query_as(&format!(
            "SELECT AVG({MIDPOINT_SQL})
             FROM vacancies v
             WHERE v.salary_min IS NOT NULL OR v.salary_max IS NOT NULL"
        ))
        .fetch_one(pool)
        .await?;
        Ok(avg)
    }

    pub async fn above_average_salary(pool: &PgPool) -> Result<Vec<VacancyListing>, PersistenceError> {
        let Some(avg) = Self::average_salary(pool).await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query_as::<_, VacancyListing>(&format!(
            "SELECT v.title, v.salary_min, v.salary_max, v.url, c.name AS company_name
             FROM vacancies v
             JOIN companies c ON v.company_id = c.id
             WHERE {MIDPOINT_SQL} > $1
             ORDER BY v.id"
        ))
        .bind(avg)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn search_title(pool: &PgPool, keyword: &str) -> Result<Vec<VacancyListing>, PersistenceError> {
        let rows = sqlx::query_as::<_, VacancyListing>(
            "SELECT v.title, v.salary_min, v.salary_max, v.url, c.name AS company_name
             FROM vacancies v
             JOIN companies c ON v.company_id = c.id
             WHERE v.title ILIKE $1 ESCAPE '\\'
             ORDER BY v.id",
        )
        .bind(like_pattern(keyword))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::RawSalary;

    fn raw(json: &str) -> RawVacancy {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn normalizes_complete_listing() {
        let vacancy = NewVacancy::from_raw(
            &raw(r#"{
                "name": "Rust developer",
                "salary": {"from": 1000, "to": 2000, "currency": "RUR"},
                "alternate_url": "https://hh.ru/vacancy/1"
            }"#),
            7,
        );
        assert_eq!(
            vacancy,
            NewVacancy {
                title: "Rust developer".into(),
                salary_min: Some(1000),
                salary_max: Some(2000),
                url: "https://hh.ru/vacancy/1".into(),
                company_id: 7,
            }
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let vacancy = NewVacancy::from_raw(&raw("{}"), 1);
        assert_eq!(vacancy.title, NewVacancy::DEFAULT_TITLE);
        assert_eq!(vacancy.url, NewVacancy::DEFAULT_URL);
        assert_eq!(vacancy.salary_min, None);
        assert_eq!(vacancy.salary_max, None);
    }

    #[test]
    fn null_salary_bounds_stay_absent() {
        let vacancy = NewVacancy::from_raw(&raw(r#"{"salary": {"from": null}}"#), 1);
        assert_eq!((vacancy.salary_min, vacancy.salary_max), (None, None));

        let vacancy = NewVacancy::from_raw(&raw(r#"{"salary": null}"#), 1);
        assert_eq!((vacancy.salary_min, vacancy.salary_max), (None, None));
    }

    #[test]
    fn fractional_salary_is_rounded() {
        let listing = RawVacancy {
            salary: Some(RawSalary {
                from: Some(999.6),
                to: None,
                currency: None,
            }),
            ..Default::default()
        };
        assert_eq!(NewVacancy::from_raw(&listing, 1).salary_min, Some(1000));
    }

    #[test]
    fn out_of_range_salary_is_dropped() {
        let listing = RawVacancy {
            salary: Some(RawSalary {
                from: Some(1e12),
                to: Some(f64::NAN),
                currency: None,
            }),
            ..Default::default()
        };
        let vacancy = NewVacancy::from_raw(&listing, 1);
        assert_eq!((vacancy.salary_min, vacancy.salary_max), (None, None));
        assert_eq!(to_whole(f64::from(i32::MAX)), Some(i32::MAX));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("rust"), "%rust%");
        assert_eq!(like_pattern("50%"), r"%50\%%");
        assert_eq!(like_pattern("a_b"), r"%a\_b%");
        assert_eq!(like_pattern(r"c:\x"), r"%c:\\x%");
    }

    #[test]
    fn midpoint_counts_missing_bound_as_zero() {
        assert_eq!(salary_midpoint(Some(1000), Some(2000)), Some(1500.0));
        assert_eq!(salary_midpoint(None, Some(3000)), Some(1500.0));
        assert_eq!(salary_midpoint(None, None), None);
    }
}
