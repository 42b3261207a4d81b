// Vacancy collectors: the hh.ru page client, pagination over one employer,
// and the coordinator that fans fetches out and funnels results into storage.

pub mod hh;
pub mod pagination;
pub mod runner;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;

/// One page of the vacancy listing.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (zero-based) of `per_page` items, optionally
    /// restricted to one employer.
    async fn fetch_page(
        &self,
        employer_id: Option<&str>,
        page: u32,
        per_page: u32,
    ) -> Result<Page, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<RawVacancy>,
    /// A short page means there is nothing after it.
    pub is_last: bool,
}

impl Page {
    pub fn new(items: Vec<RawVacancy>, per_page: u32) -> Self {
        let is_last = items.len() < per_page as usize;
        Self { items, is_last }
    }
}

/// Response body of `GET /vacancies`. A body without `items` is an empty page.
#[derive(Debug, Default, Deserialize)]
pub struct PageBody {
    #[serde(default)]
    pub items: Vec<RawVacancy>,
}

/// Vacancy as returned by the API. Every field may be missing or null;
/// defaults are applied by [`crate::models::vacancy::NewVacancy::from_raw`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawVacancy {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub salary: Option<RawSalary>,
    #[serde(default)]
    pub alternate_url: Option<String>,
    #[serde(default)]
    pub employer: Option<RawEmployer>,
    #[serde(default)]
    pub area: Option<RawArea>,
}

impl RawVacancy {
    pub fn employer_name(&self) -> Option<&str> {
        self.employer.as_ref()?.name.as_deref()
    }

    pub fn area_name(&self) -> Option<&str> {
        self.area.as_ref()?.name.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawSalary {
    #[serde(default)]
    pub from: Option<f64>,
    #[serde(default)]
    pub to: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEmployer {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawArea {
    #[serde(default)]
    pub name: Option<String>,
}
