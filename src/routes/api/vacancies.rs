use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::vacancy::VacancyListing;
use crate::routes::api::Reports;

#[derive(Debug, Deserialize)]
pub struct SearchFilters {
    pub keyword: String,
}

#[derive(Debug, Serialize)]
pub struct AverageSalary {
    pub average_salary: Option<f64>,
}

pub async fn list(State(reports): State<Reports>) -> Result<Json<Vec<VacancyListing>>, AppError> {
    let vacancies = reports.all_vacancies().await?;
    Ok(Json(vacancies))
}

pub async fn average_salary(State(reports): State<Reports>) -> Result<Json<AverageSalary>, AppError> {
    let average_salary = reports.average_salary().await?;
    Ok(Json(AverageSalary { average_salary }))
}

pub async fn above_average(
    State(reports): State<Reports>,
) -> Result<Json<Vec<VacancyListing>>, AppError> {
    let vacancies = reports.vacancies_above_average().await?;
    Ok(Json(vacancies))
}

pub async fn search(
    State(reports): State<Reports>,
    Query(filters): Query<SearchFilters>,
) -> Result<Json<Vec<VacancyListing>>, AppError> {
    let keyword = filters.keyword.trim();
    if keyword.is_empty() {
        return Err(AppError::BadRequest("keyword must not be empty".to_string()));
    }
    let vacancies = reports.search_vacancies(keyword).await?;
    Ok(Json(vacancies))
}
