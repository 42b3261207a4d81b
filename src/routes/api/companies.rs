use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::company::CompanyVacancyCount;
use crate::routes::api::Reports;

const DEFAULT_TOP_LIMIT: i64 = 10;
const MAX_TOP_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct TopFilters {
    pub limit: Option<i64>,
}

/// GET /api/v1/companies/top
pub async fn top(
    State(reports): State<Reports>,
    Query(filters): Query<TopFilters>,
) -> Result<Json<Vec<CompanyVacancyCount>>, AppError> {
    let limit = filters
        .limit
        .unwrap_or(DEFAULT_TOP_LIMIT)
        .clamp(1, MAX_TOP_LIMIT);
    let companies = reports.top_companies(limit).await?;
    Ok(Json(companies))
}
