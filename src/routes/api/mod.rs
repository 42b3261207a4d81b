pub mod companies;
pub mod vacancies;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::repository::ReportRepository;

pub type Reports = Arc<dyn ReportRepository>;

pub fn router(reports: Reports) -> Router {
    let api = Router::new()
        .route("/companies/top", get(companies::top))
        .route("/vacancies", get(vacancies::list))
        .route("/vacancies/average-salary", get(vacancies::average_salary))
        .route("/vacancies/above-average", get(vacancies::above_average))
        .route("/vacancies/search", get(vacancies::search))
        .with_state(reports);

    Router::new().nest("/api/v1", api)
}
