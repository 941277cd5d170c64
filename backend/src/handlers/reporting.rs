//! Reporting handlers for dashboards and data export

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Action, Resource};

use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::finance::resolve_range;
use crate::services::reporting::{export_to_csv, DashboardMetrics, ReportingService};
use crate::AppState;

#[derive(Deserialize)]
pub struct ReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub format: Option<String>, // "json" or "csv"
}

/// Get dashboard metrics
pub async fn get_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<DashboardMetrics>> {
    current_user.0.require(Resource::Report, Action::View)?;
    let service = ReportingService::new(state.db.clone());
    Ok(Json(service.get_dashboard_metrics().await?))
}

/// Daily sales over a date range
pub async fn get_sales_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let range = resolve_range(query.start_date, query.end_date)?;
    let service = ReportingService::new(state.db.clone());

    match query.format.as_deref() {
        Some("csv") => {
            current_user.0.require(Resource::Report, Action::Export)?;
            let data = service.get_sales_by_day(&range).await?;
            let csv = export_to_csv(&data)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"sales_report.csv\"",
                    ),
                ],
                csv,
            )
                .into_response())
        }
        None | Some("json") => {
            current_user.0.require(Resource::Report, Action::View)?;
            let data = service.get_sales_by_day(&range).await?;
            Ok(Json(data).into_response())
        }
        Some(_) => Err(AppError::validation("format", "Format must be json or csv")),
    }
}
