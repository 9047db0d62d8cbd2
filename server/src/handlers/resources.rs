use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: NaiveDate,
}

pub async fn availability(
    State(state): State<AppState>,
    resource_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Path(resource_id) = resource_id?;
    let Query(DateQuery { date }) = query?;
    let board = state.availability.board(resource_id, date).await?;
    Ok(success(board, "Availability retrieved"))
}

pub async fn day_sheet(
    State(state): State<AppState>,
    resource_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DateQuery>, QueryRejection>,
) -> AppResult<Response> {
    let Path(resource_id) = resource_id?;
    let Query(DateQuery { date }) = query?;
    let sheet = state.reservations.day_sheet(resource_id, date).await?;
    Ok(success(sheet, "Reservations retrieved"))
}
