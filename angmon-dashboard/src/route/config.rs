use angmon_core::{ConfigReconciler, DraftState, FieldEdit, ReconcileError};
use angmon_proto::Configuration;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::info;

use crate::{AppState, agent::AgentError};

#[derive(Debug, Serialize)]
pub struct DraftView {
    pub state: DraftState,
    pub draft: Configuration,
}

impl DraftView {
    fn of(reconciler: &ConfigReconciler) -> Json<Self> {
        Json(DraftView {
            state: reconciler.state(),
            draft: reconciler.draft().clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct NewPartition {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdInput {
    pub value: String,
}

pub async fn show(State(state): State<AppState>) -> Json<DraftView> {
    let reconciler = state.reconciler.lock().await;
    DraftView::of(&reconciler)
}

pub async fn edit(
    State(state): State<AppState>,
    Json(edit): Json<FieldEdit>,
) -> Json<DraftView> {
    let mut reconciler = state.reconciler.lock().await;
    reconciler.edit(edit);
    DraftView::of(&reconciler)
}

pub async fn add_partition(
    State(state): State<AppState>,
    Json(NewPartition { path }): Json<NewPartition>,
) -> Result<Json<DraftView>, ApiError> {
    let mut reconciler = state.reconciler.lock().await;
    reconciler.add_partition(&path)?;
    Ok(DraftView::of(&reconciler))
}

pub async fn remove_partition(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<DraftView>, ApiError> {
    let mut reconciler = state.reconciler.lock().await;
    reconciler.remove_partition(index)?;
    Ok(DraftView::of(&reconciler))
}

pub async fn toggle_partition(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Json<DraftView>, ApiError> {
    let mut reconciler = state.reconciler.lock().await;
    reconciler.toggle_partition(index)?;
    Ok(DraftView::of(&reconciler))
}

pub async fn set_threshold(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(ThresholdInput { value }): Json<ThresholdInput>,
) -> Result<Json<DraftView>, ApiError> {
    let mut reconciler = state.reconciler.lock().await;
    reconciler.set_threshold(index, &value)?;
    Ok(DraftView::of(&reconciler))
}

/// Replace the draft with the agent's stored configuration, unsaved edits included.
pub async fn refresh(State(state): State<AppState>) -> Result<Json<DraftView>, ApiError> {
    reload(&state).await?;
    let reconciler = state.reconciler.lock().await;
    Ok(DraftView::of(&reconciler))
}

pub async fn save(State(state): State<AppState>) -> Result<Json<DraftView>, ApiError> {
    // detached so the reconciler settles even when the request is dropped
    tokio::spawn(persist(state)).await?
}

async fn persist(state: AppState) -> Result<Json<DraftView>, ApiError> {
    // the lock is not held while the agent is busy
    let submitted = state.reconciler.lock().await.begin_save()?;
    let outcome = state.agent.save_config(&submitted).await;

    let mut reconciler = state.reconciler.lock().await;
    match outcome {
        Ok(()) => {
            reconciler.complete_save(Ok::<_, AgentError>(()))?;
            info!(customer = %submitted.customer_name, "configuration saved to agent");
            Ok(DraftView::of(&reconciler))
        }
        Err(e) => {
            reconciler.complete_save(Err(&e))?;
            Err(e.into())
        }
    }
}

/// Load the stored configuration into the reconciler. Also run once at startup.
pub async fn reload(state: &AppState) -> Result<(), ApiError> {
    tokio::spawn(fetch_into(state.clone())).await?
}

async fn fetch_into(state: AppState) -> Result<(), ApiError> {
    state.reconciler.lock().await.begin_refresh();
    let fetched = state.agent.load_config().await;

    let mut reconciler = state.reconciler.lock().await;
    match fetched {
        Ok(config) => {
            reconciler.complete_refresh(Ok::<_, AgentError>(config))?;
            Ok(())
        }
        Err(e) => {
            reconciler.complete_refresh(Err(&e))?;
            Err(e.into())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Draft(#[from] ReconcileError),
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("agent request task failed: {0}")]
    Task(#[from] JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Draft(ReconcileError::NoSuchPartition(_)) => StatusCode::NOT_FOUND,
            ApiError::Draft(ReconcileError::BlankPath) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Draft(
                ReconcileError::DuplicatePath(_)
                | ReconcileError::SaveInFlight
                | ReconcileError::RefreshInFlight,
            ) => StatusCode::CONFLICT,
            ApiError::Draft(ReconcileError::NoPendingRefresh | ReconcileError::NoPendingSave) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Agent(_) => StatusCode::BAD_GATEWAY,
            ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
