use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::SharedState;
use crate::ballot::BallotReceipt;
use crate::error::{ApiError, ApiResult};
use crate::reactions::{ArgumentVoteOutcome, ArgumentView, TestimonyView, TestimonyVoteOutcome};
use crate::stats::{DisplayedStats, StatsMode};
use crate::storage::{Case, CaseStore, Choice, CouncilState, Profile, VoteDirection};

/// Longest visitor id accepted.
pub const MAX_VISITOR_ID_LEN: usize = 128;

// ============================================================================
// Request and response shapes
// ============================================================================

/// Case as returned by `/current-case` and `/list-cases`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub case_id: String,
    pub case_no: String,
    pub title: String,
    pub prompt: String,
    pub option_a_label: String,
    pub option_b_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<i64>,
}

impl CaseSummary {
    fn current(case: Case) -> Self {
        Self {
            case_id: case.id,
            case_no: case.case_no,
            title: case.title,
            prompt: case.prompt,
            option_a_label: case.option_a_label,
            option_b_label: case.option_b_label,
            status: None,
            season: None,
        }
    }

    fn listed(case: Case) -> Self {
        let status = case.status.clone();
        let season = case.season;
        Self {
            status: Some(status),
            season: Some(season),
            ..Self::current(case)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SeasonQuery {
    pub season: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub case_id: Option<String>,
    pub mode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VisitorQuery {
    pub visitor_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaseScopeQuery {
    pub case_id: Option<String>,
    pub visitor_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoteRequest {
    pub visitor_id: Option<String>,
    pub case_id: Option<String>,
    pub choice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoteArgumentRequest {
    pub visitor_id: Option<String>,
    pub case_id: Option<String>,
    pub argument_key: Option<String>,
    pub vote: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitTestimonyRequest {
    pub visitor_id: Option<String>,
    pub case_id: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VoteTestimonyRequest {
    pub visitor_id: Option<String>,
    pub testimony_id: Option<String>,
    pub vote: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /healthz
pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /current-case
pub async fn current_case(State(state): State<SharedState>) -> ApiResult<Json<CaseSummary>> {
    let case = state
        .storage
        .current_case()
        .await?
        .ok_or_else(|| ApiError::not_found("No active case found"))?;

    debug!(case_id = %case.id, "Serving current case");
    Ok(Json(CaseSummary::current(case)))
}

/// GET /list-cases?season
pub async fn list_cases(
    State(state): State<SharedState>,
    query: Result<Query<SeasonQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<CaseSummary>>> {
    let query = parse_query(query)?;
    let season = match non_empty(query.season) {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::validation("Invalid season query param"))?,
        None => state.config.tribunal.default_season,
    };

    let cases = state.storage.list_cases(season).await?;
    debug!(season = season, count = cases.len(), "Listing cases");

    Ok(Json(cases.into_iter().map(CaseSummary::listed).collect()))
}

/// GET /stats?case_id&mode
pub async fn stats(
    State(state): State<SharedState>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> ApiResult<Json<DisplayedStats>> {
    let query = parse_query(query)?;
    let case_id = non_empty(query.case_id)
        .ok_or_else(|| ApiError::validation("Missing case_id query param"))?;
    let mode = match non_empty(query.mode) {
        Some(raw) => raw.parse::<StatsMode>().map_err(ApiError::validation)?,
        None => state.config.tribunal.default_stats_mode,
    };

    let stats = state.stats.snapshot(&case_id, mode, state.now()).await?;
    Ok(Json(stats))
}

/// GET /ai-council
pub async fn ai_council(State(state): State<SharedState>) -> ApiResult<Json<CouncilState>> {
    let council = state
        .storage
        .get_council()
        .await?
        .ok_or_else(|| ApiError::not_found("No council state found"))?;
    Ok(Json(council))
}

/// GET /profile?visitor_id
pub async fn profile(
    State(state): State<SharedState>,
    query: Result<Query<VisitorQuery>, QueryRejection>,
) -> ApiResult<Json<Profile>> {
    let query = parse_query(query)?;
    let visitor_id = visitor(query.visitor_id)?;
    let profile = state.profiles.check_in(&visitor_id, state.now()).await?;
    Ok(Json(profile))
}

/// POST /vote
pub async fn vote(State(state): State<SharedState>, body: Bytes) -> ApiResult<Json<BallotReceipt>> {
    let request: VoteRequest = parse_body(&body)?;

    let (Some(visitor_id), Some(case_id), Some(choice)) = (
        non_empty(request.visitor_id),
        non_empty(request.case_id),
        non_empty(request.choice),
    ) else {
        return Err(ApiError::validation("Missing visitor_id, case_id, or choice"));
    };
    let visitor_id = visitor(Some(visitor_id))?;
    let choice: Choice = choice.parse().map_err(ApiError::validation)?;

    require_case(&state, &case_id).await?;

    let receipt = state
        .ballots
        .cast(&visitor_id, &case_id, choice, state.now())
        .await?;

    info!(case_id = %case_id, choice = %choice, "POST /vote");
    Ok(Json(receipt))
}

/// GET /list-arguments?case_id&visitor_id
pub async fn list_arguments(
    State(state): State<SharedState>,
    query: Result<Query<CaseScopeQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<ArgumentView>>> {
    let query = parse_query(query)?;
    let case_id = non_empty(query.case_id)
        .ok_or_else(|| ApiError::validation("Missing case_id query param"))?;
    let visitor_id = non_empty(query.visitor_id);

    let arguments = state
        .reactions
        .list_arguments(&case_id, visitor_id.as_deref())
        .await?;
    Ok(Json(arguments))
}

/// POST /vote-argument
pub async fn vote_argument(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<ArgumentVoteOutcome>> {
    let request: VoteArgumentRequest = parse_body(&body)?;

    let (Some(visitor_id), Some(case_id), Some(argument_key), Some(direction)) = (
        non_empty(request.visitor_id),
        non_empty(request.case_id),
        non_empty(request.argument_key),
        non_empty(request.vote),
    ) else {
        return Err(ApiError::validation(
            "Missing visitor_id, case_id, argument_key, or vote",
        ));
    };
    let visitor_id = visitor(Some(visitor_id))?;
    let direction: VoteDirection = direction.parse().map_err(ApiError::validation)?;

    let outcome = state
        .reactions
        .vote_argument(&visitor_id, &case_id, &argument_key, direction)
        .await?;
    Ok(Json(outcome))
}

/// GET /list-testimonies?case_id&visitor_id
pub async fn list_testimonies(
    State(state): State<SharedState>,
    query: Result<Query<CaseScopeQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<TestimonyView>>> {
    let query = parse_query(query)?;
    let case_id = non_empty(query.case_id)
        .ok_or_else(|| ApiError::validation("Missing case_id query param"))?;
    let visitor_id = non_empty(query.visitor_id);

    let testimonies = state
        .reactions
        .list_testimonies(&case_id, visitor_id.as_deref())
        .await?;
    Ok(Json(testimonies))
}

/// POST /submit-testimony
pub async fn submit_testimony(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<Vec<TestimonyView>>> {
    let request: SubmitTestimonyRequest = parse_body(&body)?;

    let (Some(visitor_id), Some(case_id), Some(text)) = (
        non_empty(request.visitor_id),
        non_empty(request.case_id),
        request.text,
    ) else {
        return Err(ApiError::validation("Missing visitor_id, case_id, or text"));
    };
    let visitor_id = visitor(Some(visitor_id))?;

    require_case(&state, &case_id).await?;

    let top = state
        .reactions
        .submit_testimony(&visitor_id, &case_id, &text, state.now())
        .await?;

    info!(case_id = %case_id, "POST /submit-testimony");
    Ok(Json(top))
}

/// POST /vote-testimony
pub async fn vote_testimony(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<TestimonyVoteOutcome>> {
    let request: VoteTestimonyRequest = parse_body(&body)?;

    let (Some(visitor_id), Some(testimony_id), Some(direction)) = (
        non_empty(request.visitor_id),
        non_empty(request.testimony_id),
        non_empty(request.vote),
    ) else {
        return Err(ApiError::validation("Missing visitor_id, testimony_id, or vote"));
    };
    let visitor_id = visitor(Some(visitor_id))?;
    let direction: VoteDirection = direction.parse().map_err(ApiError::validation)?;

    let outcome = state
        .reactions
        .vote_testimony(&visitor_id, &testimony_id, direction)
        .await?;
    Ok(Json(outcome))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}

/// Fallback for known routes called with the wrong method.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a JSON request body, mapping any failure to a 400.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        ApiError::validation("Invalid JSON body")
    })
}

/// Unwrap query params, mapping a rejected query string to a 400.
fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    query.map(|Query(params)| params).map_err(|e| {
        debug!(error = %e, "Rejected query string");
        ApiError::validation("Invalid query string")
    })
}

/// Trimmed value, or `None` when absent or blank.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn visitor(value: Option<String>) -> ApiResult<String> {
    let visitor_id =
        non_empty(value).ok_or_else(|| ApiError::validation("Missing visitor_id"))?;
    if visitor_id.chars().count() > MAX_VISITOR_ID_LEN {
        return Err(ApiError::validation("visitor_id too long"));
    }
    Ok(visitor_id)
}

async fn require_case(state: &SharedState, case_id: &str) -> ApiResult<Case> {
    state
        .storage
        .get_case(case_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Case not found"))
}
