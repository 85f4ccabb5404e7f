//! REST endpoints.
//!
//! Every write goes to the store first. Realtime pushes are derived from the
//! committed result through the notification bridge and can never change
//! the response.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ember_core::{Action, Delivery};
use ember_protocol::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::metrics;
use crate::state::AppState;
use crate::store::{
    now_millis, ActionOutcome, MatchAction, Plan, StoreError, Subscription, UserProfile,
};

/// Header carrying the authenticated caller, set by the upstream auth layer.
pub const USER_HEADER: &str = "x-user-id";

/// REST failures, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized: missing x-user-id header")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Store(e) => {
                error!(error = %e, "Store failure");
                metrics::record_error("store");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| AuthUser(UserId::new(value)))
            .ok_or(ApiError::Unauthorized)
    }
}

/// REST routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat/send", post(send_message))
        .route("/api/chat/messages/:user_id", get(messages))
        .route("/api/chat/unread", get(unread))
        .route("/api/chat/conversations", get(conversations))
        .route("/api/user/profile", get(profile).put(update_profile))
        .route("/api/user/match", get(match_feed))
        .route("/api/user/match/action", post(match_action))
        .route("/api/user/friends", get(friends))
        .route("/api/user/requests", get(requests))
        .route("/api/user/subscribe", get(subscription).post(subscribe))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn record_deliveries(outcomes: &[Delivery]) {
    for delivery in outcomes {
        metrics::record_delivery(delivery.outcome());
    }
}

/// The user's subscription if it is still running. A failed lookup counts as
/// no subscription.
async fn active_subscription(state: &AppState, user: &UserId, now: u64) -> Option<Subscription> {
    match state.store.current_subscription(user).await {
        Ok(subscription) => subscription.filter(|s| s.is_active_at(now)),
        Err(e) => {
            warn!(user = %user, error = %e, "Subscription lookup failed, treating as free");
            None
        }
    }
}

/// Name to show in notifications. A failed lookup shows no name.
async fn notification_name(state: &AppState, user: &UserId) -> Option<String> {
    match state.store.find_user(user).await {
        Ok(profile) => profile.and_then(|p| p.name),
        Err(e) => {
            warn!(user = %user, error = %e, "Profile lookup failed, sending without a name");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessage {
    to: Option<String>,
    message: Option<String>,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    AuthUser(from): AuthUser,
    Json(body): Json<SendMessage>,
) -> Result<Json<Value>, ApiError> {
    let (Some(to), Some(message)) = (non_blank(body.to), non_blank(body.message)) else {
        return Err(ApiError::BadRequest("Missing recipient or message".to_string()));
    };
    let to = UserId::new(to);

    let (saved, outcomes) = state
        .realtime
        .bridge()
        .after_commit(
            state.store.save_message(&from, &to, message, now_millis()),
            |saved| {
                Some(Action::MessageSent {
                    from: saved.from.clone(),
                    to: saved.to.clone(),
                    message: saved.message.clone(),
                })
            },
        )
        .await?;
    record_deliveries(&outcomes);

    Ok(Json(json!({ "success": true, "saved_message": saved })))
}

#[derive(Debug, Serialize)]
struct ThreadEntry {
    from_self: bool,
    message: String,
    timestamp: u64,
}

async fn messages(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Path(other): Path<String>,
) -> Result<Json<Vec<ThreadEntry>>, ApiError> {
    let other = UserId::new(other);
    let thread = state.store.conversation(&me, &other).await?;

    let (_, outcomes) = state
        .realtime
        .bridge()
        .after_commit(state.store.mark_read(&me, &other), |marked| {
            (*marked > 0).then(|| Action::MessagesRead {
                reader: me.clone(),
                sender: other.clone(),
            })
        })
        .await?;
    record_deliveries(&outcomes);

    Ok(Json(
        thread
            .into_iter()
            .map(|m| ThreadEntry {
                from_self: m.from == me,
                message: m.message,
                timestamp: m.timestamp,
            })
            .collect(),
    ))
}

async fn unread(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<BTreeMap<UserId, usize>>, ApiError> {
    Ok(Json(state.store.unread_counts(&me).await?))
}

async fn conversations(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.store.conversation_partners(&me).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateProfile {
    name: Option<String>,
}

async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let profile = state
        .store
        .find_user(&me)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let subscription = active_subscription(&state, &me, now_millis()).await;

    Ok(Json(json!({
        "id": profile.id,
        "name": profile.name,
        "is_premium": subscription.is_some(),
        "plan": subscription.as_ref().map(|s| s.plan),
        "subscription": subscription,
    })))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Json(body): Json<UpdateProfile>,
) -> Result<Json<Value>, ApiError> {
    let name = non_blank(body.name).map(|n| n.trim().to_string());
    let profile = state.store.upsert_user(&me, name).await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "profile": profile })))
}

async fn match_feed(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let users = state.store.candidates(&me).await?;
    let subscription = active_subscription(&state, &me, now_millis()).await;

    Ok(Json(json!({
        "users": users,
        "is_premium": subscription.is_some(),
        "plan": subscription.map(|s| s.plan),
    })))
}

#[derive(Debug, Deserialize)]
struct MatchRequest {
    #[serde(alias = "targetUserId")]
    target_user_id: Option<String>,
    action: Option<String>,
}

async fn match_action(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Json(body): Json<MatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let action = match body.action.as_deref() {
        Some("like") => MatchAction::Like,
        Some("dislike") => MatchAction::Dislike,
        _ => return Err(ApiError::BadRequest("Invalid action".to_string())),
    };
    let Some(target) = non_blank(body.target_user_id).map(UserId::new) else {
        return Err(ApiError::BadRequest("Missing target user".to_string()));
    };
    if target == me {
        return Err(ApiError::BadRequest("Cannot act on yourself".to_string()));
    }

    let now = now_millis();
    let premium = active_subscription(&state, &me, now).await.is_some();
    let daily_limit = (!premium).then_some(state.config.likes.daily_limit);

    let from_name = notification_name(&state, &me).await;
    let to_name = notification_name(&state, &target).await;

    let (outcome, outcomes) = state
        .realtime
        .bridge()
        .after_commit(
            state.store.record_action(&me, &target, action, daily_limit, now),
            |outcome| match outcome {
                ActionOutcome::Recorded { mutual } if action == MatchAction::Like => {
                    Some(Action::ProfileLiked {
                        from: me.clone(),
                        from_name: from_name.clone(),
                        to: target.clone(),
                        to_name: to_name.clone(),
                        mutual: *mutual,
                    })
                }
                _ => None,
            },
        )
        .await?;
    record_deliveries(&outcomes);

    match outcome {
        ActionOutcome::LimitReached => Err(ApiError::Forbidden(
            "Daily like limit reached. Upgrade to premium to continue.".to_string(),
        )),
        ActionOutcome::AlreadyDone => Ok(Json(json!({
            "success": true,
            "message": format!("User already {}", action.past_tense()),
        }))),
        ActionOutcome::Recorded { mutual } => Ok(Json(json!({
            "success": true,
            "message": format!("User {}", action.past_tense()),
            "mutual": mutual,
        }))),
    }
}

async fn friends(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.store.friends(&me).await?))
}

async fn requests(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(state.store.requests(&me).await?))
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    plan: Option<String>,
}

async fn subscribe(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<Value>, ApiError> {
    let Some(plan) = body.plan.as_deref().and_then(Plan::parse) else {
        return Err(ApiError::BadRequest("Invalid plan selected".to_string()));
    };

    let subscription = Subscription::starting(plan, now_millis());
    state.store.set_subscription(&me, subscription.clone()).await?;
    info!(user = %me, plan = ?plan, "Subscription activated");

    Ok(Json(json!({ "message": "Subscription activated", "subscription": subscription })))
}

async fn subscription(
    State(state): State<Arc<AppState>>,
    AuthUser(me): AuthUser,
) -> Result<Json<Value>, ApiError> {
    let now = now_millis();
    let current = state
        .store
        .current_subscription(&me)
        .await?
        .filter(|s| s.is_active_at(now));

    Ok(Json(match current {
        Some(s) => json!({
            "active": true,
            "plan": s.plan,
            "start_date": s.start_date,
            "end_date": s.end_date,
        }),
        None => json!({ "active": false }),
    }))
}
