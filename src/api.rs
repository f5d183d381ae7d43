use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::channels::{self, ChannelError, ChannelUpdate};
use crate::chat::Outbound;
use crate::context::BotContext;
use crate::membership;
use crate::model::Role;
use crate::notifier::NotifierRegistry;
use crate::settings::Settings;
use crate::standups::{self, DeadlineUpdate, MessageEvent};

#[derive(Clone)]
pub struct AppState {
    pub ctx: BotContext,
    pub registry: NotifierRegistry,
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
pub struct DeadlineRequest {
    #[serde(default)]
    pub deadline: String,
    /// Member who asked; gets the reply as an ephemeral message too.
    pub user: Option<String>,
}

/// Anything posted to `/events`.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum Event {
    Message(MessageEvent),
    Channel(ChannelEvent),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    MemberJoined {
        channel: String,
        user: String,
        channel_name: Option<String>,
    },
}

#[derive(Deserialize)]
pub struct JoinRequest {
    pub user: String,
    pub display_name: Option<String>,
    /// Channel name, used when the channel is not known yet.
    pub channel_name: Option<String>,
    #[serde(default)]
    pub role: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/settings", get(handle_get_settings).put(handle_put_settings))
        .route("/channels/:id", get(handle_show_channel).put(handle_update_channel))
        .route("/channels/:id/deadline", put(handle_deadline))
        .route("/channels/:id/members", post(handle_join))
        .route("/channels/:id/members/:user", delete(handle_quit))
        .route("/campaigns", get(handle_campaigns))
        .route("/events", post(handle_event))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .route("/health", get(handle_health))
        .with_state(state)
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t == expected)
}

async fn auth_layer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(ref expected) = state.api_key
        && !authorized(req.headers(), expected)
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response();
    }
    next.run(req).await
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.ctx.settings.current();
    Json(json!({
        "status": "ok",
        "name": settings.workspace_name,
        "version": env!("CARGO_PKG_VERSION"),
        "campaigns": state.registry.active().len(),
    }))
}

async fn handle_get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ctx.settings.current().as_ref().clone())
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(settings): Json<Settings>,
) -> impl IntoResponse {
    match state.ctx.settings.update(settings) {
        Ok(updated) => (StatusCode::OK, Json(json!(updated.as_ref()))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

async fn handle_deadline(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(req): Json<DeadlineRequest>,
) -> impl IntoResponse {
    match state.ctx.store.get_channel(&channel_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("Unknown channel {channel_id}")})),
            );
        }
        Err(e) => return internal_error(e),
    }

    let now = Local::now().fixed_offset();
    match standups::set_deadline(&state.ctx, &state.registry, &channel_id, &req.deadline, now)
        .await
    {
        Ok(update) => {
            let status = match update {
                DeadlineUpdate::Invalid(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::OK,
            };
            let text = update.reply(&state.ctx);
            if let Some(user) = req.user {
                let reply = Outbound::Ephemeral {
                    channel: channel_id.clone(),
                    user,
                    text: text.clone(),
                };
                if let Err(e) = state.ctx.chat.send(&reply).await {
                    tracing::warn!("Failed to reply in {channel_id}: {e}");
                }
            }
            (status, Json(json!({"text": text})))
        }
        Err(e) => internal_error(e),
    }
}

async fn handle_show_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> impl IntoResponse {
    match channels::show(&state.ctx, &channel_id).await {
        Ok(overview) => (StatusCode::OK, Json(json!(overview))),
        Err(e) => channel_error(e),
    }
}

async fn handle_update_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(update): Json<ChannelUpdate>,
) -> impl IntoResponse {
    match channels::update(&state.ctx, &channel_id, update).await {
        Ok(channel) => (StatusCode::OK, Json(json!(channel))),
        Err(e) => channel_error(e),
    }
}

async fn handle_join(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    Json(req): Json<JoinRequest>,
) -> impl IntoResponse {
    let channel_name = req.channel_name.as_deref().unwrap_or(&channel_id);
    let display_name = req.display_name.as_deref().unwrap_or(&req.user);
    match membership::join(
        &state.ctx,
        &channel_id,
        channel_name,
        &req.user,
        display_name,
        Role::parse(&req.role),
    )
    .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({"text": outcome.reply(&state.ctx)})),
        ),
        Err(e) => internal_error(e),
    }
}

async fn handle_quit(
    State(state): State<AppState>,
    Path((channel_id, user)): Path<(String, String)>,
) -> impl IntoResponse {
    match membership::quit(&state.ctx, &channel_id, &user).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({"text": outcome.reply(&state.ctx)})),
        ),
        Err(e) => internal_error(e),
    }
}

async fn handle_campaigns(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.active())
}

async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> impl IntoResponse {
    let result = match event {
        Event::Message(event) => standups::handle_event(&state.ctx, event, Utc::now())
            .await
            .map(|r| json!(r)),
        Event::Channel(ChannelEvent::MemberJoined {
            channel,
            user,
            channel_name,
        }) => {
            let name = channel_name.as_deref().unwrap_or(&channel);
            channels::member_joined(&state.ctx, &channel, name, &user)
                .await
                .map(|a| json!(a))
        }
    };
    match result {
        Ok(result) => (StatusCode::OK, Json(json!({"result": result}))),
        Err(e) => internal_error(e),
    }
}

fn channel_error(e: ChannelError) -> (StatusCode, Json<serde_json::Value>) {
    match e {
        ChannelError::Unknown(_) => (StatusCode::NOT_FOUND, Json(json!({"error": e.to_string()}))),
        ChannelError::Invalid(_) => (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))),
        ChannelError::Store(e) => internal_error(e),
    }
}

fn internal_error(e: anyhow::Error) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("API error: {e:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    use super::*;
    use crate::testing::TestBot;

    fn state(bot: &TestBot) -> AppState {
        AppState {
            ctx: bot.ctx.clone(),
            registry: NotifierRegistry::new(),
            api_key: Some("secret".into()),
        }
    }

    async fn body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_authorized() {
        let mut headers = HeaderMap::new();
        assert!(!authorized(&headers, "secret"));
        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(!authorized(&headers, "secret"));
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        assert!(authorized(&headers, "secret"));
    }

    #[tokio::test]
    async fn test_put_settings_rejects_invalid() {
        let bot = TestBot::new();
        let mut settings = crate::settings::sample();
        settings.notifier_interval_minutes = 0;

        let response = handle_put_settings(State(state(&bot)), Json(settings))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(bot.ctx.settings.current().notifier_interval_minutes, 5);
    }

    #[tokio::test]
    async fn test_put_settings_swaps_snapshot() {
        let bot = TestBot::new();
        let mut settings = crate::settings::sample();
        settings.reminder_repeats_max = 7;

        let response = handle_put_settings(State(state(&bot)), Json(settings))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await["reminder_repeats_max"], 7);
        assert_eq!(bot.ctx.settings.current().reminder_repeats_max, 7);
    }

    #[tokio::test]
    async fn test_deadline_endpoint() {
        let bot = TestBot::new();
        bot.channel("C1", "dev", "").await;

        let missing = handle_deadline(
            State(state(&bot)),
            Path("C404".into()),
            Json(DeadlineRequest {
                deadline: "10:00".into(),
                user: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = handle_deadline(
            State(state(&bot)),
            Path("C1".into()),
            Json(DeadlineRequest {
                deadline: "later".into(),
                user: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let ok = handle_deadline(
            State(state(&bot)),
            Path("C1".into()),
            Json(DeadlineRequest {
                deadline: "10:00".into(),
                user: Some("U1".into()),
            }),
        )
        .await
        .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(
            body(ok).await["text"],
            "Updated standup deadline to 10:00 in UTC timezone"
        );
        assert_eq!(
            bot.chat.sent(),
            vec![Outbound::Ephemeral {
                channel: "C1".into(),
                user: "U1".into(),
                text: "Updated standup deadline to 10:00 in UTC timezone".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_member_endpoints() {
        let bot = TestBot::new();
        let join = |user: &str| JoinRequest {
            user: user.into(),
            display_name: None,
            channel_name: Some("dev".into()),
            role: "PM".into(),
        };

        let response = handle_join(State(state(&bot)), Path("C1".into()), Json(join("U1")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let members = bot.ctx.store.list_standupers("C1").await.unwrap();
        assert_eq!(members[0].display_name, "U1");
        assert_eq!(members[0].role, Role::Pm);

        let response = handle_quit(State(state(&bot)), Path(("C1".into(), "U1".into())))
            .await
            .into_response();
        assert_eq!(
            body(response).await["text"],
            "You no longer have to submit standups in this channel"
        );
    }

    #[tokio::test]
    async fn test_event_endpoint() {
        let bot = TestBot::new();
        let event: MessageEvent = serde_json::from_value(json!({
            "kind": "new",
            "channel": "C1",
            "user": "U1",
            "text": "<@UBOT> yesterday: api, today: ui, issues: none",
            "ts": "1.1",
        }))
        .unwrap();

        let response = handle_event(State(state(&bot)), Json(Event::Message(event)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await["result"], "created");
    }

    #[tokio::test]
    async fn test_member_joined_event() {
        let bot = TestBot::new();
        let event: Event = serde_json::from_value(json!({
            "kind": "member_joined",
            "channel": "C5",
            "user": "UBOT",
            "channel_name": "mobile",
        }))
        .unwrap();

        let response = handle_event(State(state(&bot)), Json(event))
            .await
            .into_response();
        assert_eq!(body(response).await["result"], "created");
        let channel = bot.ctx.store.get_channel("C5").await.unwrap().unwrap();
        assert_eq!(channel.name, "mobile");
    }

    #[tokio::test]
    async fn test_channel_endpoints() {
        let bot = TestBot::new();
        let channel = bot.channel("C1", "dev", "10:00").await;
        bot.member(&channel, "U1", Role::Developer).await;

        let response = handle_update_channel(
            State(state(&bot)),
            Path("C1".into()),
            Json(ChannelUpdate {
                submission_days: Some("monday".into()),
                reports_enabled: Some(false),
                ..Default::default()
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body(response).await;
        assert_eq!(updated["submission_days"], "monday");
        assert_eq!(updated["reports_enabled"], false);

        let response = handle_update_channel(
            State(state(&bot)),
            Path("C1".into()),
            Json(ChannelUpdate {
                warning_offset_minutes: Some(-5),
                ..Default::default()
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = handle_show_channel(State(state(&bot)), Path("C1".into()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let overview = body(response).await;
        assert_eq!(overview["members"][0]["user_id"], "U1");
        assert_eq!(
            overview["text"],
            "Only U1 name(developer) submits standups in the team\n\
             Standup deadline is 10:00\n\
             Channel time zone is UTC\n\
             Submit standups on monday"
        );

        let response = handle_show_channel(State(state(&bot)), Path("C404".into()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
