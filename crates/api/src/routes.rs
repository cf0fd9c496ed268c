use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Extension, Path, State};
use axum::{
    Json, Router,
    extract::ws::close_code,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use farbound_domain::{
    error::DomainError,
    guest::{GuestService, GuestSignup},
    message::{ChatMessage, MessageDraft, MessageService, Sender, coalesce_text},
    realtime::{ClientFrame, ServerEvent},
    timeline::ChatTimeline,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::{error::ApiError, middleware as app_middleware, observability, state::AppState, validation};

pub fn router(state: AppState) -> Router {
    let staff = Router::new()
        .route("/messages/:message_id/read", post(mark_message_read))
        .route_layer(middleware::from_fn(
            app_middleware::require_staff_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/messages", post(create_message).get(list_messages))
        .route("/guests", post(create_guest))
        .route("/chat/ws", get(chat_ws))
        .merge(staff)
        .layer(app_middleware::timeout_layer())
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::staff_auth_middleware,
        ))
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ));

    if !state.config.app_env.eq_ignore_ascii_case("test") {
        app = app.layer(app_middleware::rate_limit_layer());
    }

    app.with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.app_env.clone(),
    })
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => body.into_response(),
        None => ApiError::Internal.into_response(),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateMessageRequest {
    #[validate(length(max = 2_000))]
    text: Option<String>,
    /// Body field name used by older widget builds.
    #[validate(length(max = 2_000))]
    message: Option<String>,
    sender: Option<Sender>,
    user_id: Option<String>,
    username: Option<String>,
    is_special_offer: Option<bool>,
}

async fn create_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let text = coalesce_text(payload.text, payload.message)
        .ok_or_else(|| ApiError::Validation("text is required".into()))?;

    // Admin attribution comes from the bearer token alone; an `isAdmin`
    // field in the body is ignored.
    let draft = MessageDraft {
        text,
        sender: payload.sender.unwrap_or(Sender::User),
        is_admin: auth.is_staff,
        user_id: payload.user_id,
        username: payload.username,
        is_special_offer: payload.is_special_offer,
    };

    let service = MessageService::new(state.message_repo.clone());
    let message = service.create(draft).await.map_err(map_domain_error)?;

    state.relay.publish_message(message.clone(), "rest");

    Ok((StatusCode::CREATED, Json(message)).into_response())
}

async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let service = MessageService::new(state.message_repo.clone());
    let messages = service.list().await.map_err(map_domain_error)?;
    Ok(Json(messages))
}

async fn mark_message_read(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
) -> Result<Json<ChatMessage>, ApiError> {
    let service = MessageService::new(state.message_repo.clone());
    let message = service
        .mark_read(&message_id)
        .await
        .map_err(map_domain_error)?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateGuestRequest {
    #[validate(length(max = 120))]
    username: Option<String>,
    /// Older widget builds post this as `emailOrPhone`.
    #[serde(alias = "emailOrPhone")]
    #[validate(length(max = 254))]
    contact: Option<String>,
    #[validate(length(max = 128))]
    user_id: Option<String>,
}

async fn create_guest(
    State(state): State<AppState>,
    Json(payload): Json<CreateGuestRequest>,
) -> Result<Response, ApiError> {
    validation::validate(&payload)?;
    let service = GuestService::new(state.guest_repo.clone());
    let outcome = service
        .upsert(GuestSignup {
            username: payload.username,
            contact: payload.contact,
            user_id: payload.user_id,
        })
        .await
        .map_err(map_domain_error)?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome.guest)).into_response())
}

async fn chat_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Subscribe before reading the backlog so nothing published in between
    // can be missed; the timeline drops whatever shows up on both paths.
    let receiver = state.relay.subscribe();
    let service = MessageService::new(state.message_repo.clone());
    let backlog = service.list().await.map_err(map_domain_error)?;
    Ok(ws.on_upgrade(move |socket| handle_chat_socket(socket, state, backlog, receiver)))
}

fn server_event_payload(event: &ServerEvent) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|_| "{\"event\":\"error\",\"data\":\"serialize_failed\"}".to_string())
}

async fn handle_chat_socket(
    socket: WebSocket,
    state: AppState,
    backlog: Vec<ChatMessage>,
    mut receiver: broadcast::Receiver<ServerEvent>,
) {
    let (mut sender, mut incoming) = socket.split();
    let service = MessageService::new(state.message_repo.clone());

    // History is owned by the REST endpoint; the backlog only seeds the
    // de-dup state so relay echoes of already-fetched messages are dropped.
    let mut timeline = ChatTimeline::new();
    for message in backlog {
        timeline.apply_push(message);
    }

    let mut heartbeat = interval(Duration::from_secs(15));
    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Ok(ServerEvent::Message(message)) => {
                        if !timeline.apply_push(message.clone()) {
                            continue;
                        }
                        let payload = server_event_payload(&ServerEvent::Message(message));
                        if sender.send(Message::Text(payload)).await.is_err() {
                            return;
                        }
                    }
                    Ok(event @ ServerEvent::UserTyping(_)) => {
                        if sender.send(Message::Text(server_event_payload(&event))).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "relay subscriber lagged; replaying from history");
                        let replay = match service.list().await {
                            Ok(messages) => messages,
                            Err(err) => {
                                tracing::error!(error = %err, "lag replay fetch failed");
                                if sender
                                    .send(Message::Text(
                                        "{\"event\":\"error\",\"data\":\"replay_failed\"}"
                                            .to_string(),
                                    ))
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                                continue;
                            }
                        };
                        for message in replay {
                            if !timeline.apply_push(message.clone()) {
                                continue;
                            }
                            let payload = server_event_payload(&ServerEvent::Message(message));
                            if sender.send(Message::Text(payload)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: close_code::AWAY,
                                reason: "relay closed".into(),
                            })))
                            .await;
                        return;
                    }
                }
            }
            frame = incoming.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(reason) = handle_client_frame(&state, &service, &text).await {
                            if sender
                                .send(Message::Text(format!(
                                    "{{\"event\":\"error\",\"data\":\"{reason}\"}}"
                                )))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => return,
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// One inbound frame. `sendMessage` is intent: the message is persisted
/// first and reaches every subscriber (the sender included) via the relay,
/// so a dropped socket can never leave a broadcast-only message behind.
async fn handle_client_frame(
    state: &AppState,
    service: &MessageService,
    text: &str,
) -> Result<(), &'static str> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable relay frame");
            return Err("invalid_frame");
        }
    };

    match frame {
        ClientFrame::SendMessage(intent) => {
            let Some(draft) = intent.into_draft() else {
                return Err("text_required");
            };
            let message = match service.create(draft).await {
                Ok(message) => message,
                Err(err) => {
                    tracing::warn!(error = %err, "relay send rejected");
                    return Err("send_failed");
                }
            };
            state.relay.publish_message(message, "socket");
        }
        ClientFrame::Typing(notice) => {
            state.relay.publish_typing(notice);
        }
    }

    Ok(())
}

fn map_domain_error(err: DomainError) -> ApiError {
    match err {
        DomainError::Validation(message) => ApiError::Validation(message),
        DomainError::NotFound => ApiError::NotFound,
        DomainError::Storage(detail) => {
            tracing::error!(error = %detail, "storage failure");
            ApiError::Storage
        }
    }
}
