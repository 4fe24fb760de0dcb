//! HTTP + realtime data channel surface (§6.1, §6.2).
//!
//! Mirrors the teacher's `channels::gateway` shape: a plain `axum::Router`
//! built from small `State`-threaded handlers, `(StatusCode, Json<_>)`
//! tuples for error bodies, one `State` struct shared across routes. The
//! one thing the teacher never does is a websocket *server* endpoint or
//! CORS, so the realtime channel's split-socket plumbing is grounded on
//! the only place in the whole pack that does this server-side (a
//! retrieved example's `realtime_voice.rs`), and CORS is hand-rolled
//! middleware since no example repo in the corpus carries a CORS crate.
//!
//! This crate enforces §4.9's "at most one active session" invariant
//! inside [`crate::session_manager::SessionManager`] itself, so there is
//! no need for a multi-session registry here — just a single "current
//! session" slot that the session-start handler fills and a background
//! forwarder task clears once the orchestrator's event channel closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{RealtimeConfig, TutorConfig};
use crate::diagnostics;
use crate::domain::card::Rating;
use crate::error::{ErrorClass, TutorError};
use crate::events::{ButtonCommand, CardPayload, Event, PttEvent, Progress, SessionStats, UiEvent};
use crate::livekit_cache::DispatchCache;
use crate::ports::FlashcardStore;
use crate::rate_limit::{ApiRateLimiter, EndpointKind, RateLimitError};
use crate::recovery_store::RecoveryStore;
use crate::session_manager::SessionManager;

/// Shared state for every route.
#[derive(Clone)]
pub struct AppState {
    session_manager: Arc<SessionManager>,
    store: Arc<dyn FlashcardStore>,
    recovery: Arc<RecoveryStore>,
    config: Arc<TutorConfig>,
    rate_limiter: Arc<ApiRateLimiter>,
    dispatch_cache: Arc<DispatchCache>,
    /// The one session currently in flight, if any (§4.9).
    current: Arc<Mutex<Option<Arc<SessionChannel>>>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        session_manager: Arc<SessionManager>,
        store: Arc<dyn FlashcardStore>,
        recovery: Arc<RecoveryStore>,
        config: Arc<TutorConfig>,
    ) -> Self {
        let rate_limiter = Arc::new(ApiRateLimiter::new(config.rate_limit.clone()));
        Self {
            session_manager,
            store,
            recovery,
            config,
            rate_limiter,
            dispatch_cache: Arc::new(DispatchCache::new()),
            current: Arc::new(Mutex::new(None)),
        }
    }
}

/// A cache of the latest state published for the active session, kept
/// current by [`spawn_forwarder`] so `/session/current` and a
/// newly-(re)connecting websocket don't have to replay the whole event
/// history.
#[derive(Default, Clone)]
struct Snapshot {
    card: Option<CardPayload>,
    progress: Option<Progress>,
    last_rating: Option<u8>,
    stats: Option<SessionStats>,
}

/// The active session's transport handle: where to send inbound events,
/// how to cancel it, and a fan-out point for outbound ones.
struct SessionChannel {
    session_id: String,
    deck_name: String,
    started_at: SystemTime,
    events_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    broadcast_tx: broadcast::Sender<UiEvent>,
    snapshot: Mutex<Snapshot>,
}

/// Builds the full router: REST endpoints (§6.1), the realtime data
/// channel (§6.2), and a CORS layer validated against `state.config.cors`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/session/start", post(start_session))
        .route("/session/end", post(end_session))
        .route("/session/current", get(session_current).head(session_current_head))
        .route("/cards/{id}/rate", post(rate_card))
        .route("/cards/{id}/skip", post(skip_card))
        .route("/cards/{id}/image", get(card_image))
        .route("/decks", get(list_decks))
        .route("/livekit/token", post(livekit_token))
        .route("/health", get(health))
        .route("/diagnostics/export", post(diagnostics_export))
        .route("/realtime", get(realtime_ws))
        .layer(middleware::from_fn_with_state(state.clone(), cors_middleware))
        .with_state(state)
}

// ---------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    deck_name: String,
}

#[derive(Debug, Serialize)]
struct StartSessionResponse {
    session_id: String,
    deck_name: String,
    state: &'static str,
    due_count: usize,
    cards: Vec<CardPayload>,
    recovered_ratings: usize,
}

#[derive(Debug, Deserialize)]
struct EndSessionRequest {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct RateRequest {
    rating: u8,
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SkipRequest {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct LivekitTokenRequest {
    room: String,
    participant: String,
    #[serde(default)]
    #[allow(dead_code)]
    deck: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    input_mode: Option<String>,
}

#[derive(Debug, Serialize)]
struct LivekitTokenResponse {
    token: String,
    url: String,
}

// ---------------------------------------------------------------------
// REST handlers
// ---------------------------------------------------------------------

async fn start_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<StartSessionRequest>,
) -> Response {
    if let Err(err) = state.rate_limiter.check(&client_id(&addr), EndpointKind::Start) {
        return rate_limited(err);
    }

    let (ui_tx, ui_rx) = mpsc::channel(128);
    match state.session_manager.start_session(body.deck_name.clone(), ui_tx).await {
        Ok((session_id, events_tx, cancel)) => {
            let (broadcast_tx, _) = broadcast::channel(128);
            let channel = Arc::new(SessionChannel {
                session_id: session_id.clone(),
                deck_name: body.deck_name.clone(),
                started_at: SystemTime::now(),
                events_tx,
                cancel,
                broadcast_tx,
                snapshot: Mutex::new(Snapshot::default()),
            });

            {
                let mut guard = state.current.lock().await;
                *guard = Some(Arc::clone(&channel));
            }
            spawn_forwarder(ui_rx, Arc::clone(&channel), Arc::clone(&state.current));

            let cards = state.store.get_reviewable_cards(&body.deck_name).await.unwrap_or_default();
            let recovered_ratings = state.recovery.unsynced_reviews().map(|r| r.len()).unwrap_or(0);

            let response = StartSessionResponse {
                session_id,
                deck_name: channel.deck_name.clone(),
                state: "active",
                due_count: cards.len(),
                cards: cards.iter().map(CardPayload::from).collect(),
                recovered_ratings,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(TutorError::SessionConflict { existing_session_id }) => {
            let started_at = existing_started_at(&state, &existing_session_id).await;
            (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": "SESSION_CONFLICT",
                    "existing_session_id": existing_session_id,
                    "started_at": started_at,
                })),
            )
                .into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn existing_started_at(state: &AppState, session_id: &str) -> Option<String> {
    let guard = state.current.lock().await;
    guard
        .as_ref()
        .filter(|c| c.session_id == session_id)
        .map(|c| humantime_rfc3339(c.started_at))
}

fn humantime_rfc3339(at: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(at).to_rfc3339()
}

async fn end_session(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<EndSessionRequest>,
) -> Response {
    if let Err(err) = state.rate_limiter.check(&client_id(&addr), EndpointKind::End) {
        return rate_limited(err);
    }

    let Some(channel) = current_channel_for(&state, &body.session_id).await else {
        return session_not_found(&body.session_id);
    };

    // Subscribe before cancelling so the SessionComplete event can't be
    // published and missed in the gap between cancel() and subscribe().
    let mut rx = channel.broadcast_tx.subscribe();
    channel.cancel.cancel();

    let deadline = Instant::now() + Duration::from_secs(5);
    let settled = wait_for_event(&mut rx, deadline, |e| matches!(e, UiEvent::SessionComplete { .. })).await;

    let snapshot = channel.snapshot.lock().await;
    match &snapshot.stats {
        Some(stats) if settled => (
            StatusCode::OK,
            Json(json!({
                "session_id": channel.session_id,
                "state": "complete",
                "stats": stats,
            })),
        )
            .into_response(),
        _ => (
            StatusCode::OK,
            Json(json!({
                "session_id": channel.session_id,
                "state": "complete",
                "warning": "session ended but final stats were not ready before the response timed out",
            })),
        )
            .into_response(),
    }
}

async fn session_current(State(state): State<AppState>) -> Response {
    let guard = state.current.lock().await;
    let Some(channel) = guard.as_ref() else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "no active session"}))).into_response();
    };

    let snapshot = channel.snapshot.lock().await;
    match (&snapshot.card, snapshot.progress) {
        (Some(card), Some(progress)) => (
            StatusCode::OK,
            Json(json!({
                "session_id": channel.session_id,
                "card": card,
                "progress": progress,
                "last_rating": snapshot.last_rating,
            })),
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "no current card"}))).into_response(),
    }
}

async fn session_current_head(State(state): State<AppState>) -> StatusCode {
    let guard = state.current.lock().await;
    let Some(channel) = guard.as_ref() else {
        return StatusCode::NOT_FOUND;
    };
    let snapshot = channel.snapshot.lock().await;
    if snapshot.card.is_some() {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn rate_card(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(_card_id): Path<u64>,
    Json(body): Json<RateRequest>,
) -> Response {
    if let Err(err) = state.rate_limiter.check(&client_id(&addr), EndpointKind::Rate) {
        return rate_limited(err);
    }
    let Some(rating) = Rating::from_u8(body.rating) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "rating must be 1..4"}))).into_response();
    };
    let Some(channel) = current_channel_for(&state, &body.session_id).await else {
        return session_not_found(&body.session_id);
    };

    let mut rx = channel.broadcast_tx.subscribe();
    // A manual rating is a two-step rate-then-advance, same as the voice
    // MarkGood/MarkEasy/etc. path (§4.7), but chained here so the REST
    // caller sees the next card in one round trip.
    if channel.events_tx.send(Event::ManualRating(rating)).await.is_err()
        || channel.events_tx.send(Event::Button(ButtonCommand::Next)).await.is_err()
    {
        return session_expired(&body.session_id);
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    wait_for_event(&mut rx, deadline, is_card_or_complete).await;
    card_progress_response(&channel).await
}

async fn skip_card(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(_card_id): Path<u64>,
    Json(body): Json<SkipRequest>,
) -> Response {
    if let Err(err) = state.rate_limiter.check(&client_id(&addr), EndpointKind::Rate) {
        return rate_limited(err);
    }
    let Some(channel) = current_channel_for(&state, &body.session_id).await else {
        return session_not_found(&body.session_id);
    };

    let mut rx = channel.broadcast_tx.subscribe();
    if channel.events_tx.send(Event::Button(ButtonCommand::Skip)).await.is_err() {
        return session_expired(&body.session_id);
    }

    let deadline = Instant::now() + Duration::from_secs(2);
    wait_for_event(&mut rx, deadline, is_card_or_complete).await;
    card_progress_response(&channel).await
}

fn is_card_or_complete(event: &UiEvent) -> bool {
    matches!(event, UiEvent::Card { .. } | UiEvent::SessionComplete { .. })
}

async fn card_progress_response(channel: &SessionChannel) -> Response {
    let snapshot = channel.snapshot.lock().await;
    (
        StatusCode::OK,
        Json(json!({
            "session_id": channel.session_id,
            "card": snapshot.card,
            "progress": snapshot.progress,
            "last_rating": snapshot.last_rating,
        })),
    )
        .into_response()
}

async fn card_image(State(state): State<AppState>, Path(filename): Path<String>) -> Response {
    match state.store.get_card_image(&filename).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, guess_image_content_type(&filename))], bytes).into_response(),
        Err(err) => error_response(&err),
    }
}

fn guess_image_content_type(filename: &str) -> &'static str {
    match filename.rsplit('.').next().unwrap_or("").to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

async fn list_decks(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> Response {
    if let Err(err) = state.rate_limiter.check(&client_id(&addr), EndpointKind::Decks) {
        return rate_limited(err);
    }
    match state.store.get_decks_with_card_counts().await {
        Ok(mut decks) => {
            decks.sort_by(|a, b| b.total.cmp(&a.total));
            (StatusCode::OK, Json(decks)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn livekit_token(State(state): State<AppState>, Json(body): Json<LivekitTokenRequest>) -> Response {
    let realtime = &state.config.realtime;
    if realtime.api_key.is_empty() || realtime.api_secret.is_empty() || realtime.url.is_empty() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "realtime transport not configured"})),
        )
            .into_response();
    }

    let token = mint_livekit_token(realtime, &body.room, &body.participant);
    if state.dispatch_cache.should_dispatch(&body.room) {
        // Dispatching the agent process into the room is the realtime
        // transport's job; this cache only prevents us asking it twice.
        tracing::info!(room = %body.room, "agent dispatch requested for room");
    }

    (StatusCode::OK, Json(LivekitTokenResponse { token, url: realtime.url.clone() })).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let active_sessions = u32::from(state.session_manager.has_active_session().await);
    (StatusCode::OK, Json(json!({"status": "ok", "active_sessions": active_sessions}))).into_response()
}

/// Support-only escape hatch: gathers redacted logs + config into a zip and
/// reports where it landed. Same underlying bundle as the teacher's own
/// `doctor gather-diagnostics` action, exposed here as a route since this
/// crate has no interactive console to dispatch it from.
async fn diagnostics_export(State(state): State<AppState>) -> Response {
    match diagnostics::gather_diagnostic_bundle(&state.config) {
        Ok(path) => (StatusCode::OK, Json(json!({"path": path.to_string_lossy()}))).into_response(),
        Err(err) => error_response(&err),
    }
}

// ---------------------------------------------------------------------
// Realtime data channel (websocket)
// ---------------------------------------------------------------------

/// Client → server messages on the realtime channel (§6.2). The first
/// message on any connection MUST be `init_session`; everything sent
/// before that is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    InitSession { session_id: String },
    UserTextInput { text: String },
    UserQuestion { #[allow(dead_code)] text: String },
    Hint,
    GiveUp,
    MnemonicRequest,
    PttStart,
    PttEnd,
    PttCancel,
}

async fn realtime_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_realtime_socket(socket, state))
}

async fn handle_realtime_socket(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(channel) = wait_for_init(&mut ws_rx, &state).await else {
        let _ = send_ui_event(&mut ws_tx, &UiEvent::Error { message: "unknown or expired session".into() }).await;
        return;
    };

    let mut broadcast_rx = channel.broadcast_tx.subscribe();

    if let Some(initial) = replay_snapshot(&channel).await {
        if send_ui_event(&mut ws_tx, &initial).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = broadcast_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_ui_event(&mut ws_tx, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                            dispatch_client_message(&state, &channel.session_id, msg).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn wait_for_init(ws_rx: &mut SplitStream<WebSocket>, state: &AppState) -> Option<Arc<SessionChannel>> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Ok(ClientMessage::InitSession { session_id }) = serde_json::from_str(&text) {
                    return current_channel_for(state, &session_id).await;
                }
            }
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) | Some(Err(_)) => {}
        }
    }
}

async fn replay_snapshot(channel: &SessionChannel) -> Option<UiEvent> {
    let snapshot = channel.snapshot.lock().await;
    let card = snapshot.card.clone()?;
    let progress = snapshot.progress?;
    Some(UiEvent::Card { card, progress, last_rating: snapshot.last_rating })
}

async fn send_ui_event(ws_tx: &mut SplitSink<WebSocket, Message>, event: &UiEvent) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_owned());
    ws_tx.send(Message::Text(text.into())).await
}

async fn dispatch_client_message(state: &AppState, session_id: &str, msg: ClientMessage) {
    let event = match msg {
        ClientMessage::InitSession { .. } => return,
        ClientMessage::UserTextInput { text } => Event::UserText(text),
        ClientMessage::UserQuestion { .. } => Event::Button(ButtonCommand::Question),
        ClientMessage::Hint => Event::Button(ButtonCommand::Hint),
        ClientMessage::GiveUp => Event::Button(ButtonCommand::GiveUp),
        ClientMessage::MnemonicRequest => Event::Button(ButtonCommand::Mnemonic),
        ClientMessage::PttStart => Event::Ptt(PttEvent::Start),
        ClientMessage::PttEnd => Event::Ptt(PttEvent::End),
        ClientMessage::PttCancel => Event::Ptt(PttEvent::Cancel),
    };
    if let Err(err) = state.session_manager.send_event(session_id, event).await {
        warn!(error = %err, session_id, "failed to route realtime client message");
    }
}

// ---------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------

fn spawn_forwarder(
    mut ui_rx: mpsc::Receiver<UiEvent>,
    channel: Arc<SessionChannel>,
    current: Arc<Mutex<Option<Arc<SessionChannel>>>>,
) {
    tokio::spawn(async move {
        while let Some(event) = ui_rx.recv().await {
            {
                let mut snapshot = channel.snapshot.lock().await;
                match &event {
                    UiEvent::Card { card, progress, last_rating } => {
                        snapshot.card = Some(card.clone());
                        snapshot.progress = Some(*progress);
                        snapshot.last_rating = *last_rating;
                    }
                    UiEvent::RatingResult { rating, progress, .. } => {
                        snapshot.last_rating = Some(*rating);
                        snapshot.progress = Some(*progress);
                    }
                    UiEvent::RevealAnswer { progress, .. } => {
                        snapshot.progress = Some(*progress);
                    }
                    UiEvent::SessionComplete { stats } => {
                        snapshot.stats = Some(stats.clone());
                    }
                    _ => {}
                }
            }
            // No subscribers yet (e.g. the REST caller never opened a
            // websocket) is not an error; the snapshot above is already
            // durable enough for polling endpoints.
            let _ = channel.broadcast_tx.send(event);
        }

        let mut guard = current.lock().await;
        if guard.as_ref().is_some_and(|c| c.session_id == channel.session_id) {
            *guard = None;
        }
    });
}

async fn current_channel_for(state: &AppState, session_id: &str) -> Option<Arc<SessionChannel>> {
    let guard = state.current.lock().await;
    guard.as_ref().filter(|c| c.session_id == session_id).cloned()
}

/// Waits until `pred` matches a broadcast event or `deadline` passes.
/// Returns `true` iff it matched. Tolerates receiver lag (a slow consumer
/// missing some events) by just continuing to wait for the next one.
async fn wait_for_event<F>(rx: &mut broadcast::Receiver<UiEvent>, deadline: Instant, pred: F) -> bool
where
    F: Fn(&UiEvent) -> bool,
{
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => return true,
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            _ => return false,
        }
    }
}

fn client_id(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}

fn error_response(err: &TutorError) -> Response {
    let status = match err {
        TutorError::SessionConflict { .. } => StatusCode::CONFLICT,
        TutorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        TutorError::SessionExpired(_) => StatusCode::UNAUTHORIZED,
        _ => match err.class() {
            ErrorClass::Input => StatusCode::BAD_REQUEST,
            ErrorClass::Transient | ErrorClass::Permanent => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::State => StatusCode::CONFLICT,
            ErrorClass::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    };
    (status, Json(json!({"error": err.code(), "message": err.to_string()}))).into_response()
}

fn session_not_found(id: &str) -> Response {
    error_response(&TutorError::SessionNotFound(id.to_owned()))
}

fn session_expired(id: &str) -> Response {
    error_response(&TutorError::SessionExpired(id.to_owned()))
}

fn rate_limited(err: RateLimitError) -> Response {
    let RateLimitError::Exceeded { retry_after_secs } = err;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, HeaderValue::from_str(&retry_after_secs.to_string()).unwrap_or(HeaderValue::from_static("1")))],
        Json(json!({"error": "RATE_LIMITED", "retry_after_secs": retry_after_secs})),
    )
        .into_response()
}

/// Mints a LiveKit-style access token: a JWT with a video grant for
/// `room`, signed HS256 with the configured API secret. LiveKit's own
/// server SDKs produce the same shape; implemented by hand here since
/// no example in the pack mints one, using the `base64`/`sha2` crates
/// the rest of this crate already depends on plus `hmac`, their natural
/// RustCrypto pairing for keyed hashing.
fn mint_livekit_token(realtime: &RealtimeConfig, room: &str, participant: &str) -> String {
    #[derive(Serialize)]
    struct VideoGrant<'a> {
        room: &'a str,
        #[serde(rename = "roomJoin")]
        room_join: bool,
        #[serde(rename = "canPublish")]
        can_publish: bool,
        #[serde(rename = "canSubscribe")]
        can_subscribe: bool,
    }

    #[derive(Serialize)]
    struct Claims<'a> {
        iss: &'a str,
        sub: &'a str,
        nbf: i64,
        exp: i64,
        video: VideoGrant<'a>,
    }

    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        iss: &realtime.api_key,
        sub: participant,
        nbf: now - 10,
        exp: now + 6 * 60 * 60,
        video: VideoGrant { room, room_join: true, can_publish: true, can_subscribe: true },
    };

    let header = json!({"alg": "HS256", "typ": "JWT"});
    let header_b64 = base64_url(&serde_json::to_vec(&header).unwrap_or_default());
    let claims_b64 = base64_url(&serde_json::to_vec(&claims).unwrap_or_default());
    let signing_input = format!("{header_b64}.{claims_b64}");

    let mut mac = Hmac::<Sha256>::new_from_slice(realtime.api_secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(signing_input.as_bytes());
    let signature = base64_url(&mac.finalize().into_bytes());

    format!("{signing_input}.{signature}")
}

fn base64_url(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn origin_allowed(origins: &[String], origin: &str) -> bool {
    origins.iter().any(|o| o == origin || o == "*")
}

/// Hand-rolled CORS: no example in the pack pulls in a CORS crate, so
/// this follows the corpus's own pattern of a small `axum::middleware`
/// function rather than introducing a new dependency for one concern.
async fn cors_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()).map(str::to_owned);
    let is_preflight = request.method() == Method::OPTIONS;

    let mut response = if is_preflight { StatusCode::NO_CONTENT.into_response() } else { next.run(request).await };

    if let Some(origin) = origin.filter(|o| origin_allowed(&state.config.cors.origins, o)) {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        if is_preflight {
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static("GET, POST, HEAD, OPTIONS"));
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("content-type"));
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("600"));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::QueueClass;
    use crate::evaluation_service::EvaluationService;
    use crate::hint_service::HintService;
    use crate::ports::{DeckSummary, EvaluateRequest, ExplanationResponse, HintResponse, HintType, LlmPort, RawEvaluation};
    use crate::session_manager::SessionDeps;
    use async_trait::async_trait;

    struct StubLlm;

    #[async_trait]
    impl LlmPort for StubLlm {
        async fn evaluate(&self, _r: EvaluateRequest<'_>) -> crate::error::Result<RawEvaluation> {
            unimplemented!()
        }
        async fn generate_hint(
            &self,
            _q: &str,
            _a: &str,
            _level: u32,
            _ph: &[String],
            _ua: &[String],
            _sc: &[String],
            _gap: Option<&str>,
        ) -> crate::error::Result<HintResponse> {
            Ok(HintResponse { hint: "hint".into(), hint_type: HintType::Contextual })
        }
        async fn explain_answer(&self, _q: &str, _a: &str) -> crate::error::Result<ExplanationResponse> {
            Ok(ExplanationResponse { summary: "because".into() })
        }
    }

    struct StubStore;

    #[async_trait]
    impl FlashcardStore for StubStore {
        async fn get_decks(&self) -> crate::error::Result<Vec<DeckSummary>> {
            Ok(vec![])
        }
        async fn get_decks_with_card_counts(&self) -> crate::error::Result<Vec<DeckSummary>> {
            Ok(vec![
                DeckSummary { name: "Small".into(), new: 1, learn: 0, due: 1, total: 2 },
                DeckSummary { name: "Big".into(), new: 5, learn: 5, due: 5, total: 15 },
            ])
        }
        async fn get_reviewable_cards(&self, _deck: &str) -> crate::error::Result<Vec<crate::domain::card::Card>> {
            Ok(vec![crate::domain::card::Card {
                id: 1,
                deck_name: "Capitals".into(),
                question: "Capital of France?".into(),
                answer: "Paris".into(),
                image_url: None,
                queue_class: QueueClass::Review,
            }])
        }
        async fn submit_review(&self, _card_id: u64, _session_id: &str, _rating: Rating) -> crate::error::Result<()> {
            Ok(())
        }
        async fn get_card_image(&self, _filename: &str) -> crate::error::Result<Vec<u8>> {
            Err(TutorError::Store("no images".into()))
        }
    }

    fn state() -> AppState {
        let store: Arc<dyn FlashcardStore> = Arc::new(StubStore);
        let llm = Arc::new(StubLlm);
        let recovery = Arc::new(RecoveryStore::open_in_memory().unwrap());
        let deps = SessionDeps {
            store: Arc::clone(&store),
            evaluation: Arc::new(EvaluationService::new(llm.clone())),
            hints: Arc::new(HintService::new(llm)),
            recovery: Arc::clone(&recovery),
            usage: None,
            tts: Arc::new(crate::adapters::speech_stub::NullTtsAdapter),
            inactivity_timeout: Duration::from_secs(1800),
        };
        let session_manager = Arc::new(SessionManager::new(deps));
        AppState::new(session_manager, store, recovery, Arc::new(TutorConfig::default()))
    }

    #[test]
    fn guess_image_content_type_maps_known_extensions() {
        assert_eq!(guess_image_content_type("card.png"), "image/png");
        assert_eq!(guess_image_content_type("card.JPG"), "image/jpeg");
        assert_eq!(guess_image_content_type("card.webp"), "image/webp");
    }

    #[test]
    fn guess_image_content_type_defaults_to_octet_stream() {
        assert_eq!(guess_image_content_type("card"), "application/octet-stream");
        assert_eq!(guess_image_content_type("card.bin"), "application/octet-stream");
    }

    #[test]
    fn origin_allowed_matches_exact_and_wildcard() {
        let origins = vec!["https://app.example.com".to_owned()];
        assert!(origin_allowed(&origins, "https://app.example.com"));
        assert!(!origin_allowed(&origins, "https://evil.example.com"));
        assert!(origin_allowed(&["*".to_owned()], "https://anything.example.com"));
    }

    #[test]
    fn mint_livekit_token_has_three_segments_and_valid_signature() {
        let realtime = RealtimeConfig {
            url: "wss://example.livekit.cloud".into(),
            api_key: "key123".into(),
            api_secret: "supersecret".into(),
        };
        let token = mint_livekit_token(&realtime, "room-1", "learner-1");
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let mut mac = Hmac::<Sha256>::new_from_slice(realtime.api_secret.as_bytes()).unwrap();
        mac.update(signing_input.as_bytes());
        let expected = base64_url(&mac.finalize().into_bytes());
        assert_eq!(parts[2], expected);
    }

    #[tokio::test]
    async fn health_reports_zero_active_sessions_with_no_session() {
        let response = health(State(state())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn session_current_is_not_found_when_no_session_active() {
        let response = session_current(State(state())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_current_head_is_not_found_when_no_session_active() {
        let status = session_current_head(State(state())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_decks_sorts_by_total_descending() {
        let app_state = state();
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let response = list_decks(State(app_state), ConnectInfo(addr)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn livekit_token_is_unavailable_without_realtime_config() {
        let response = livekit_token(
            State(state()),
            Json(LivekitTokenRequest {
                room: "room-1".into(),
                participant: "learner-1".into(),
                deck: None,
                input_mode: None,
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn wait_for_event_returns_true_when_predicate_matches() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(UiEvent::Error { message: "ignored".into() }).unwrap();
        tx.send(UiEvent::SessionComplete {
            stats: SessionStats { cards_reviewed: 1, ratings: Default::default(), synced_count: 1, failed_count: 0, duration_minutes: 1.0 },
        })
        .unwrap();

        let matched = wait_for_event(&mut rx, Instant::now() + Duration::from_secs(1), |e| {
            matches!(e, UiEvent::SessionComplete { .. })
        })
        .await;
        assert!(matched);
    }

    #[tokio::test]
    async fn diagnostics_export_writes_a_bundle_and_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TUTOR_DATA_DIR", dir.path()) };
        let response = diagnostics_export(State(state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        unsafe { std::env::remove_var("TUTOR_DATA_DIR") };
    }

    #[tokio::test]
    async fn wait_for_event_times_out_when_nothing_matches() {
        let (_tx, mut rx) = broadcast::channel::<UiEvent>(8);
        let matched = wait_for_event(&mut rx, Instant::now() + Duration::from_millis(50), |_| true).await;
        assert!(!matched);
    }
}
