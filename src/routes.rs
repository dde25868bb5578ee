use std::sync::Arc;
use actix_web::{web, HttpResponse};

use crate::auth::{self, Auth};
use crate::conversation::{can_request_friend, sanitize, BOARD_MESSAGE_MAX, CHAT_MESSAGE_MAX, THREAD_TITLE_MAX};
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
// Bring trait method namespaces into scope so calls through `dyn Repo` resolve.
use crate::repo::{ConversationRepo, FriendRepo, IdentityRepo, ThreadRepo};
use crate::topics;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/topics/sample").route(web::get().to(sample_topics)))
            .service(
                web::resource("/topics/{theme}/prompt/{index}").route(web::get().to(topic_prompt)),
            )
            .service(
                web::resource("/threads")
                    .route(web::get().to(list_threads))
                    .route(web::post().to(create_thread)),
            )
            .service(
                web::resource("/threads/{id}/messages")
                    .route(web::get().to(list_thread_messages))
                    .route(web::post().to(post_thread_message)),
            )
            .service(web::resource("/chat/{partner}").route(web::get().to(get_conversation)))
            .service(
                web::resource("/chat/{partner}/messages").route(web::post().to(post_chat_message)),
            )
            .service(web::resource("/friends").route(web::get().to(list_friends)))
            .service(
                web::resource("/friends/requests")
                    .route(web::get().to(list_incoming_requests))
                    .route(web::post().to(send_friend_request)),
            )
            .service(
                web::resource("/friends/requests/{from}/approve")
                    .route(web::post().to(approve_friend_request)),
            )
            // Admin moderation endpoints
            .service(web::resource("/admin/identities").route(web::get().to(admin_list_identities)))
            .service(web::resource("/admin/messages/{id}").route(web::delete().to(admin_delete_message)))
            .service(
                web::resource("/admin/threads/{id}/messages")
                    .route(web::delete().to(admin_purge_thread)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub admin_handle: String,
    pub rate: RateLimiterFacade,
}

// Admin authority is handle equality against the configured identity, not a
// role table.
macro_rules! ensure_admin { ($auth:expr, $data:expr) => { if $auth.0.sub != $data.admin_handle { return Err(ApiError::Forbidden); } }; }

// ---------------- identity ----------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub handle: String,
    pub password: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub handle: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = NewIdentity,
    responses(
        (status = 201, description = "Identity registered", body = Identity),
        (status = 409, description = "Handle already taken"),
        (status = 422, description = "Invalid handle or password")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<NewIdentity>,
) -> Result<HttpResponse, ApiError> {
    let handle = payload.handle.trim();
    let password = payload.password.trim();
    if handle.is_empty() || password.is_empty() {
        return Err(ApiError::Validation("handle and password are required".into()));
    }
    if handle.contains(':') {
        return Err(ApiError::Validation("handle must not contain ':'".into()));
    }
    let digest = auth::hash_password(password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let identity = data.repo.create_identity(handle, &digest).await?;
    Ok(HttpResponse::Created().json(identity))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 401, description = "Invalid handle or password")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let handle = payload.handle.trim();
    // one failure message for unknown handle and wrong password alike
    if !auth::verify_login(data.repo.as_ref(), handle, payload.password.trim()).await? {
        return Err(ApiError::Unauthorized);
    }
    let token = auth::create_jwt(handle).map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token, handle: handle.to_string() }))
}

#[derive(serde::Serialize)]
struct MeResponse {
    handle: String,
    is_admin: bool,
}

pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let is_admin = auth.0.sub == data.admin_handle;
    Ok(HttpResponse::Ok().json(MeResponse { handle: auth.0.sub, is_admin }))
}

// ---------------- board surface -----------------------------------

#[derive(Debug, serde::Deserialize)]
pub struct ThreadQuery {
    pub keyword: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/threads",
    params(("keyword" = Option<String>, Query, description = "Title substring filter")),
    responses((status = 200, description = "List threads, newest first", body = [Thread]))
)]
pub async fn list_threads(
    data: web::Data<AppState>,
    query: web::Query<ThreadQuery>,
) -> Result<HttpResponse, ApiError> {
    let keyword = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty());
    let threads = data.repo.list_threads(keyword).await?;
    Ok(HttpResponse::Ok().json(threads))
}

#[utoipa::path(
    post,
    path = "/api/v1/threads",
    request_body = NewThread,
    responses(
        (status = 201, description = "Thread created", body = Thread),
        (status = 422, description = "Empty title")
    )
)]
pub async fn create_thread(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewThread>,
) -> Result<HttpResponse, ApiError> {
    if !data.rate.allow_thread(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let title = sanitize(&payload.title, THREAD_TITLE_MAX);
    if title.is_empty() {
        return Err(ApiError::Validation("thread title is required".into()));
    }
    let thread = data.repo.create_thread(NewThread { title }).await?;
    Ok(HttpResponse::Created().json(thread))
}

#[utoipa::path(
    get,
    path = "/api/v1/threads/{id}/messages",
    params(("id" = Id, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread feed, newest first", body = [Message]),
        (status = 404, description = "Thread not found")
    )
)]
pub async fn list_thread_messages(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let thread_id = path.into_inner();
    data.repo.get_thread(thread_id).await?;
    let messages = data.repo.thread_messages(thread_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct PostMessageInput {
    pub body: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/threads/{id}/messages",
    params(("id" = Id, Path, description = "Thread id")),
    request_body = PostMessageInput,
    responses(
        (status = 201, description = "Message posted", body = Message),
        (status = 404, description = "Thread not found"),
        (status = 422, description = "Empty message")
    )
)]
pub async fn post_thread_message(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<PostMessageInput>,
) -> Result<HttpResponse, ApiError> {
    let thread_id = path.into_inner();
    data.repo.get_thread(thread_id).await?;
    if !data.rate.allow_message(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let body = sanitize(&payload.body, BOARD_MESSAGE_MAX);
    if body.is_empty() {
        return Err(ApiError::Validation("message body is required".into()));
    }
    let message = data
        .repo
        .append_message(NewMessage {
            sender: auth.0.sub,
            target: thread_target(thread_id),
            body,
            theme: None,
        })
        .await?;
    Ok(HttpResponse::Created().json(message))
}

// ---------------- pairing space & chat ----------------------------

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct TopicOffer {
    pub theme: String,
    pub prompts: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/topics/sample",
    responses((status = 200, description = "Four themes drawn without replacement", body = [TopicOffer]))
)]
pub async fn sample_topics() -> Result<HttpResponse, ApiError> {
    let offers: Vec<TopicOffer> = topics::sample(topics::SAMPLE_SIZE)
        .into_iter()
        .filter_map(|theme| {
            topics::prompts(theme).map(|cards| TopicOffer {
                theme: theme.to_string(),
                prompts: cards.iter().map(|c| c.to_string()).collect(),
            })
        })
        .collect();
    Ok(HttpResponse::Ok().json(offers))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct PromptCard {
    pub theme: String,
    pub index: usize,
    pub prompt: String,
}

/// The card index itself is session state on the client; any value is
/// accepted here and wrapped onto the theme's three cards.
#[utoipa::path(
    get,
    path = "/api/v1/topics/{theme}/prompt/{index}",
    params(
        ("theme" = String, Path, description = "Theme name"),
        ("index" = usize, Path, description = "Rotating card index, wraps modulo 3")
    ),
    responses(
        (status = 200, description = "Prompt card", body = PromptCard),
        (status = 404, description = "Unknown theme")
    )
)]
pub async fn topic_prompt(path: web::Path<(String, usize)>) -> Result<HttpResponse, ApiError> {
    let (theme, index) = path.into_inner();
    let prompt = topics::prompt_at(&theme, index).ok_or(ApiError::NotFound)?;
    Ok(HttpResponse::Ok().json(PromptCard {
        theme,
        index: index % topics::PROMPTS_PER_THEME,
        prompt: prompt.to_string(),
    }))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ConversationView {
    pub partner: String,
    /// Established by the earliest tagged message; never by selection alone.
    pub theme: Option<String>,
    pub prompts: Option<Vec<String>>,
    pub message_count: usize,
    pub can_request_friend: bool,
    pub messages: Vec<Message>,
}

#[utoipa::path(
    get,
    path = "/api/v1/chat/{partner}",
    params(("partner" = String, Path, description = "Partner handle")),
    responses(
        (status = 200, description = "Conversation with derived state", body = ConversationView),
        (status = 404, description = "No such handle")
    )
)]
pub async fn get_conversation(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let partner = path.into_inner();
    let partner = partner.trim();
    data.repo.get_identity(partner).await?;
    let messages = data.repo.conversation(&auth.0.sub, partner).await?;
    // messages are ascending, so the first tagged one decides the theme
    let theme = messages.iter().find_map(|m| m.theme.clone());
    let prompts = theme
        .as_deref()
        .and_then(topics::prompts)
        .map(|cards| cards.iter().map(|c| c.to_string()).collect());
    let message_count = messages.len();
    Ok(HttpResponse::Ok().json(ConversationView {
        partner: partner.to_string(),
        theme,
        prompts,
        message_count,
        can_request_friend: can_request_friend(message_count),
        messages,
    }))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct NewChatMessage {
    pub body: String,
    /// Theme selected this session; only takes effect while the
    /// conversation is still unthemed.
    pub theme: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/chat/{partner}/messages",
    params(("partner" = String, Path, description = "Partner handle")),
    request_body = NewChatMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 404, description = "No such handle"),
        (status = 422, description = "Empty message or unknown theme")
    )
)]
pub async fn post_chat_message(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<NewChatMessage>,
) -> Result<HttpResponse, ApiError> {
    let partner = path.into_inner();
    let partner = partner.trim().to_string();
    data.repo.get_identity(&partner).await?;
    if !data.rate.allow_message(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let body = sanitize(&payload.body, CHAT_MESSAGE_MAX);
    if body.is_empty() {
        return Err(ApiError::Validation("message body is required".into()));
    }
    if let Some(theme) = payload.theme.as_deref() {
        if !topics::is_theme(theme) {
            return Err(ApiError::Validation(format!("unknown theme '{theme}'")));
        }
    }
    // An established theme always wins over this session's selection; the
    // first durably ordered themed message decided it.
    let established = data.repo.conversation_theme(&auth.0.sub, &partner).await?;
    let theme = established.or_else(|| payload.theme.clone());
    let message = data
        .repo
        .append_message(NewMessage { sender: auth.0.sub, target: partner, body, theme })
        .await?;
    Ok(HttpResponse::Created().json(message))
}

// ---------------- relationship graph ------------------------------

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct FriendRequestInput {
    pub to: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/friends/requests",
    request_body = FriendRequestInput,
    responses(
        (status = 201, description = "Request sent", body = FriendRequest),
        (status = 403, description = "Not enough messages exchanged"),
        (status = 404, description = "No such handle"),
        (status = 409, description = "Already requested")
    )
)]
pub async fn send_friend_request(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<FriendRequestInput>,
) -> Result<HttpResponse, ApiError> {
    let to = payload.to.trim().to_string();
    if to == auth.0.sub {
        return Err(ApiError::Validation("cannot befriend yourself".into()));
    }
    data.repo.get_identity(&to).await?;
    // threshold gate: recomputed from the log on every attempt
    let count = data.repo.conversation(&auth.0.sub, &to).await?.len();
    if !can_request_friend(count) {
        return Err(ApiError::Forbidden);
    }
    if !data.rate.allow_request(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let request = data.repo.create_friend_request(&auth.0.sub, &to).await?;
    Ok(HttpResponse::Created().json(request))
}

#[utoipa::path(
    get,
    path = "/api/v1/friends/requests",
    responses((status = 200, description = "Pending requests addressed to the caller", body = [FriendRequest]))
)]
pub async fn list_incoming_requests(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let requests = data.repo.pending_requests_to(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(requests))
}

#[utoipa::path(
    post,
    path = "/api/v1/friends/requests/{from}/approve",
    params(("from" = String, Path, description = "Requesting handle")),
    responses(
        (status = 200, description = "Approved; both edges exist"),
        (status = 404, description = "No such request")
    )
)]
pub async fn approve_friend_request(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let from = path.into_inner();
    data.repo.approve_friend_request(&auth.0.sub, from.trim()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"})))
}

#[utoipa::path(
    get,
    path = "/api/v1/friends",
    responses((status = 200, description = "The caller's friends", body = [String]))
)]
pub async fn list_friends(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let friends = data.repo.friends_of(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(friends))
}

// ---------------- admin moderation --------------------------------

pub async fn admin_list_identities(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth, data);
    let identities = data.repo.list_identities().await?;
    Ok(HttpResponse::Ok().json(identities))
}

pub async fn admin_delete_message(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth, data);
    data.repo.delete_message(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn admin_purge_thread(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth, data);
    let thread_id = path.into_inner();
    data.repo.get_thread(thread_id).await?;
    let purged = data.repo.purge_thread(thread_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok","purged":purged})))
}
