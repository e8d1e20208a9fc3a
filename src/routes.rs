use std::future::Future;
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::{StreamExt, TryStreamExt as _};
use metrics::increment_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use uuid::Uuid;

use crate::auth::{self, Auth, Role};
use crate::error::ApiError;
use crate::feed::Subscription;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{Repo, RepoError};
use crate::require_role;
use crate::session::{self, ProfileState, SessionHub, SessionState};
use crate::storage::{self, FileStore, FileStoreError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/register").route(web::post().to(register)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(
                web::resource("/auth/password-reset")
                    .route(web::post().to(request_password_reset)),
            )
            .service(
                web::resource("/auth/password-reset/confirm")
                    .route(web::post().to(confirm_password_reset)),
            )
            .service(web::resource("/profile").route(web::patch().to(update_profile)))
            .service(web::resource("/messages").route(web::post().to(send_message)))
            .service(
                web::resource("/messages/{peer}/stream")
                    .route(web::get().to(stream_conversation)),
            )
            .service(web::resource("/messages/{id}/read").route(web::post().to(mark_message_read)))
            .service(web::resource("/messages/{peer}").route(web::get().to(get_conversation)))
            .service(
                web::resource("/students")
                    .route(web::get().to(list_students))
                    .route(web::post().to(create_student)),
            )
            .service(web::resource("/students/mine").route(web::get().to(my_students)))
            .service(web::resource("/progress").route(web::post().to(create_progress_report)))
            .service(
                web::resource("/progress/{student_id}")
                    .route(web::get().to(list_progress_reports)),
            )
            .service(
                web::resource("/announcements")
                    .route(web::get().to(list_announcements))
                    .route(web::post().to(create_announcement)),
            )
            .service(
                web::resource("/announcements/stream")
                    .route(web::get().to(stream_announcements)),
            )
            .service(
                web::resource("/events")
                    .route(web::get().to(list_events))
                    .route(web::post().to(create_event)),
            )
            .service(web::resource("/events/stream").route(web::get().to(stream_events)))
            .service(
                web::resource("/files")
                    .route(web::get().to(list_files))
                    .route(web::post().to(upload_file)),
            )
            .service(web::resource("/notifications").route(web::get().to(list_notifications)))
            .service(
                web::resource("/notifications/{id}/read")
                    .route(web::post().to(mark_notification_read)),
            ),
    );
    // Public blob fetch (no /api/v1 prefix so issued download URLs resolve as-is)
    cfg.route("/files/{path:.*}", web::get().to(get_file));
    cfg.route("/metrics", web::get().to(metrics_endpoint));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub file_store: Arc<dyn FileStore>,
    pub sessions: SessionHub,
    pub limiter: RateLimiterFacade,
}

// ---------------- metrics ----------------

static PROMETHEUS: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder once; safe to call repeatedly.
pub fn install_metrics() {
    let _ = PROMETHEUS.get_or_try_init(|| PrometheusBuilder::new().install_recorder());
}

pub async fn metrics_endpoint() -> HttpResponse {
    match PROMETHEUS.get() {
        Some(handle) => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "text/plain; version=0.0.4"))
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().finish(),
    }
}

// ---------------- helpers ----------------

/// Display name for denormalized copies. A missing profile degrades to an
/// empty name rather than failing the write.
async fn display_name(data: &AppState, user_id: &str) -> String {
    data.repo.get_profile(user_id).await.map(|p| p.name).unwrap_or_default()
}

/// Wrap a live subscription as an SSE response. Each snapshot is one
/// `data:` frame holding the full JSON result set. The stream ends when
/// `stop` resolves (session signed out) or the subscription closes.
fn sse_response<T>(sub: Subscription<T>, stop: impl Future<Output = ()> + Send + 'static) -> HttpResponse
where
    T: serde::Serialize + Clone + PartialEq + Send + 'static,
{
    let stream = sub.into_stream().take_until(stop).map(|snap| {
        let json = serde_json::to_string(&snap.docs).unwrap_or_else(|_| "[]".into());
        Ok::<_, actix_web::Error>(web::Bytes::from(format!("data: {json}\n\n")))
    });
    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream)
}

// ---------------- auth ----------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid registration"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.email.trim().is_empty() || !req.email.contains('@') {
        return Err(ApiError::BadRequest("a valid email is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }
    let hash = auth::hash_password(&req.password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let profile = data.repo.create_account(NewProfile::from(&req), hash).await?;
    let jti = Uuid::new_v4().to_string();
    let token = auth::create_jwt(&profile.id, profile.role, &jti).map_err(|_| ApiError::Internal)?;
    // Registration already holds the profile; commit it directly.
    let epoch = data.sessions.signed_in(&jti, &profile.id);
    data.sessions.commit_profile(&jti, epoch, Ok(profile.clone()));
    increment_counter!("classlink_registrations_total");
    Ok(HttpResponse::Created().json(AuthResponse { token, profile: Some(profile) }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad credentials"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if !data.limiter.allow_login(&req.email) {
        return Err(ApiError::TooManyRequests);
    }
    // Unknown email and bad password are indistinguishable to the caller.
    let account = match data.repo.find_account_by_email(&req.email).await {
        Ok(a) => a,
        Err(RepoError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };
    if !auth::verify_password(&req.password, &account.password_hash) {
        return Err(ApiError::Unauthorized);
    }
    let jti = Uuid::new_v4().to_string();
    let token = auth::create_jwt(&account.id, account.role, &jti).map_err(|_| ApiError::Internal)?;
    let epoch = data.sessions.signed_in(&jti, &account.id);
    data.sessions.resolve_profile(&jti, epoch, data.repo.as_ref(), &account.id).await;
    let profile = match data.sessions.state(&jti) {
        SessionState::SignedIn { profile: ProfileState::Loaded(p), .. } => Some(p),
        _ => None,
    };
    increment_counter!("classlink_logins_total");
    Ok(HttpResponse::Ok().json(AuthResponse { token, profile }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Signed out; live streams for this session end"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn logout(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    data.sessions.signed_out(&auth.0.jti);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn refresh_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let jti = Uuid::new_v4().to_string();
    let token = auth::create_jwt(&auth.0.sub, auth.0.role, &jti).map_err(|_| ApiError::Internal)?;
    let epoch = data.sessions.signed_in(&jti, &auth.0.sub);
    data.sessions.resolve_profile(&jti, epoch, data.repo.as_ref(), &auth.0.sub).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "token": token })))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub role: Role,
    pub profile: Option<UserProfile>,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let profile = data.repo.get_profile(&auth.0.sub).await.ok();
    Ok(HttpResponse::Ok().json(MeResponse { id: auth.0.sub, role: auth.0.role, profile }))
}

pub async fn request_password_reset(
    data: web::Data<AppState>,
    payload: web::Json<PasswordResetRequest>,
) -> Result<HttpResponse, ApiError> {
    let email = payload.into_inner().email;
    if !data.limiter.allow_login(&email) {
        return Err(ApiError::TooManyRequests);
    }
    let (token, token_hash) = auth::new_reset_token();
    let expires = Utc::now() + chrono::Duration::hours(1);
    match data.repo.set_reset_token(&email, token_hash, expires).await {
        // No mailer in this deployment; the operator relays the token.
        Ok(()) => log::info!("password reset token issued for {email}: {token}"),
        Err(RepoError::NotFound) => log::info!("password reset requested for unknown email {email}"),
        Err(e) => return Err(e.into()),
    }
    // Identical response either way; account existence is not disclosed.
    Ok(HttpResponse::Accepted().json(serde_json::json!({ "status": "accepted" })))
}

pub async fn confirm_password_reset(
    data: web::Data<AppState>,
    payload: web::Json<PasswordResetConfirm>,
) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    if req.new_password.len() < 8 {
        return Err(ApiError::BadRequest("password must be at least 8 characters".into()));
    }
    let hash = auth::hash_password(&req.new_password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    match data
        .repo
        .complete_password_reset(&auth::hash_reset_token(&req.token), hash)
        .await
    {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(RepoError::NotFound) => Err(ApiError::BadRequest("invalid or expired token".into())),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/profile",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 404, description = "Profile not found"),
        (status = 409, description = "expected_version is stale")
    )
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let profile = data.repo.update_profile(&auth.0.sub, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

// ---------------- messaging ----------------

#[utoipa::path(
    post,
    path = "/api/v1/messages",
    request_body = NewMessage,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn send_message(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    if !data.limiter.allow_message(&auth.0.sub) {
        return Err(ApiError::TooManyRequests);
    }
    let sender_name = display_name(&data, &auth.0.sub).await;
    let message = data.repo.send_message(payload.into_inner(), &auth.0.sub, &sender_name).await?;
    Ok(HttpResponse::Created().json(message))
}

#[utoipa::path(
    get,
    path = "/api/v1/messages/{peer}",
    params(("peer" = String, Path, description = "Other participant's user id")),
    responses(
        (status = 200, description = "Conversation with peer, newest first, capped at 50", body = [Message])
    )
)]
pub async fn get_conversation(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let peer = path.into_inner();
    let messages = data.repo.conversation(&auth.0.sub, &peer).await?;
    Ok(HttpResponse::Ok().json(messages))
}

pub async fn stream_conversation(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let peer = path.into_inner();
    let sub = data.repo.subscribe_conversation(&auth.0.sub, &peer);
    let rx = data.sessions.watch(&auth.0.jti, &auth.0.sub);
    increment_counter!("classlink_streams_opened_total", "feed" => "conversation");
    Ok(sse_response(sub, session::until_signed_out(rx)))
}

#[utoipa::path(
    post,
    path = "/api/v1/messages/{id}/read",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message marked read (idempotent)", body = Message),
        (status = 404, description = "Message not found")
    )
)]
pub async fn mark_message_read(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let message = data.repo.mark_message_read(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message))
}

// ---------------- roster ----------------

#[utoipa::path(
    post,
    path = "/api/v1/students",
    request_body = NewStudent,
    responses(
        (status = 201, description = "Student created", body = Student),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn create_student(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewStudent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Teacher);
    let teacher_name = display_name(&data, &auth.0.sub).await;
    let student = data.repo.create_student(payload.into_inner(), &auth.0.sub, &teacher_name).await?;
    Ok(HttpResponse::Created().json(student))
}

#[utoipa::path(
    get,
    path = "/api/v1/students",
    responses(
        (status = 200, description = "Caller's roster", body = [Student]),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn list_students(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Teacher);
    let students = data.repo.students_by_teacher(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(students))
}

#[utoipa::path(
    get,
    path = "/api/v1/students/mine",
    responses(
        (status = 200, description = "Students linked to the calling parent", body = [Student]),
        (status = 403, description = "Parents only")
    )
)]
pub async fn my_students(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Parent);
    let students = data.repo.students_by_parent(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(students))
}

// ---------------- progress reports ----------------

#[utoipa::path(
    post,
    path = "/api/v1/progress",
    request_body = NewProgressReport,
    responses(
        (status = 201, description = "Report created; linked parent notified", body = ProgressReport),
        (status = 403, description = "Teachers only"),
        (status = 404, description = "Student not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_progress_report(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewProgressReport>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Teacher);
    if !data.limiter.allow_report(&auth.0.sub) {
        return Err(ApiError::TooManyRequests);
    }
    let req = payload.into_inner();
    let student = data.repo.get_student(&req.student_id).await.map_err(|_| ApiError::NotFound)?;
    let teacher_name = display_name(&data, &auth.0.sub).await;
    let report = data
        .repo
        .create_progress_report(req, &student, &auth.0.sub, &teacher_name)
        .await?;
    Ok(HttpResponse::Created().json(report))
}

#[utoipa::path(
    get,
    path = "/api/v1/progress/{student_id}",
    params(("student_id" = String, Path, description = "Student id")),
    responses(
        (status = 200, description = "Reports for the student, newest first", body = [ProgressReport])
    )
)]
pub async fn list_progress_reports(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let reports = data.repo.reports_by_student(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(reports))
}

// ---------------- announcements ----------------

#[utoipa::path(
    post,
    path = "/api/v1/announcements",
    request_body = NewAnnouncement,
    responses(
        (status = 201, description = "Announcement published", body = Announcement),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn create_announcement(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewAnnouncement>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Teacher);
    let author_name = display_name(&data, &auth.0.sub).await;
    let announcement = data
        .repo
        .create_announcement(payload.into_inner(), &auth.0.sub, &author_name)
        .await?;
    Ok(HttpResponse::Created().json(announcement))
}

#[utoipa::path(
    get,
    path = "/api/v1/announcements",
    responses(
        (status = 200, description = "All announcements, newest first", body = [Announcement])
    )
)]
pub async fn list_announcements(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let announcements = data.repo.list_announcements().await?;
    Ok(HttpResponse::Ok().json(announcements))
}

pub async fn stream_announcements(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let sub = data.repo.subscribe_announcements();
    let rx = data.sessions.watch(&auth.0.jti, &auth.0.sub);
    increment_counter!("classlink_streams_opened_total", "feed" => "announcements");
    Ok(sse_response(sub, session::until_signed_out(rx)))
}

// ---------------- events ----------------

#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = NewEvent,
    responses(
        (status = 201, description = "Event created", body = Event),
        (status = 403, description = "Teachers only")
    )
)]
pub async fn create_event(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewEvent>,
) -> Result<HttpResponse, ApiError> {
    require_role!(auth, Role::Teacher);
    let creator_name = display_name(&data, &auth.0.sub).await;
    let event = data.repo.create_event(payload.into_inner(), &auth.0.sub, &creator_name).await?;
    Ok(HttpResponse::Created().json(event))
}

#[utoipa::path(
    get,
    path = "/api/v1/events",
    responses(
        (status = 200, description = "All events in calendar order", body = [Event])
    )
)]
pub async fn list_events(_auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let events = data.repo.list_events().await?;
    Ok(HttpResponse::Ok().json(events))
}

pub async fn stream_events(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let sub = data.repo.subscribe_events();
    let rx = data.sessions.watch(&auth.0.jti, &auth.0.sub);
    increment_counter!("classlink_streams_opened_total", "feed" => "events");
    Ok(sse_response(sub, session::until_signed_out(rx)))
}

// ---------------- files ----------------

const FILE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

async fn read_text_field(mut field: actix_multipart::Field) -> Result<String, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("multipart field error: {e}");
        ApiError::Internal
    })? {
        if buf.len() + chunk.len() > 64 * 1024 {
            return Err(ApiError::BadRequest("text field too large".into()));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf).map_err(|_| ApiError::BadRequest("text field must be UTF-8".into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/files",
    responses(
        (status = 201, description = "Blob stored and record created", body = FileRecord),
        (status = 400, description = "Missing file part"),
        (status = 413, description = "Payload too large"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn upload_file(
    auth: Auth,
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    if !data.limiter.allow_upload(&auth.0.sub) {
        return Err(ApiError::TooManyRequests);
    }
    let mut file_bytes: Vec<u8> = Vec::new();
    let mut file_name: Option<String> = None;
    let mut title = String::new();
    let mut description = String::new();
    let mut shared_with: Vec<String> = Vec::new();
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        let name = field.content_disposition().get_name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.content_disposition().get_filename().map(|s| s.to_string());
                let mut field_stream = field;
                while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
                    log::error!("stream read error: {e}");
                    ApiError::Internal
                })? {
                    if file_bytes.len() + chunk.len() > FILE_SIZE_LIMIT {
                        return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
                    }
                    file_bytes.extend_from_slice(&chunk);
                }
            }
            "title" => title = read_text_field(field).await?,
            "description" => description = read_text_field(field).await?,
            "shared_with" => {
                let raw = read_text_field(field).await?;
                shared_with = serde_json::from_str(&raw).map_err(|_| {
                    ApiError::BadRequest("shared_with must be a JSON array of user ids".into())
                })?;
            }
            _ => {
                // Unknown parts must still be drained before the next poll.
                let _ = read_text_field(field).await;
            }
        }
    }
    let Some(file_name) = file_name else {
        return Ok(HttpResponse::BadRequest().finish());
    };
    if file_bytes.is_empty() {
        return Ok(HttpResponse::BadRequest().finish());
    }
    // The uploader always sees their own record.
    if !shared_with.iter().any(|u| u == &auth.0.sub) {
        shared_with.push(auth.0.sub.clone());
    }
    let path = storage::object_path(&auth.0.sub, &file_name);
    data.file_store.put(&path, &file_bytes).await?;
    let file_type = infer::get(&file_bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let uploaded_by_name = display_name(&data, &auth.0.sub).await;
    let record = data
        .repo
        .create_file_record(NewFileRecord {
            title: if title.is_empty() { file_name.clone() } else { title },
            description,
            file_name,
            file_size: file_bytes.len() as i64,
            file_type,
            download_url: storage::download_url(&path),
            file_path: path,
            uploaded_by: auth.0.sub.clone(),
            uploaded_by_name,
            shared_with,
        })
        .await?;
    increment_counter!("classlink_file_uploads_total");
    Ok(HttpResponse::Created().json(record))
}

#[utoipa::path(
    get,
    path = "/api/v1/files",
    responses(
        (status = 200, description = "Records shared with the caller", body = [FileRecord])
    )
)]
pub async fn list_files(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let files = data.repo.files_shared_with(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(files))
}

/// Serve a stored blob by its issued download path.
pub async fn get_file(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = format!("files/{}", path.into_inner());
    match data.file_store.get(&key).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok().insert_header(("Content-Type", mime)).body(bytes)),
        Err(FileStoreError::NotFound) => Err(ApiError::NotFound),
        Err(e) => {
            log::error!("file store get error: {e}");
            Err(ApiError::Internal)
        }
    }
}

// ---------------- notifications ----------------

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    responses(
        (status = 200, description = "Caller's notifications, newest first", body = [Notification])
    )
)]
pub async fn list_notifications(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let notifications = data.repo.notifications_for(&auth.0.sub).await?;
    Ok(HttpResponse::Ok().json(notifications))
}

pub async fn mark_notification_read(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let notification = data.repo.mark_notification_read(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(notification))
}
