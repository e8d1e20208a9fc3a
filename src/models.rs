use crate::auth::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Document ids are opaque strings (UUID v4 assigned by the store).
pub type Id = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub phone: String,
    pub school: String,
    pub grade: String,
    pub subjects: Vec<String>,
    /// Bumped on every successful update; senders may pass it back as
    /// `expected_version` to detect concurrent edits.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credential record. Never serialized into API responses. Carries the
/// role so token minting does not depend on a profile read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Account {
    pub id: Id,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub school: String,
    #[serde(default)]
    pub grade: String,
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// Profile fields of a registration, minus the credential. Built by the
/// register handler so the store layer never sees a plaintext password.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub phone: String,
    pub school: String,
    pub grade: String,
    pub subjects: Vec<String>,
}

impl From<&RegisterRequest> for NewProfile {
    fn from(r: &RegisterRequest) -> Self {
        NewProfile {
            email: r.email.clone(),
            name: r.name.clone(),
            role: r.role,
            phone: r.phone.clone(),
            school: r.school.clone(),
            grade: r.grade.clone(),
            subjects: r.subjects.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    /// None when the profile document could not be loaded; the session is
    /// still valid and clients fall back to claims-only identity.
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub school: Option<String>,
    pub grade: Option<String>,
    pub subjects: Option<Vec<String>>,
    /// Optimistic concurrency check; mismatch rejects the write.
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Student {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub grade: String,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: String,
    /// Weak reference to a parent profile; None until the parent links up.
    pub parent_id: Option<Id>,
    pub teacher_id: Id,
    pub teacher_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewStudent {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub grade: String,
    pub parent_name: String,
    pub parent_email: String,
    #[serde(default)]
    pub parent_phone: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Message {
    pub id: Id,
    pub sender_id: Id,
    pub receiver_id: Id,
    pub content: String,
    pub sender_name: String,
    pub receiver_name: String,
    pub subject: Option<String>,
    pub message_type: Option<String>,
    pub student_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewMessage {
    pub receiver_id: Id,
    pub receiver_name: String,
    pub content: String,
    pub subject: Option<String>,
    pub message_type: Option<String>,
    pub student_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct ProgressReport {
    pub id: Id,
    pub student_id: Id,
    pub student_name: String,
    pub teacher_id: Id,
    pub teacher_name: String,
    /// Copied from the student at creation time; None for unlinked students.
    pub parent_id: Option<Id>,
    pub subject: String,
    pub grade: String,
    pub score: Option<f64>,
    pub comments: String,
    pub behavior: String,
    pub attendance: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewProgressReport {
    pub student_id: Id,
    pub subject: String,
    pub grade: String,
    pub score: Option<f64>,
    #[serde(default)]
    pub comments: String,
    pub behavior: String,
    pub attendance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Announcement {
    pub id: Id,
    pub title: String,
    pub content: String,
    /// "low" | "medium" | "high"; free-form by convention, not enforced.
    pub priority: String,
    pub author_id: Id,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Event {
    pub id: Id,
    pub title: String,
    pub description: String,
    /// Scheduled occurrence time, distinct from created_at.
    pub date: DateTime<Utc>,
    pub location: String,
    pub event_type: String,
    pub created_by: Id,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct FileRecord {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub download_url: String,
    /// Store key, `files/<uploader>/<millis>_<sanitized-name>`.
    pub file_path: String,
    pub uploaded_by: Id,
    pub uploaded_by_name: String,
    /// User ids the record is visible to (uploader included).
    pub shared_with: Vec<Id>,
    pub uploaded_at: DateTime<Utc>,
}

/// Assembled by the upload handler once the blob is stored.
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub title: String,
    pub description: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub download_url: String,
    pub file_path: String,
    pub uploaded_by: Id,
    pub uploaded_by_name: String,
    pub shared_with: Vec<Id>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "postgres-store", derive(sqlx::FromRow))]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub message: String,
    pub notif_type: String,
    pub action_url: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}
