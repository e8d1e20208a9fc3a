use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feed::Subscription;
use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

/// Conversations return at most this many documents, newest first.
pub const CONVERSATION_LIMIT: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("store error: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait AccountRepo: Send + Sync {
    /// Creates credential plus profile in one step; email must be unused.
    async fn create_account(&self, new: NewProfile, password_hash: String) -> RepoResult<UserProfile>;
    async fn find_account_by_email(&self, email: &str) -> RepoResult<Account>;
    async fn set_reset_token(&self, email: &str, token_hash: String, expires: DateTime<Utc>) -> RepoResult<()>;
    /// Consumes an unexpired reset token and replaces the password hash.
    async fn complete_password_reset(&self, token_hash: &str, new_password_hash: String) -> RepoResult<()>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile>;
    /// Merge-update. When `expected_version` is set and stale, fails with
    /// Conflict and writes nothing.
    async fn update_profile(&self, user_id: &str, upd: UpdateProfile) -> RepoResult<UserProfile>;
}

#[async_trait]
pub trait StudentRepo: Send + Sync {
    async fn create_student(&self, new: NewStudent, teacher_id: &str, teacher_name: &str) -> RepoResult<Student>;
    async fn get_student(&self, id: &str) -> RepoResult<Student>;
    async fn students_by_teacher(&self, teacher_id: &str) -> RepoResult<Vec<Student>>;
    async fn students_by_parent(&self, parent_id: &str) -> RepoResult<Vec<Student>>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn send_message(&self, new: NewMessage, sender_id: &str, sender_name: &str) -> RepoResult<Message>;
    /// Both directions between the two users, newest first, capped at
    /// [`CONVERSATION_LIMIT`].
    async fn conversation(&self, user_a: &str, user_b: &str) -> RepoResult<Vec<Message>>;
    async fn mark_message_read(&self, id: &str) -> RepoResult<Message>;
    fn subscribe_conversation(&self, user_a: &str, user_b: &str) -> Subscription<Message>;
}

#[async_trait]
pub trait ProgressRepo: Send + Sync {
    /// Writes the report and, when the student has a linked parent, the
    /// parent's notification in the same commit.
    async fn create_progress_report(
        &self,
        new: NewProgressReport,
        student: &Student,
        teacher_id: &str,
        teacher_name: &str,
    ) -> RepoResult<ProgressReport>;
    async fn reports_by_student(&self, student_id: &str) -> RepoResult<Vec<ProgressReport>>;
}

#[async_trait]
pub trait AnnouncementRepo: Send + Sync {
    async fn create_announcement(&self, new: NewAnnouncement, author_id: &str, author_name: &str) -> RepoResult<Announcement>;
    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>>;
    fn subscribe_announcements(&self) -> Subscription<Announcement>;
}

#[async_trait]
pub trait EventRepo: Send + Sync {
    async fn create_event(&self, new: NewEvent, creator_id: &str, creator_name: &str) -> RepoResult<Event>;
    async fn list_events(&self) -> RepoResult<Vec<Event>>;
    fn subscribe_events(&self) -> Subscription<Event>;
}

#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn create_file_record(&self, new: NewFileRecord) -> RepoResult<FileRecord>;
    async fn files_shared_with(&self, user_id: &str) -> RepoResult<Vec<FileRecord>>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn notifications_for(&self, user_id: &str) -> RepoResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: &str) -> RepoResult<Notification>;
}

pub trait Repo:
    AccountRepo
    + ProfileRepo
    + StudentRepo
    + MessageRepo
    + ProgressRepo
    + AnnouncementRepo
    + EventRepo
    + FileRepo
    + NotificationRepo
{
}

impl<T> Repo for T where
    T: AccountRepo
        + ProfileRepo
        + StudentRepo
        + MessageRepo
        + ProgressRepo
        + AnnouncementRepo
        + EventRepo
        + FileRepo
        + NotificationRepo
{
}
