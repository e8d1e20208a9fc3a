use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::*;
use crate::feed::{ChangeHub, Collection, Subscription};

/// Postgres backend. Ids and timestamps are assigned in the service, the
/// same way the in-memory backend does it, so both stores produce
/// identical documents. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgRepo {
    pool: Pool<Postgres>,
    hub: ChangeHub,
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool, hub: ChangeHub::new() }
    }

    fn new_id() -> Id {
        Uuid::new_v4().to_string()
    }

    // Query bodies shared between the one-shot trait methods and the
    // subscription closures, so a feed re-query can never drift from the
    // plain read path.

    async fn conversation_docs(&self, user_a: &str, user_b: &str) -> RepoResult<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT id, sender_id, receiver_id, content, sender_name, receiver_name, \
                    subject, message_type, student_name, timestamp, read \
             FROM messages \
             WHERE (sender_id = $1 OR sender_id = $2) \
               AND (receiver_id = $1 OR receiver_id = $2) \
             ORDER BY timestamp DESC, id DESC \
             LIMIT $3",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(CONVERSATION_LIMIT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn announcement_docs(&self) -> RepoResult<Vec<Announcement>> {
        sqlx::query_as::<_, Announcement>(
            "SELECT id, title, content, priority, author_id, author_name, created_at \
             FROM announcements ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn event_docs(&self) -> RepoResult<Vec<Event>> {
        sqlx::query_as::<_, Event>(
            "SELECT id, title, description, date, location, event_type, \
                    created_by, created_by_name, created_at \
             FROM events ORDER BY date ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

fn db_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
        other => RepoError::Internal(other.to_string()),
    }
}

const PROFILE_COLS: &str =
    "id, email, name, role, phone, school, grade, subjects, version, created_at, updated_at";
const MESSAGE_COLS: &str = "id, sender_id, receiver_id, content, sender_name, receiver_name, \
                            subject, message_type, student_name, timestamp, read";
const STUDENT_COLS: &str = "id, name, email, phone, grade, parent_name, parent_email, \
                            parent_phone, parent_id, teacher_id, teacher_name, created_at";

#[async_trait]
impl AccountRepo for PgRepo {
    async fn create_account(&self, new: NewProfile, password_hash: String) -> RepoResult<UserProfile> {
        let id = Self::new_id();
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("INSERT INTO accounts (id, email, role, password_hash) VALUES ($1, $2, $3, $4)")
            .bind(&id)
            .bind(&new.email)
            .bind(new.role)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "INSERT INTO profiles (id, email, name, role, phone, school, grade, subjects, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, $9, $9) RETURNING {PROFILE_COLS}"
        ))
        .bind(&id)
        .bind(&new.email)
        .bind(&new.name)
        .bind(new.role)
        .bind(&new.phone)
        .bind(&new.school)
        .bind(&new.grade)
        .bind(&new.subjects)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        self.hub.notify(Collection::Profiles);
        Ok(profile)
    }

    async fn find_account_by_email(&self, email: &str) -> RepoResult<Account> {
        sqlx::query_as::<_, Account>(
            "SELECT id, email, role, password_hash, reset_token_hash, reset_token_expires \
             FROM accounts WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn set_reset_token(&self, email: &str, token_hash: String, expires: DateTime<Utc>) -> RepoResult<()> {
        let affected = sqlx::query(
            "UPDATE accounts SET reset_token_hash = $2, reset_token_expires = $3 WHERE email = $1",
        )
        .bind(email)
        .bind(&token_hash)
        .bind(expires)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if affected == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn complete_password_reset(&self, token_hash: &str, new_password_hash: String) -> RepoResult<()> {
        let affected = sqlx::query(
            "UPDATE accounts \
             SET password_hash = $2, reset_token_hash = NULL, reset_token_expires = NULL \
             WHERE reset_token_hash = $1 AND reset_token_expires > $3",
        )
        .bind(token_hash)
        .bind(&new_password_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();
        if affected == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for PgRepo {
    async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile> {
        sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)
    }

    async fn update_profile(&self, user_id: &str, upd: UpdateProfile) -> RepoResult<UserProfile> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let current = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLS} FROM profiles WHERE id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        if let Some(expected) = upd.expected_version {
            if current.version != expected {
                // Dropping the open transaction rolls it back.
                return Err(RepoError::Conflict);
            }
        }
        let updated = sqlx::query_as::<_, UserProfile>(&format!(
            "UPDATE profiles SET name = COALESCE($2, name), phone = COALESCE($3, phone), \
                    school = COALESCE($4, school), grade = COALESCE($5, grade), \
                    subjects = COALESCE($6, subjects), version = version + 1, updated_at = $7 \
             WHERE id = $1 RETURNING {PROFILE_COLS}"
        ))
        .bind(user_id)
        .bind(upd.name)
        .bind(upd.phone)
        .bind(upd.school)
        .bind(upd.grade)
        .bind(upd.subjects)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        self.hub.notify(Collection::Profiles);
        Ok(updated)
    }
}

#[async_trait]
impl StudentRepo for PgRepo {
    async fn create_student(&self, new: NewStudent, teacher_id: &str, teacher_name: &str) -> RepoResult<Student> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "INSERT INTO students (id, name, email, phone, grade, parent_name, parent_email, \
                                   parent_phone, parent_id, teacher_id, teacher_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING {STUDENT_COLS}"
        ))
        .bind(Self::new_id())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.grade)
        .bind(&new.parent_name)
        .bind(&new.parent_email)
        .bind(&new.parent_phone)
        .bind(&new.parent_id)
        .bind(teacher_id)
        .bind(teacher_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        self.hub.notify(Collection::Students);
        Ok(student)
    }

    async fn get_student(&self, id: &str) -> RepoResult<Student> {
        sqlx::query_as::<_, Student>(&format!("SELECT {STUDENT_COLS} FROM students WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
    }

    async fn students_by_teacher(&self, teacher_id: &str) -> RepoResult<Vec<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLS} FROM students WHERE teacher_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn students_by_parent(&self, parent_id: &str) -> RepoResult<Vec<Student>> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLS} FROM students WHERE parent_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl MessageRepo for PgRepo {
    async fn send_message(&self, new: NewMessage, sender_id: &str, sender_name: &str) -> RepoResult<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "INSERT INTO messages (id, sender_id, receiver_id, content, sender_name, receiver_name, \
                                   subject, message_type, student_name, timestamp, read) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE) RETURNING {MESSAGE_COLS}"
        ))
        .bind(Self::new_id())
        .bind(sender_id)
        .bind(&new.receiver_id)
        .bind(&new.content)
        .bind(sender_name)
        .bind(&new.receiver_name)
        .bind(&new.subject)
        .bind(&new.message_type)
        .bind(&new.student_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        self.hub.notify(Collection::Messages);
        Ok(message)
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> RepoResult<Vec<Message>> {
        self.conversation_docs(user_a, user_b).await
    }

    async fn mark_message_read(&self, id: &str) -> RepoResult<Message> {
        let message = sqlx::query_as::<_, Message>(&format!(
            "UPDATE messages SET read = TRUE WHERE id = $1 RETURNING {MESSAGE_COLS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        self.hub.notify(Collection::Messages);
        Ok(message)
    }

    fn subscribe_conversation(&self, user_a: &str, user_b: &str) -> Subscription<Message> {
        let repo = self.clone();
        let (a, b) = (user_a.to_string(), user_b.to_string());
        Subscription::new(
            self.hub.changed(Collection::Messages),
            Box::new(move || {
                let repo = repo.clone();
                let (a, b) = (a.clone(), b.clone());
                Box::pin(async move { repo.conversation_docs(&a, &b).await })
            }),
        )
    }
}

#[async_trait]
impl ProgressRepo for PgRepo {
    async fn create_progress_report(
        &self,
        new: NewProgressReport,
        student: &Student,
        teacher_id: &str,
        teacher_name: &str,
    ) -> RepoResult<ProgressReport> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let report = sqlx::query_as::<_, ProgressReport>(
            "INSERT INTO progress_reports (id, student_id, student_name, teacher_id, teacher_name, \
                                           parent_id, subject, grade, score, comments, behavior, \
                                           attendance, date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING id, student_id, student_name, teacher_id, teacher_name, parent_id, \
                       subject, grade, score, comments, behavior, attendance, date",
        )
        .bind(Self::new_id())
        .bind(&student.id)
        .bind(&student.name)
        .bind(teacher_id)
        .bind(teacher_name)
        .bind(&student.parent_id)
        .bind(&new.subject)
        .bind(&new.grade)
        .bind(new.score)
        .bind(&new.comments)
        .bind(&new.behavior)
        .bind(&new.attendance)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        // Report and parent notification commit together or not at all.
        let notified = if let Some(parent_id) = &student.parent_id {
            sqlx::query(
                "INSERT INTO notifications (id, user_id, title, message, notif_type, action_url, read, timestamp) \
                 VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)",
            )
            .bind(Self::new_id())
            .bind(parent_id)
            .bind("New Progress Report")
            .bind(format!("A new progress report has been added for {}", student.name))
            .bind("progress")
            .bind("/progress")
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
            true
        } else {
            false
        };
        tx.commit().await.map_err(db_err)?;
        self.hub.notify(Collection::Progress);
        if notified {
            self.hub.notify(Collection::Notifications);
        }
        Ok(report)
    }

    async fn reports_by_student(&self, student_id: &str) -> RepoResult<Vec<ProgressReport>> {
        sqlx::query_as::<_, ProgressReport>(
            "SELECT id, student_id, student_name, teacher_id, teacher_name, parent_id, \
                    subject, grade, score, comments, behavior, attendance, date \
             FROM progress_reports WHERE student_id = $1 ORDER BY date DESC, id DESC",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl AnnouncementRepo for PgRepo {
    async fn create_announcement(&self, new: NewAnnouncement, author_id: &str, author_name: &str) -> RepoResult<Announcement> {
        let announcement = sqlx::query_as::<_, Announcement>(
            "INSERT INTO announcements (id, title, content, priority, author_id, author_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, title, content, priority, author_id, author_name, created_at",
        )
        .bind(Self::new_id())
        .bind(&new.title)
        .bind(&new.content)
        .bind(&new.priority)
        .bind(author_id)
        .bind(author_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        self.hub.notify(Collection::Announcements);
        Ok(announcement)
    }

    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>> {
        self.announcement_docs().await
    }

    fn subscribe_announcements(&self) -> Subscription<Announcement> {
        let repo = self.clone();
        Subscription::new(
            self.hub.changed(Collection::Announcements),
            Box::new(move || {
                let repo = repo.clone();
                Box::pin(async move { repo.announcement_docs().await })
            }),
        )
    }
}

#[async_trait]
impl EventRepo for PgRepo {
    async fn create_event(&self, new: NewEvent, creator_id: &str, creator_name: &str) -> RepoResult<Event> {
        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, title, description, date, location, event_type, \
                                 created_by, created_by_name, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, title, description, date, location, event_type, \
                       created_by, created_by_name, created_at",
        )
        .bind(Self::new_id())
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.date)
        .bind(&new.location)
        .bind(&new.event_type)
        .bind(creator_id)
        .bind(creator_name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        self.hub.notify(Collection::Events);
        Ok(event)
    }

    async fn list_events(&self) -> RepoResult<Vec<Event>> {
        self.event_docs().await
    }

    fn subscribe_events(&self) -> Subscription<Event> {
        let repo = self.clone();
        Subscription::new(
            self.hub.changed(Collection::Events),
            Box::new(move || {
                let repo = repo.clone();
                Box::pin(async move { repo.event_docs().await })
            }),
        )
    }
}

#[async_trait]
impl FileRepo for PgRepo {
    async fn create_file_record(&self, new: NewFileRecord) -> RepoResult<FileRecord> {
        let record = sqlx::query_as::<_, FileRecord>(
            "INSERT INTO files (id, title, description, file_name, file_size, file_type, \
                                download_url, file_path, uploaded_by, uploaded_by_name, \
                                shared_with, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING id, title, description, file_name, file_size, file_type, download_url, \
                       file_path, uploaded_by, uploaded_by_name, shared_with, uploaded_at",
        )
        .bind(Self::new_id())
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.file_name)
        .bind(new.file_size)
        .bind(&new.file_type)
        .bind(&new.download_url)
        .bind(&new.file_path)
        .bind(&new.uploaded_by)
        .bind(&new.uploaded_by_name)
        .bind(&new.shared_with)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        self.hub.notify(Collection::Files);
        Ok(record)
    }

    async fn files_shared_with(&self, user_id: &str) -> RepoResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT id, title, description, file_name, file_size, file_type, download_url, \
                    file_path, uploaded_by, uploaded_by_name, shared_with, uploaded_at \
             FROM files WHERE $1 = ANY(shared_with) ORDER BY uploaded_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }
}

#[async_trait]
impl NotificationRepo for PgRepo {
    async fn notifications_for(&self, user_id: &str) -> RepoResult<Vec<Notification>> {
        sqlx::query_as::<_, Notification>(
            "SELECT id, user_id, title, message, notif_type, action_url, read, timestamp \
             FROM notifications WHERE user_id = $1 ORDER BY timestamp DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn mark_notification_read(&self, id: &str) -> RepoResult<Notification> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET read = TRUE WHERE id = $1 \
             RETURNING id, user_id, title, message, notif_type, action_url, read, timestamp",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or(RepoError::NotFound)?;
        self.hub.notify(Collection::Notifications);
        Ok(notification)
    }
}
