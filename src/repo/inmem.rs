use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::*;
use crate::feed::{ChangeHub, Collection, Subscription};

const SNAPSHOT_PATH: &str = "data/state.json";

#[derive(Default, Serialize, Deserialize)]
struct State {
    accounts: HashMap<Id, Account>,
    profiles: HashMap<Id, UserProfile>,
    students: HashMap<Id, Student>,
    messages: HashMap<Id, Message>,
    reports: HashMap<Id, ProgressReport>,
    announcements: HashMap<Id, Announcement>,
    events: HashMap<Id, Event>,
    files: HashMap<Id, FileRecord>,
    notifications: HashMap<Id, Notification>,
}

/// Process-local store with a JSON snapshot on disk. Every committed write
/// rewrites the snapshot and ticks the owning collection's feed.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Arc<PathBuf>,
    hub: ChangeHub,
}

impl InMemRepo {
    fn data_dir() -> PathBuf {
        std::env::var("CLASSLINK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"))
    }

    fn snapshot_path() -> PathBuf {
        if std::env::var("CLASSLINK_DATA_DIR").is_ok() {
            let mut p = Self::data_dir();
            p.push("state.json");
            p
        } else {
            PathBuf::from(SNAPSHOT_PATH)
        }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    eprintln!("[inmem] Loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    eprintln!("[inmem] Failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            },
            Err(e) => {
                eprintln!("[inmem] No snapshot at '{}': {e}. Starting empty.", path.display());
                State::default()
            }
        }
    }

    fn persist(&self) {
        let path = self.snapshot_path.clone();
        if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
            if let Some(dir) = path.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            if let Err(e) = std::fs::write(&*path, s) {
                eprintln!("[inmem] Failed to write snapshot '{}': {e}", path.display());
            }
        }
    }

    pub fn new() -> Self {
        let snapshot_path = Self::snapshot_path();
        let state = Self::load_state_from(&snapshot_path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Arc::new(snapshot_path),
            hub: ChangeHub::new(),
        }
    }

    fn new_id() -> Id {
        Uuid::new_v4().to_string()
    }

    // Query bodies shared between the one-shot trait methods and the
    // subscription closures, so a feed re-query can never drift from the
    // plain read path.

    fn conversation_docs(&self, user_a: &str, user_b: &str) -> Vec<Message> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .messages
            .values()
            .filter(|m| {
                (m.sender_id == user_a || m.sender_id == user_b)
                    && (m.receiver_id == user_a || m.receiver_id == user_b)
            })
            .cloned()
            .collect();
        v.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        v.truncate(CONVERSATION_LIMIT);
        v
    }

    fn announcement_docs(&self) -> Vec<Announcement> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s.announcements.values().cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        v
    }

    fn event_docs(&self) -> Vec<Event> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s.events.values().cloned().collect();
        v.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        v
    }
}

impl Default for InMemRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountRepo for InMemRepo {
    async fn create_account(&self, new: NewProfile, password_hash: String) -> RepoResult<UserProfile> {
        let mut s = self.state.write().unwrap();
        if s.accounts.values().any(|a| a.email == new.email) {
            return Err(RepoError::Conflict);
        }
        let id = Self::new_id();
        let now = Utc::now();
        let account = Account {
            id: id.clone(),
            email: new.email.clone(),
            role: new.role,
            password_hash,
            reset_token_hash: None,
            reset_token_expires: None,
        };
        let profile = UserProfile {
            id: id.clone(),
            email: new.email,
            name: new.name,
            role: new.role,
            phone: new.phone,
            school: new.school,
            grade: new.grade,
            subjects: new.subjects,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        s.accounts.insert(id.clone(), account);
        s.profiles.insert(id, profile.clone());
        drop(s); // release lock before persisting
        self.persist();
        self.hub.notify(Collection::Profiles);
        Ok(profile)
    }

    async fn find_account_by_email(&self, email: &str) -> RepoResult<Account> {
        let s = self.state.read().unwrap();
        s.accounts
            .values()
            .find(|a| a.email == email)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn set_reset_token(&self, email: &str, token_hash: String, expires: DateTime<Utc>) -> RepoResult<()> {
        let mut s = self.state.write().unwrap();
        let account = s
            .accounts
            .values_mut()
            .find(|a| a.email == email)
            .ok_or(RepoError::NotFound)?;
        account.reset_token_hash = Some(token_hash);
        account.reset_token_expires = Some(expires);
        drop(s);
        self.persist();
        Ok(())
    }

    async fn complete_password_reset(&self, token_hash: &str, new_password_hash: String) -> RepoResult<()> {
        let mut s = self.state.write().unwrap();
        let now = Utc::now();
        let account = s
            .accounts
            .values_mut()
            .find(|a| {
                a.reset_token_hash.as_deref() == Some(token_hash)
                    && a.reset_token_expires.map(|t| t > now).unwrap_or(false)
            })
            .ok_or(RepoError::NotFound)?;
        account.password_hash = new_password_hash;
        account.reset_token_hash = None;
        account.reset_token_expires = None;
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl ProfileRepo for InMemRepo {
    async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile> {
        let s = self.state.read().unwrap();
        s.profiles.get(user_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update_profile(&self, user_id: &str, upd: UpdateProfile) -> RepoResult<UserProfile> {
        let mut s = self.state.write().unwrap();
        let profile = s.profiles.get_mut(user_id).ok_or(RepoError::NotFound)?;
        if let Some(expected) = upd.expected_version {
            if profile.version != expected {
                return Err(RepoError::Conflict);
            }
        }
        if let Some(name) = upd.name { profile.name = name; }
        if let Some(phone) = upd.phone { profile.phone = phone; }
        if let Some(school) = upd.school { profile.school = school; }
        if let Some(grade) = upd.grade { profile.grade = grade; }
        if let Some(subjects) = upd.subjects { profile.subjects = subjects; }
        profile.version += 1;
        profile.updated_at = Utc::now();
        let updated = profile.clone();
        drop(s);
        self.persist();
        self.hub.notify(Collection::Profiles);
        Ok(updated)
    }
}

#[async_trait]
impl StudentRepo for InMemRepo {
    async fn create_student(&self, new: NewStudent, teacher_id: &str, teacher_name: &str) -> RepoResult<Student> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let student = Student {
            id: id.clone(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            grade: new.grade,
            parent_name: new.parent_name,
            parent_email: new.parent_email,
            parent_phone: new.parent_phone,
            parent_id: new.parent_id,
            teacher_id: teacher_id.to_string(),
            teacher_name: teacher_name.to_string(),
            created_at: Utc::now(),
        };
        s.students.insert(id, student.clone());
        drop(s);
        self.persist();
        self.hub.notify(Collection::Students);
        Ok(student)
    }

    async fn get_student(&self, id: &str) -> RepoResult<Student> {
        let s = self.state.read().unwrap();
        s.students.get(id).cloned().ok_or(RepoError::NotFound)
    }

    async fn students_by_teacher(&self, teacher_id: &str) -> RepoResult<Vec<Student>> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .students
            .values()
            .filter(|st| st.teacher_id == teacher_id)
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn students_by_parent(&self, parent_id: &str) -> RepoResult<Vec<Student>> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .students
            .values()
            .filter(|st| st.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect();
        v.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(v)
    }
}

#[async_trait]
impl MessageRepo for InMemRepo {
    async fn send_message(&self, new: NewMessage, sender_id: &str, sender_name: &str) -> RepoResult<Message> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let message = Message {
            id: id.clone(),
            sender_id: sender_id.to_string(),
            receiver_id: new.receiver_id,
            content: new.content,
            sender_name: sender_name.to_string(),
            receiver_name: new.receiver_name,
            subject: new.subject,
            message_type: new.message_type,
            student_name: new.student_name,
            timestamp: Utc::now(),
            read: false,
        };
        s.messages.insert(id, message.clone());
        drop(s);
        self.persist();
        self.hub.notify(Collection::Messages);
        Ok(message)
    }

    async fn conversation(&self, user_a: &str, user_b: &str) -> RepoResult<Vec<Message>> {
        Ok(self.conversation_docs(user_a, user_b))
    }

    async fn mark_message_read(&self, id: &str) -> RepoResult<Message> {
        let mut s = self.state.write().unwrap();
        let message = s.messages.get_mut(id).ok_or(RepoError::NotFound)?;
        message.read = true;
        let updated = message.clone();
        drop(s);
        self.persist();
        self.hub.notify(Collection::Messages);
        Ok(updated)
    }

    fn subscribe_conversation(&self, user_a: &str, user_b: &str) -> Subscription<Message> {
        let repo = self.clone();
        let (a, b) = (user_a.to_string(), user_b.to_string());
        Subscription::new(
            self.hub.changed(Collection::Messages),
            Box::new(move || {
                let repo = repo.clone();
                let (a, b) = (a.clone(), b.clone());
                Box::pin(async move { Ok(repo.conversation_docs(&a, &b)) })
            }),
        )
    }
}

#[async_trait]
impl ProgressRepo for InMemRepo {
    async fn create_progress_report(
        &self,
        new: NewProgressReport,
        student: &Student,
        teacher_id: &str,
        teacher_name: &str,
    ) -> RepoResult<ProgressReport> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let now = Utc::now();
        let report = ProgressReport {
            id: id.clone(),
            student_id: student.id.clone(),
            student_name: student.name.clone(),
            teacher_id: teacher_id.to_string(),
            teacher_name: teacher_name.to_string(),
            parent_id: student.parent_id.clone(),
            subject: new.subject,
            grade: new.grade,
            score: new.score,
            comments: new.comments,
            behavior: new.behavior,
            attendance: new.attendance,
            date: now,
        };
        s.reports.insert(id, report.clone());
        // Unlinked students get no notification; the report itself still lands.
        let notified = if let Some(parent_id) = &student.parent_id {
            let notif = Notification {
                id: Self::new_id(),
                user_id: parent_id.clone(),
                title: "New Progress Report".to_string(),
                message: format!("A new progress report has been added for {}", student.name),
                notif_type: "progress".to_string(),
                action_url: "/progress".to_string(),
                read: false,
                timestamp: now,
            };
            s.notifications.insert(notif.id.clone(), notif);
            true
        } else {
            false
        };
        drop(s);
        self.persist();
        self.hub.notify(Collection::Progress);
        if notified {
            self.hub.notify(Collection::Notifications);
        }
        Ok(report)
    }

    async fn reports_by_student(&self, student_id: &str) -> RepoResult<Vec<ProgressReport>> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .reports
            .values()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        v.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(v)
    }
}

#[async_trait]
impl AnnouncementRepo for InMemRepo {
    async fn create_announcement(&self, new: NewAnnouncement, author_id: &str, author_name: &str) -> RepoResult<Announcement> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let announcement = Announcement {
            id: id.clone(),
            title: new.title,
            content: new.content,
            priority: new.priority,
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            created_at: Utc::now(),
        };
        s.announcements.insert(id, announcement.clone());
        drop(s);
        self.persist();
        self.hub.notify(Collection::Announcements);
        Ok(announcement)
    }

    async fn list_announcements(&self) -> RepoResult<Vec<Announcement>> {
        Ok(self.announcement_docs())
    }

    fn subscribe_announcements(&self) -> Subscription<Announcement> {
        let repo = self.clone();
        Subscription::new(
            self.hub.changed(Collection::Announcements),
            Box::new(move || {
                let repo = repo.clone();
                Box::pin(async move { Ok(repo.announcement_docs()) })
            }),
        )
    }
}

#[async_trait]
impl EventRepo for InMemRepo {
    async fn create_event(&self, new: NewEvent, creator_id: &str, creator_name: &str) -> RepoResult<Event> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let event = Event {
            id: id.clone(),
            title: new.title,
            description: new.description,
            date: new.date,
            location: new.location,
            event_type: new.event_type,
            created_by: creator_id.to_string(),
            created_by_name: creator_name.to_string(),
            created_at: Utc::now(),
        };
        s.events.insert(id, event.clone());
        drop(s);
        self.persist();
        self.hub.notify(Collection::Events);
        Ok(event)
    }

    async fn list_events(&self) -> RepoResult<Vec<Event>> {
        Ok(self.event_docs())
    }

    fn subscribe_events(&self) -> Subscription<Event> {
        let repo = self.clone();
        Subscription::new(
            self.hub.changed(Collection::Events),
            Box::new(move || {
                let repo = repo.clone();
                Box::pin(async move { Ok(repo.event_docs()) })
            }),
        )
    }
}

#[async_trait]
impl FileRepo for InMemRepo {
    async fn create_file_record(&self, new: NewFileRecord) -> RepoResult<FileRecord> {
        let mut s = self.state.write().unwrap();
        let id = Self::new_id();
        let record = FileRecord {
            id: id.clone(),
            title: new.title,
            description: new.description,
            file_name: new.file_name,
            file_size: new.file_size,
            file_type: new.file_type,
            download_url: new.download_url,
            file_path: new.file_path,
            uploaded_by: new.uploaded_by,
            uploaded_by_name: new.uploaded_by_name,
            shared_with: new.shared_with,
            uploaded_at: Utc::now(),
        };
        s.files.insert(id, record.clone());
        drop(s);
        self.persist();
        self.hub.notify(Collection::Files);
        Ok(record)
    }

    async fn files_shared_with(&self, user_id: &str) -> RepoResult<Vec<FileRecord>> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .files
            .values()
            .filter(|f| f.shared_with.iter().any(|u| u == user_id))
            .cloned()
            .collect();
        v.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at).then(b.id.cmp(&a.id)));
        Ok(v)
    }
}

#[async_trait]
impl NotificationRepo for InMemRepo {
    async fn notifications_for(&self, user_id: &str) -> RepoResult<Vec<Notification>> {
        let s = self.state.read().unwrap();
        let mut v: Vec<_> = s
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        v.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(v)
    }

    async fn mark_notification_read(&self, id: &str) -> RepoResult<Notification> {
        let mut s = self.state.write().unwrap();
        let notif = s.notifications.get_mut(id).ok_or(RepoError::NotFound)?;
        notif.read = true;
        let updated = notif.clone();
        drop(s);
        self.persist();
        self.hub.notify(Collection::Notifications);
        Ok(updated)
    }
}
