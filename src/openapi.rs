use crate::models::{
    Announcement, AuthResponse, Event, FileRecord, LoginRequest, Message, NewAnnouncement,
    NewEvent, NewMessage, NewProgressReport, NewStudent, Notification, PasswordResetConfirm,
    PasswordResetRequest, ProgressReport, RegisterRequest, Student, UpdateProfile, UserProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::register,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::auth_me,
        crate::routes::update_profile,
        crate::routes::send_message,
        crate::routes::get_conversation,
        crate::routes::mark_message_read,
        crate::routes::create_student,
        crate::routes::list_students,
        crate::routes::my_students,
        crate::routes::create_progress_report,
        crate::routes::list_progress_reports,
        crate::routes::create_announcement,
        crate::routes::list_announcements,
        crate::routes::create_event,
        crate::routes::list_events,
        crate::routes::upload_file,
        crate::routes::list_files,
        crate::routes::list_notifications,
    ),
    components(schemas(
        UserProfile, UpdateProfile, RegisterRequest, LoginRequest, AuthResponse,
        PasswordResetRequest, PasswordResetConfirm,
        Student, NewStudent, Message, NewMessage,
        ProgressReport, NewProgressReport,
        Announcement, NewAnnouncement, Event, NewEvent,
        FileRecord, Notification,
        crate::routes::MeResponse, crate::auth::Role
    )),
    tags(
        (name = "auth", description = "Accounts, sessions and profiles"),
        (name = "messaging", description = "Parent-teacher conversations"),
        (name = "roster", description = "Students and progress reports"),
        (name = "school", description = "Announcements, events and files"),
    )
)]
pub struct ApiDoc;
