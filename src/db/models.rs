use chrono::NaiveDate;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Psychiatrist,
    Counselor,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Patient,
        Role::Psychiatrist,
        Role::Counselor,
        Role::Admin,
    ];

    pub fn is_provider(self) -> bool {
        matches!(self, Role::Psychiatrist | Role::Counselor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Psychiatrist => "psychiatrist",
            Role::Counselor => "counselor",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_login_at: Option<i64>,
}

#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct ProviderProfile {
    #[serde(skip_deserializing)]
    pub user_id: i64,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<i64>,
}

/// Provider as listed for booking
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderSummary {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub years_experience: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AppointmentType {
    Consultation,
    Therapy,
    FollowUp,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Appointment {
    pub appointment_id: i64,
    pub patient_id: i64,
    pub patient_name: String, // Joined from users table
    pub provider_id: i64,
    pub provider_name: String, // Joined from users table
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: i64,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Conversation {
    pub conversation_id: i64,
    pub patient_id: i64,
    pub psychiatrist_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Conversation as seen by one participant
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: i64,
    pub patient_id: i64,
    pub psychiatrist_id: i64,
    pub other_user_id: i64,
    pub other_user_name: String,
    pub other_user_role: Role,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub sender_name: String, // Joined from users table
    pub receiver_id: i64,
    pub content: String,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MoodEntry {
    pub entry_id: i64,
    pub patient_id: i64,
    pub entry_date: NaiveDate,
    pub mood_score: i64,
    pub anxiety_level: Option<i64>,
    pub energy_level: Option<i64>,
    pub sleep_hours: Option<f64>,
    pub activities: Json<Vec<String>>,
    pub notes: Option<String>,
    pub created_at: i64,
}

pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Post {
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_anonymous: bool,
    pub comment_count: i64,
    pub like_count: i64,
    pub liked_by_me: bool,
    #[sqlx(skip)]
    pub is_own: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Post {
    /// Hide the author of anonymous posts from everyone but the viewer who wrote it
    pub fn for_viewer(mut self, viewer_id: i64) -> Self {
        self.is_own = self.author_id == Some(viewer_id);
        if self.is_anonymous {
            self.author_id = None;
            self.author_name = ANONYMOUS_AUTHOR.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Comment {
    pub comment_id: i64,
    pub post_id: i64,
    pub author_id: Option<i64>,
    pub author_name: String,
    pub content: String,
    pub is_anonymous: bool,
    #[sqlx(skip)]
    pub is_own: bool,
    pub created_at: i64,
}

impl Comment {
    pub fn for_viewer(mut self, viewer_id: i64) -> Self {
        self.is_own = self.author_id == Some(viewer_id);
        if self.is_anonymous {
            self.author_id = None;
            self.author_name = ANONYMOUS_AUTHOR.to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ResourceType {
    Article,
    Video,
    Audio,
    Worksheet,
    Link,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Resource {
    pub resource_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub resource_type: ResourceType,
    pub url: Option<String>,
    pub file_name: Option<String>,
    #[serde(skip_serializing)]
    pub stored_name: Option<String>,
    pub content_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_by: Option<i64>,
    pub is_published: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum NoteType {
    Session,
    Assessment,
    Progress,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClinicalNote {
    pub note_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub provider_id: i64,
    pub appointment_id: Option<i64>,
    pub note_type: NoteType,
    pub content: String,
    pub diagnosis: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Completed,
    Discontinued,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TreatmentPlan {
    pub plan_id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub provider_id: i64,
    pub provider_name: String,
    pub title: String,
    pub diagnosis: Option<String>,
    pub goals: String,
    pub interventions: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub created_at: i64,
    pub updated_at: i64,
}
