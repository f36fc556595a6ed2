// src/models.rs
use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

// --- 1. User 模型 (users.json 中以 email 为键) ---
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct User {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    // 磁盘上用 "" 表示尚未打卡
    #[serde(default, with = "iso_date_or_empty")]
    pub last_date: Option<NaiveDate>,
}

impl User {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            name,
            email,
            password_hash,
            current_streak: 0,
            longest_streak: 0,
            last_date: None,
        }
    }
}

pub type UserTable = BTreeMap<String, User>;

/// 统一邮箱格式：去掉首尾空白并转小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// --- 2. Task 模型 (tasks.json 中每个用户一个有序列表) ---
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Task {
    pub id: i64,
    pub task: String,
    pub category: String,
    #[serde(default)]
    pub time: String,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<NaiveDateTime>,
}

impl Task {
    /// 只允许 false -> true 一次，返回本次是否真正发生了状态变化
    pub fn mark_completed(&mut self, at: NaiveDateTime) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(at);
        true
    }
}

pub type TaskTable = BTreeMap<String, Vec<Task>>;

pub const DEFAULT_CATEGORY: &str = "General";

// --- 3. Feedback 模型 (feedback.json 为追加写的数组) ---
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Feedback {
    pub user: Option<String>,
    /// 旧数据里可能是 null
    #[serde(default)]
    pub feedback: Option<String>,
    pub time: NaiveDateTime,
}

// --- 4. 请求体 ---

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterSchema {
    #[validate(length(min = 1, max = 50, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginSchema {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskSchema {
    // 空白标题在业务层统一拒绝
    #[serde(default)]
    #[validate(length(max = 200, message = "task title is too long"))]
    pub task: String,
    #[validate(length(max = 50, message = "category is too long"))]
    pub category: Option<String>,
    #[validate(length(max = 16, message = "time is too long"))]
    pub time: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackSchema {
    #[validate(length(min = 1, max = 2000, message = "feedback is required"))]
    pub feedback: String,
}

// --- 5. 响应体 ---

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
}

impl From<&User> for StreakSummary {
    fn from(user: &User) -> Self {
        Self {
            current_streak: user.current_streak,
            longest_streak: user.longest_streak,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DailyStats {
    pub labels: Vec<String>,
    pub dates: Vec<NaiveDate>,
    pub data: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub removed: bool,
}

mod iso_date_or_empty {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_str(&d.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, FORMAT)
                .map(Some)
                .map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn feedback_with_null_or_missing_text_loads() {
        let items: Vec<Feedback> = serde_json::from_value(json!([
            {"user": null, "feedback": null, "time": "2024-01-01T10:00:00"},
            {"user": "ada@example.com", "time": "2024-01-02T08:30:00.250000"},
            {"user": null, "feedback": "nice", "time": "2024-01-03T09:00:00"}
        ]))
        .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].feedback, None);
        assert_eq!(items[1].feedback, None);
        assert_eq!(items[1].user.as_deref(), Some("ada@example.com"));
        assert_eq!(items[2].feedback.as_deref(), Some("nice"));
    }

    #[test]
    fn user_with_empty_last_date_loads() {
        let user: User = serde_json::from_value(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password_hash": "x",
            "current_streak": 0,
            "longest_streak": 0,
            "last_date": ""
        }))
        .unwrap();
        assert_eq!(user.last_date, None);

        let stored = serde_json::to_value(&user).unwrap();
        assert_eq!(stored["last_date"], "");
    }

    #[test]
    fn user_last_date_is_iso() {
        let mut user = User::new("Ada".into(), "ada@example.com".into(), "x".into());
        user.last_date = NaiveDate::from_ymd_opt(2024, 1, 5);
        let stored = serde_json::to_value(&user).unwrap();
        assert_eq!(stored["last_date"], "2024-01-05");

        let back: User = serde_json::from_value(stored).unwrap();
        assert_eq!(back, user);
    }

    #[test]
    fn garbage_last_date_is_rejected() {
        let result = serde_json::from_value::<User>(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password_hash": "x",
            "last_date": "yesterday"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn python_isoformat_timestamps_load() {
        let task: Task = serde_json::from_value(json!({
            "id": 1704100000000i64,
            "task": "Read",
            "category": "General",
            "time": "07:30",
            "created_at": "2024-01-01T09:15:02.123456",
            "completed": true,
            "completed_at": "2024-01-01T10:00:00"
        }))
        .unwrap();
        assert!(task.completed);
        assert_eq!(
            task.completed_at.map(|t| t.date()),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn completion_is_one_way() {
        let created = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let mut task = Task {
            id: 1,
            task: "Stretch".into(),
            category: DEFAULT_CATEGORY.into(),
            time: String::new(),
            created_at: created,
            completed: false,
            completed_at: None,
        };

        let first = created + chrono::Duration::hours(1);
        assert!(task.mark_completed(first));
        assert!(!task.mark_completed(first + chrono::Duration::hours(1)));
        assert_eq!(task.completed_at, Some(first));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ada@Example.COM "), "ada@example.com");
    }
}
