// src/handlers.rs
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use crate::auth::AuthUser;
use crate::models::{
    AuthResponse,
    CreateTaskSchema,
    DailyStats,
    DeleteResponse,
    FeedbackSchema,
    LoginSchema,
    RegisterSchema,
    StreakSummary,
    Task,
    WhoAmI,
};
use crate::tips;
use crate::tracker::NewTask;
use crate::validation::ValidatedJson;
use crate::AppError;
use crate::AppState;

// --- 1. 用户注册 (POST /api/register) ---
pub async fn register_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterSchema>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state
        .tracker
        .register(&payload.name, &payload.email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Account created! Please log in."})),
    ))
}

// --- 2. 用户登录 (POST /api/login) ---
pub async fn login_handler(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginSchema>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = state.tracker.login(&payload.email, &payload.password).await?;
    let token = state.jwt.issue(&user.email, &user.name)?;

    Ok(Json(AuthResponse {
        token,
        email: user.email,
        name: user.name,
    }))
}

// --- 3. 当前用户 (GET /api/whoami) ---
pub async fn whoami_handler(user: AuthUser) -> Json<WhoAmI> {
    Json(WhoAmI {
        email: user.email,
        name: user.name,
    })
}

// --- 4. 任务列表 (GET /api/tasks) ---
pub async fn list_tasks_handler(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.tracker.list_tasks(&user.email).await?;
    Ok(Json(tasks))
}

// --- 5. 创建任务 (POST /api/tasks) ---
pub async fn create_task_handler(
    user: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<CreateTaskSchema>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let input = NewTask {
        title: body.task,
        category: body.category,
        time: body.time,
    };
    let task = state.tracker.create_task(&user.email, input).await?;

    Ok((StatusCode::CREATED, Json(task)))
}

// --- 6. 删除任务 (DELETE /api/tasks/:id) ---
// id 不存在时同样返回 success，removed 标明是否真的删除了
pub async fn delete_task_handler(
    Path(id): Path<i64>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed = state.tracker.delete_task(&user.email, id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        removed,
    }))
}

// --- 7. 完成任务 (POST /api/tasks/:id/complete) ---
pub async fn complete_task_handler(
    Path(id): Path<i64>,
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Task>, AppError> {
    let task = state.tracker.complete_task(&user.email, id).await?;
    Ok(Json(task))
}

// --- 8. 连续打卡 (GET /api/streak) ---
pub async fn streak_handler(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<StreakSummary>, AppError> {
    let summary = state.tracker.streak(&user.email).await?;
    Ok(Json(summary))
}

// --- 9. 近 14 天完成数 (GET /api/stats/daily) ---
pub async fn daily_stats_handler(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DailyStats>, AppError> {
    let buckets = state.tracker.daily_stats(&user.email).await?;
    Ok(Json(DailyStats::from(buckets)))
}

// --- 10. 小贴士与名言 ---
pub async fn recommendation_handler() -> Json<Value> {
    Json(json!({"tip": tips::random_tip()}))
}

pub async fn quote_handler() -> Json<Value> {
    Json(json!({"quote": tips::random_quote()}))
}

// --- 11. 反馈 (POST /api/feedback) ---
pub async fn feedback_handler(
    auth: Option<AuthUser>, // 可选认证：登录后记录作者
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<FeedbackSchema>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state
        .tracker
        .post_feedback(auth.map(|u| u.email), &body.feedback)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"message": "Thanks for your feedback!"})),
    ))
}
