// src/tracker.rs
//! 任务与连续打卡的业务层
//!
//! 写路径：完成任务 -> 标记 completed/completed_at -> 当天首次完成时推进 streak -> 落盘。
//! 读路径：查询 streak 前先按今天的日期惰性校正。
//!
//! 每张表的读-改-写由 [`Tables`] 串行化；同一用户跨表的复合操作
//! (完成任务、校正 streak) 另外持有该用户的锁。

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::auth::{hash_password, verify_password};
use crate::clock::Clock;
use crate::error::StorageResult;
use crate::models::{
    normalize_email, Feedback, StreakSummary, Task, TaskTable, User, UserTable, DEFAULT_CATEGORY,
};
use crate::stats::{daily_histogram, DailyCount, HISTOGRAM_DAYS};
use crate::storage::{Collection, Persistence, Tables};
use crate::streak;
use crate::AppError;

/// 新建任务的输入
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub category: Option<String>,
    pub time: Option<String>,
}

/// 任务 id：毫秒时间戳，同一毫秒内递增，保证进程内单调且不重复
#[derive(Debug, Default)]
pub struct TaskIds {
    last: AtomicI64,
}

impl TaskIds {
    pub fn starting_after(last: i64) -> Self {
        Self {
            last: AtomicI64::new(last),
        }
    }

    pub fn next(&self, now_millis: i64) -> i64 {
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_millis.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(current) => last = current,
            }
        }
    }
}

/// 按用户划分的异步锁
#[derive(Debug, Default)]
struct UserLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, email: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(email.to_owned()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct Tracker {
    tables: Tables,
    clock: Arc<dyn Clock>,
    ids: TaskIds,
    user_locks: UserLocks,
}

impl Tracker {
    /// 打开存储：补齐缺失的表，并从已有任务中恢复 id 序列
    pub async fn open(backend: Arc<dyn Persistence>, clock: Arc<dyn Clock>) -> StorageResult<Self> {
        let tables = Tables::new(backend);
        tables.bootstrap().await?;

        let last_id = tables
            .tasks()
            .await?
            .values()
            .flatten()
            .map(|t| t.id)
            .max()
            .unwrap_or(0);

        Ok(Self {
            tables,
            clock,
            ids: TaskIds::starting_after(last_id),
            user_locks: UserLocks::default(),
        })
    }

    // --- 1. 用户 ---

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<User, AppError> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(AppError::BadRequest("All fields are required".into()));
        }

        let password_hash = hash_password(password)?;
        let user = User::new(name.to_owned(), email.clone(), password_hash);

        let created = user.clone();
        self.tables
            .modify(Collection::Users, move |users: &mut UserTable| {
                if users.contains_key(&created.email) {
                    return Err(AppError::Conflict("Email already registered".into()));
                }
                users.insert(created.email.clone(), created);
                Ok(())
            })
            .await?;

        self.tables
            .modify(Collection::Tasks, |tasks: &mut TaskTable| {
                tasks.entry(email.clone()).or_default();
                Ok::<_, AppError>(())
            })
            .await?;

        tracing::info!("新用户注册: {}", email);
        Ok(user)
    }

    /// 校验邮箱与密码，失败时不区分"用户不存在"和"密码错误"
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        let user = self
            .find_user(&email)
            .await?
            .filter(|u| verify_password(password, &u.password_hash))
            .ok_or_else(|| {
                tracing::warn!("登录失败: {}", email);
                AppError::Auth("Invalid credentials".into())
            })?;
        Ok(user)
    }

    pub async fn find_user(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.tables.users().await?;
        Ok(users.get(email).cloned())
    }

    // --- 2. 任务 ---

    pub async fn list_tasks(&self, email: &str) -> Result<Vec<Task>, AppError> {
        let mut tasks = self.tables.tasks().await?;
        Ok(tasks.remove(email).unwrap_or_default())
    }

    pub async fn create_task(&self, email: &str, input: NewTask) -> Result<Task, AppError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::BadRequest("task required".into()));
        }

        let now = self.clock.now();
        let task = Task {
            id: self.ids.next(now.and_utc().timestamp_millis()),
            task: title.to_owned(),
            category: input
                .category
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            time: input.time.map(|t| t.trim().to_owned()).unwrap_or_default(),
            created_at: now,
            completed: false,
            completed_at: None,
        };

        let created = task.clone();
        self.tables
            .modify(Collection::Tasks, |tasks: &mut TaskTable| {
                tasks.entry(email.to_owned()).or_default().push(created);
                Ok::<_, AppError>(())
            })
            .await?;

        tracing::info!("创建任务 {} ({}): {}", task.id, email, task.task);
        Ok(task)
    }

    /// 删除任务；id 不存在时不报错，返回 false
    pub async fn delete_task(&self, email: &str, id: i64) -> Result<bool, AppError> {
        let removed = self
            .tables
            .modify(Collection::Tasks, |tasks: &mut TaskTable| {
                let Some(list) = tasks.get_mut(email) else {
                    return Ok::<_, AppError>(false);
                };
                let Some(pos) = list.iter().position(|t| t.id == id) else {
                    return Ok(false);
                };
                list.remove(pos);
                Ok(true)
            })
            .await?;

        if removed {
            tracing::info!("删除任务 {} ({})", id, email);
        } else {
            tracing::debug!("删除任务 {} ({}): 不存在，忽略", id, email);
        }
        Ok(removed)
    }

    /// 完成任务；已完成的任务原样返回，不再触发 streak
    ///
    /// 任务表先落盘；若随后写用户表失败，则在同一把用户锁内把任务改回未完成，
    /// 保证重试时仍会推进 streak。
    pub async fn complete_task(&self, email: &str, id: i64) -> Result<Task, AppError> {
        let _guard = self.user_locks.acquire(email).await;
        let now = self.clock.now();

        if self.find_user(email).await?.is_none() {
            return Err(AppError::NotFound("user not found".into()));
        }

        let (task, newly_completed) = self
            .tables
            .modify(Collection::Tasks, |tasks: &mut TaskTable| {
                let task = tasks
                    .get_mut(email)
                    .and_then(|list| list.iter_mut().find(|t| t.id == id))
                    .ok_or_else(|| AppError::NotFound("task not found".into()))?;
                let changed = task.mark_completed(now);
                Ok::<_, AppError>((task.clone(), changed))
            })
            .await?;

        if !newly_completed {
            return Ok(task);
        }

        let today = now.date();
        let advanced = self
            .tables
            .modify(Collection::Users, |users: &mut UserTable| {
                let user = users
                    .get_mut(email)
                    .ok_or_else(|| AppError::NotFound("user not found".into()))?;
                Ok::<_, AppError>(streak::record_completion(user, today))
            })
            .await;

        let summary = match advanced {
            Ok(summary) => summary,
            Err(err) => {
                tracing::error!("更新 streak 失败，回滚任务 {} ({}): {}", id, email, err);
                self.undo_completion(email, id, now).await;
                return Err(err);
            }
        };

        tracing::info!(
            "完成任务 {} ({}), 当前连续 {} 天, 最长 {} 天",
            id,
            email,
            summary.current_streak,
            summary.longest_streak
        );
        Ok(task)
    }

    /// 撤销本次请求写入的完成标记；只动 completed_at 仍等于 at 的任务
    async fn undo_completion(&self, email: &str, id: i64, at: chrono::NaiveDateTime) {
        let reverted = self
            .tables
            .modify(Collection::Tasks, |tasks: &mut TaskTable| {
                if let Some(task) = tasks
                    .get_mut(email)
                    .and_then(|list| list.iter_mut().find(|t| t.id == id))
                    .filter(|t| t.completed_at == Some(at))
                {
                    task.completed = false;
                    task.completed_at = None;
                }
                Ok::<_, AppError>(())
            })
            .await;

        if let Err(e) = reverted {
            tracing::error!("回滚任务 {} ({}) 失败: {}", id, email, e);
        }
    }

    // --- 3. 连续打卡与统计 ---

    /// 读取 streak，断档满一天时先清零并落盘
    pub async fn streak(&self, email: &str) -> Result<StreakSummary, AppError> {
        let _guard = self.user_locks.acquire(email).await;
        let today = self.clock.today();

        self.tables
            .modify(Collection::Users, |users: &mut UserTable| {
                let user = users
                    .get_mut(email)
                    .ok_or_else(|| AppError::NotFound("user not found".into()))?;
                if streak::reconcile(user, today) {
                    tracing::info!("连续打卡中断，已清零: {}", email);
                }
                Ok::<_, AppError>(StreakSummary::from(&*user))
            })
            .await
    }

    pub async fn daily_stats(&self, email: &str) -> Result<Vec<DailyCount>, AppError> {
        let tasks = self.list_tasks(email).await?;
        Ok(daily_histogram(&tasks, self.clock.today(), HISTOGRAM_DAYS))
    }

    // --- 4. 反馈 ---

    pub async fn post_feedback(&self, user: Option<String>, text: &str) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("feedback required".into()));
        }

        let entry = Feedback {
            user,
            feedback: Some(text.to_owned()),
            time: self.clock.now(),
        };
        self.tables
            .modify(Collection::Feedback, |items: &mut Vec<Feedback>| {
                items.push(entry);
                Ok::<_, AppError>(())
            })
            .await
    }
}
