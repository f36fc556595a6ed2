// src/storage.rs
//! 平面 JSON 文件存储
//!
//! ```text
//! DATA_DIR/
//!   users.json      # { email: User }
//!   tasks.json      # { email: [Task] }
//!   feedback.json   # [Feedback]
//! ```
//!
//! 后端只负责整表读写 ([`Persistence`])；[`Tables`] 在其上做类型转换，
//! 并保证同一张表的读-改-写串行执行。

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::error::{StorageError, StorageResult};
use crate::models::{Feedback, TaskTable, UserTable};

/// 持久化中的一张"表"，对应一个 JSON 文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Tasks,
    Feedback,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Tasks, Collection::Feedback];

    pub fn file_name(self) -> &'static str {
        match self {
            Collection::Users => "users.json",
            Collection::Tasks => "tasks.json",
            Collection::Feedback => "feedback.json",
        }
    }

    /// 文件不存在时写入的初始内容
    pub fn empty(self) -> Value {
        match self {
            Collection::Users | Collection::Tasks => Value::Object(Default::default()),
            Collection::Feedback => Value::Array(Vec::new()),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Users => "users",
            Collection::Tasks => "tasks",
            Collection::Feedback => "feedback",
        };
        f.write_str(name)
    }
}

/// 整表读写的持久化后端
#[async_trait]
pub trait Persistence: Send + Sync {
    /// 读取整张表；表尚不存在时返回 `None`
    async fn load(&self, collection: Collection) -> StorageResult<Option<Value>>;

    /// 整表覆盖写；要么完全成功，要么保留旧内容
    async fn save(&self, collection: Collection, data: &Value) -> StorageResult<()>;
}

// --- 1. JSON 文件后端 ---

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, collection: Collection) -> PathBuf {
        self.dir.join(collection.file_name())
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn load(&self, collection: Collection) -> StorageResult<Option<Value>> {
        let io_err = |source| StorageError::Io { collection, source };

        let content = match tokio::fs::read_to_string(self.path(collection)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StorageError::Corrupt { collection, source })
    }

    async fn save(&self, collection: Collection, data: &Value) -> StorageResult<()> {
        let io_err = |source| StorageError::Io { collection, source };

        let body = serde_json::to_vec_pretty(data)
            .map_err(|source| StorageError::Corrupt { collection, source })?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        // 先写同目录临时文件再 rename，读者永远看不到写了一半的文件
        let path = self.path(collection);
        let temp_path = path.with_extension(format!("json.tmp.{}", std::process::id()));

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&body).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(io_err(e));
        }
        Ok(())
    }
}

// --- 2. 内存后端 (测试用) ---

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn load(&self, collection: Collection) -> StorageResult<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(&collection).cloned())
    }

    async fn save(&self, collection: Collection, data: &Value) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        tables.insert(collection, data.clone());
        Ok(())
    }
}

// --- 3. 带类型的表访问 ---

/// 在后端之上提供带类型的读写，每张表一把写锁
pub struct Tables {
    backend: Arc<dyn Persistence>,
    users_lock: Mutex<()>,
    tasks_lock: Mutex<()>,
    feedback_lock: Mutex<()>,
}

impl Tables {
    pub fn new(backend: Arc<dyn Persistence>) -> Self {
        Self {
            backend,
            users_lock: Mutex::new(()),
            tasks_lock: Mutex::new(()),
            feedback_lock: Mutex::new(()),
        }
    }

    /// 启动时补齐缺失的表文件；已存在但无法解析的文件直接报错，不会被覆盖
    pub async fn bootstrap(&self) -> StorageResult<()> {
        for collection in Collection::ALL {
            if self.backend.load(collection).await?.is_none() {
                tracing::info!("创建空表: {}", collection.file_name());
                self.backend.save(collection, &collection.empty()).await?;
            }
        }
        // 再按类型解析一遍，尽早发现格式错误
        self.users().await?;
        self.tasks().await?;
        self.feedback().await?;
        Ok(())
    }

    fn lock_for(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Users => &self.users_lock,
            Collection::Tasks => &self.tasks_lock,
            Collection::Feedback => &self.feedback_lock,
        }
    }

    async fn load_raw(&self, collection: Collection) -> StorageResult<Value> {
        Ok(self
            .backend
            .load(collection)
            .await?
            .unwrap_or_else(|| collection.empty()))
    }

    async fn read<T: DeserializeOwned>(&self, collection: Collection) -> StorageResult<T> {
        let raw = self.load_raw(collection).await?;
        serde_json::from_value(raw).map_err(|source| StorageError::Corrupt { collection, source })
    }

    /// 在表锁内执行读-改-写；闭包返回错误时不落盘，内容没变时也不落盘
    pub async fn modify<T, R, E, F>(&self, collection: Collection, f: F) -> Result<R, E>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut T) -> Result<R, E>,
        E: From<StorageError>,
    {
        let _guard = self.lock_for(collection).lock().await;

        let before = self.load_raw(collection).await?;
        let mut table: T = serde_json::from_value(before.clone())
            .map_err(|source| StorageError::Corrupt { collection, source })?;

        let result = f(&mut table)?;

        let after = serde_json::to_value(&table)
            .map_err(|source| StorageError::Corrupt { collection, source })?;
        if after != before {
            self.backend.save(collection, &after).await?;
        }
        Ok(result)
    }

    pub async fn users(&self) -> StorageResult<UserTable> {
        self.read(Collection::Users).await
    }

    pub async fn tasks(&self) -> StorageResult<TaskTable> {
        self.read(Collection::Tasks).await
    }

    pub async fn feedback(&self) -> StorageResult<Vec<Feedback>> {
        self.read(Collection::Feedback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_store_missing_table_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load(Collection::Users).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trip_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));
        let data = json!({"a@example.com": [{"id": 1}]});

        store.save(Collection::Tasks, &data).await.unwrap();
        assert_eq!(store.load(Collection::Tasks).await.unwrap(), Some(data));

        let names: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["tasks.json".to_string()]);
    }

    #[tokio::test]
    async fn file_store_reports_corrupt_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("users.json"), "{ not json").unwrap();
        let store = JsonFileStore::new(dir.path());

        let err = store.load(Collection::Users).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Corrupt {
                collection: Collection::Users,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn bootstrap_creates_empty_tables() {
        let dir = TempDir::new().unwrap();
        let tables = Tables::new(Arc::new(JsonFileStore::new(dir.path())));
        tables.bootstrap().await.unwrap();

        for collection in Collection::ALL {
            let content = std::fs::read_to_string(dir.path().join(collection.file_name())).unwrap();
            let value: Value = serde_json::from_str(&content).unwrap();
            assert_eq!(value, collection.empty());
        }
    }

    #[tokio::test]
    async fn bootstrap_refuses_to_reset_corrupt_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let tables = Tables::new(Arc::new(JsonFileStore::new(dir.path())));
        assert!(tables.bootstrap().await.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1, 2");
    }

    #[tokio::test]
    async fn wrong_shape_is_corrupt_not_empty() {
        let backend = Arc::new(MemoryStore::new());
        backend.save(Collection::Users, &json!([])).await.unwrap();
        let tables = Tables::new(backend);

        let err = tables.users().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn modify_persists_changes() {
        let backend = Arc::new(MemoryStore::new());
        let tables = Tables::new(backend.clone());

        tables
            .modify(Collection::Users, |users: &mut UserTable| {
                users.insert(
                    "ada@example.com".into(),
                    User::new("Ada".into(), "ada@example.com".into(), "h".into()),
                );
                Ok::<_, StorageError>(())
            })
            .await
            .unwrap();

        let users = tables.users().await.unwrap();
        assert_eq!(users["ada@example.com"].name, "Ada");
        assert!(backend.load(Collection::Users).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn modify_skips_save_on_error_and_on_no_change() {
        let backend = Arc::new(MemoryStore::new());
        let tables = Tables::new(backend.clone());

        let result: Result<(), crate::AppError> = tables
            .modify(Collection::Feedback, |items: &mut Vec<Feedback>| {
                items.clear();
                Err(crate::AppError::Internal)
            })
            .await;
        assert!(result.is_err());
        assert!(backend.load(Collection::Feedback).await.unwrap().is_none());

        let len = tables
            .modify(Collection::Feedback, |items: &mut Vec<Feedback>| {
                Ok::<_, StorageError>(items.len())
            })
            .await
            .unwrap();
        assert_eq!(len, 0);
        assert!(backend.load(Collection::Feedback).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_modifies_do_not_lose_writes() {
        let tables = Arc::new(Tables::new(Arc::new(MemoryStore::new())));

        let mut handles = Vec::new();
        for i in 0..32 {
            let tables = tables.clone();
            handles.push(tokio::spawn(async move {
                let email = format!("user{i}@example.com");
                tables
                    .modify(Collection::Users, |users: &mut UserTable| {
                        users.insert(email.clone(), User::new(format!("u{i}"), email, "h".into()));
                        Ok::<_, StorageError>(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tables.users().await.unwrap().len(), 32);
    }
}
