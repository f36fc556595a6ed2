// src/clock.rs
use std::sync::Mutex;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};

/// 业务逻辑中唯一的时间来源；测试里换成 ManualClock
pub trait Clock: Send + Sync {
    /// 本地墙钟时间 (不带时区)
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 手动拨动的时钟，用于跨日边界的确定性测试
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// 某天的正午，避免测试里出现零点附近的歧义
    pub fn at_noon(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN) + Duration::hours(12))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
