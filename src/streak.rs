// src/streak.rs
//! 连续打卡 (streak) 状态机
//!
//! 状态不是显式枚举，而是 `(current_streak, longest_streak, last_date)` 相对"今天"
//! 推导出来的。两条入口：
//!
//! - [`record_completion`]：某天第一次完成任务时推进连续天数
//! - [`reconcile`]：读取时惰性校正，断档满一整天才清零
//!
//! 两者的阈值都是相差 2 天，但结果不同：完成任务总能让"今天"至少算 1 天，
//! 而单纯查询不能凭空制造连续天数。

use chrono::NaiveDate;

use crate::models::{StreakSummary, User};

/// `today - last` 的整天数，时钟回拨时为负
fn days_since(last: NaiveDate, today: NaiveDate) -> i64 {
    today.signed_duration_since(last).num_days()
}

/// 记录一次"首次完成"，调用方保证每个完成动作最多调用一次
pub fn record_completion(user: &mut User, today: NaiveDate) -> StreakSummary {
    user.current_streak = match user.last_date {
        None => 1,
        Some(last) => match days_since(last, today) {
            // 今天已经算过了，同一天的第二个任务不重复加
            0 => user.current_streak,
            1 => user.current_streak.saturating_add(1),
            // 断档或时钟回拨：重新开始
            _ => 1,
        },
    };
    user.longest_streak = user.longest_streak.max(user.current_streak);
    user.last_date = Some(today);

    StreakSummary::from(&*user)
}

/// 读取前的惰性校正，返回是否修改了记录 (需要落盘)
pub fn reconcile(user: &mut User, today: NaiveDate) -> bool {
    let Some(last) = user.last_date else {
        return false;
    };

    // 相差 1 天是宽限日：今天还有机会打卡
    if days_since(last, today) >= 2 && user.current_streak != 0 {
        user.current_streak = 0;
        return true;
    }
    false
}
