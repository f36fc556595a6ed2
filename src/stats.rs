// src/stats.rs
use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::{DailyStats, Task};

/// 迷你图展示的天数 (含今天)
pub const HISTOGRAM_DAYS: u32 = 14;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub label: String,
    pub count: u32,
}

/// 以 today 结尾的 `days` 天窗口内，按完成日期统计任务数，从旧到新
pub fn daily_histogram(tasks: &[Task], today: NaiveDate, days: u32) -> Vec<DailyCount> {
    let mut by_day: HashMap<NaiveDate, u32> = HashMap::new();
    for task in tasks.iter().filter(|t| t.completed) {
        if let Some(at) = task.completed_at {
            *by_day.entry(at.date()).or_default() += 1;
        }
    }

    (0..days)
        .rev()
        .map(|back| {
            let date = today - Duration::days(i64::from(back));
            DailyCount {
                date,
                label: date.format("%d %b").to_string(),
                count: by_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

impl From<Vec<DailyCount>> for DailyStats {
    fn from(buckets: Vec<DailyCount>) -> Self {
        let mut stats = DailyStats {
            labels: Vec::with_capacity(buckets.len()),
            dates: Vec::with_capacity(buckets.len()),
            data: Vec::with_capacity(buckets.len()),
        };
        for bucket in buckets {
            stats.labels.push(bucket.label);
            stats.dates.push(bucket.date);
            stats.data.push(bucket.count);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, hour: u32) -> NaiveDateTime {
        date.and_hms_opt(hour, 0, 0).unwrap()
    }

    fn task(id: i64, completed_at: Option<NaiveDateTime>) -> Task {
        Task {
            id,
            task: format!("task {id}"),
            category: "General".into(),
            time: String::new(),
            created_at: at(day(2023, 12, 1), 8),
            completed: completed_at.is_some(),
            completed_at,
        }
    }

    #[test]
    fn empty_history_still_has_fourteen_zero_buckets() {
        let today = day(2024, 1, 20);
        let buckets = daily_histogram(&[], today, HISTOGRAM_DAYS);

        assert_eq!(buckets.len(), 14);
        assert!(buckets.iter().all(|b| b.count == 0));
        assert_eq!(buckets.first().unwrap().date, day(2024, 1, 7));
        assert_eq!(buckets.last().unwrap().date, today);
    }

    #[test]
    fn buckets_are_oldest_first_with_labels() {
        let today = day(2024, 1, 3);
        let buckets = daily_histogram(&[], today, HISTOGRAM_DAYS);

        assert_eq!(buckets[0].label, "21 Dec");
        assert_eq!(buckets[13].label, "03 Jan");
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].date.succ_opt().unwrap(), pair[1].date);
        }
    }

    #[test]
    fn counts_completions_inside_window_only() {
        let today = day(2024, 1, 20);
        let tasks = vec![
            task(1, Some(at(today, 9))),
            task(2, Some(at(today, 23))),
            task(3, Some(at(day(2024, 1, 7), 0))), // 窗口第一天
            task(4, Some(at(day(2024, 1, 6), 23))), // 窗口外
            task(5, None),
            task(6, Some(at(day(2024, 1, 15), 12))),
        ];

        let buckets = daily_histogram(&tasks, today, HISTOGRAM_DAYS);
        let total: u32 = buckets.iter().map(|b| b.count).sum();

        assert_eq!(total, 4);
        assert_eq!(buckets[13].count, 2);
        assert_eq!(buckets[0].count, 1);
        assert_eq!(buckets[8].count, 1);
    }

    #[test]
    fn completed_flag_without_timestamp_is_ignored() {
        let today = day(2024, 1, 20);
        let mut odd = task(1, None);
        odd.completed = true;

        let buckets = daily_histogram(&[odd], today, HISTOGRAM_DAYS);
        assert_eq!(buckets.iter().map(|b| b.count).sum::<u32>(), 0);
    }

    #[test]
    fn stats_response_keeps_order() {
        let today = day(2024, 1, 20);
        let tasks = vec![task(1, Some(at(today, 9)))];
        let stats = DailyStats::from(daily_histogram(&tasks, today, HISTOGRAM_DAYS));

        assert_eq!(stats.labels.len(), 14);
        assert_eq!(stats.dates.len(), 14);
        assert_eq!(stats.data.last(), Some(&1));
        assert_eq!(stats.labels.last().map(String::as_str), Some("20 Jan"));
    }
}
