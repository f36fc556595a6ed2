// src/tips.rs
use rand_core::{OsRng, RngCore};

pub const TIPS: &[&str] = &[
    "Break big tasks into smaller chunks.",
    "Try the 25/5 Pomodoro cycle.",
    "Mute notifications during focus time.",
    "Start with the smallest next step.",
    "Review your plan each morning.",
    "Reward yourself after finishing.",
];

pub const QUOTES: &[&str] = &[
    "Discipline is the bridge between goals and accomplishment.",
    "Start where you are. Use what you have. Do what you can.",
    "Success is the sum of small efforts, repeated day in and day out.",
    "It always seems impossible until it's done.",
];

/// 随机挑一条；列表为空时返回空串
pub fn pick(items: &[&'static str]) -> &'static str {
    if items.is_empty() {
        return "";
    }
    let index = OsRng.next_u32() as usize % items.len();
    items[index]
}

pub fn random_tip() -> &'static str {
    pick(TIPS)
}

pub fn random_quote() -> &'static str {
    pick(QUOTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_come_from_the_list() {
        for _ in 0..50 {
            assert!(TIPS.contains(&random_tip()));
            assert!(QUOTES.contains(&random_quote()));
        }
    }

    #[test]
    fn empty_list_yields_empty_string() {
        assert_eq!(pick(&[]), "");
    }
}
