use std::fmt;

use chrono::NaiveDate;

/// How close a due date is, relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Urgency {
    Overdue,
    DueToday,
    DueSoon,
    Scheduled,
}

/// Whole days from `today` until `due`; negative when past due.
///
/// Both sides are calendar dates, so the ceiling of the day difference is
/// the exact difference.
pub fn days_until(due: NaiveDate, today: NaiveDate) -> i64 {
    (due - today).num_days()
}

impl Urgency {
    pub const ALL: [Urgency; 4] = [
        Self::Overdue,
        Self::DueToday,
        Self::DueSoon,
        Self::Scheduled,
    ];

    pub fn classify(due: NaiveDate, today: NaiveDate) -> Self {
        match days_until(due, today) {
            d if d < 0 => Self::Overdue,
            0 => Self::DueToday,
            1..=3 => Self::DueSoon,
            _ => Self::Scheduled,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Overdue => "Overdue",
            Self::DueToday => "Due Today",
            Self::DueSoon => "Due Soon",
            Self::Scheduled => "Scheduled",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
