//! crates/lumina_core/src/query.rs
//!
//! Read-only views over the workspace: search, dashboard lists, and the
//! calendar month grid.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::domain::{EntityId, Note, StudyEvent, Subject};

/// Returns subjects whose name, or the name of any of their folders, contains
/// `query` ignoring case. A blank query matches everything.
pub fn filter_subjects<'a>(subjects: &'a [Subject], query: &str) -> Vec<&'a Subject> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return subjects.iter().collect();
    }
    subjects
        .iter()
        .filter(|subject| {
            subject.name.to_lowercase().contains(&needle)
                || subject
                    .folders
                    .iter()
                    .any(|folder| folder.name.to_lowercase().contains(&needle))
        })
        .collect()
}

/// The `limit` most recently created notes across every subject and folder.
pub fn recent_notes(subjects: &[Subject], limit: usize) -> Vec<&Note> {
    let mut notes: Vec<&Note> = subjects
        .iter()
        .flat_map(|s| s.folders.iter())
        .flat_map(|f| f.notes.iter())
        .collect();
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    notes.truncate(limit);
    notes
}

/// The first `limit` events in date order.
pub fn upcoming_events(events: &[StudyEvent], limit: usize) -> Vec<&StudyEvent> {
    let mut sorted: Vec<&StudyEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.date);
    sorted.truncate(limit);
    sorted
}

pub fn events_on(events: &[StudyEvent], date: NaiveDate) -> Vec<&StudyEvent> {
    events.iter().filter(|e| e.date == date).collect()
}

/// Looks a note up anywhere in the tree.
pub fn find_note(subjects: &[Subject], id: EntityId) -> Option<&Note> {
    subjects
        .iter()
        .flat_map(|s| s.folders.iter())
        .flat_map(|f| f.notes.iter())
        .find(|n| n.id == id)
}

/// Layout facts for rendering one month of the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    /// Weekday of the 1st, counted from Sunday = 0.
    pub first_weekday: u32,
}

impl CalendarMonth {
    /// Returns `None` when `month` is outside 1..=12 or the year is out of range.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)?;
        let days_in_month = u32::try_from((next_first - first).num_days()).ok()?;
        Some(Self {
            year,
            month,
            days_in_month,
            first_weekday: first.weekday().num_days_from_sunday(),
        })
    }

    pub fn prev(&self) -> Option<Self> {
        if self.month == 1 {
            Self::new(self.year - 1, 12)
        } else {
            Self::new(self.year, self.month - 1)
        }
    }

    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (1..=self.days_in_month).filter_map(move |day| NaiveDate::from_ymd_opt(self.year, self.month, day))
    }
}
