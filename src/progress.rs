use crate::assembler::count_words;
use crate::prompt::{SCENES_PER_CHAPTER, WORDS_PER_MINUTE};
use crate::relay::RelaySession;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterState {
    Done,
    Active,
    Pending,
}

/// Read-only view of a session for a progress grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub completed_scenes: u32,
    pub total_scenes: u32,
    pub percent: u8,
    pub chapters: Vec<ChapterState>,
}

impl ProgressReport {
    pub fn from_counts(completed_scenes: u32, total_chapters: u32) -> Self {
        let total_scenes = total_chapters * SCENES_PER_CHAPTER;
        let percent = if total_scenes == 0 {
            0
        } else {
            let raw = (f64::from(completed_scenes) / f64::from(total_scenes) * 100.0).round();
            raw.clamp(0.0, 100.0) as u8
        };

        let done = completed_scenes / SCENES_PER_CHAPTER;
        let chapters = (0..total_chapters)
            .map(|idx| match idx.cmp(&done) {
                std::cmp::Ordering::Less => ChapterState::Done,
                std::cmp::Ordering::Equal => ChapterState::Active,
                std::cmp::Ordering::Greater => ChapterState::Pending,
            })
            .collect();

        Self {
            completed_scenes,
            total_scenes,
            percent,
            chapters,
        }
    }

    pub fn from_session(session: &RelaySession) -> Self {
        Self::from_counts(session.completed_scenes(), session.chapter_count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationGauge {
    Empty,
    Success,
    Warning,
    Error,
}

/// Read-aloud length of a script at the console's speaking rate.
pub fn estimated_minutes(script: &str) -> f64 {
    count_words(script) as f64 / WORDS_PER_MINUTE
}

pub fn duration_gauge(script: &str, target_minutes: f64) -> DurationGauge {
    if script.trim().is_empty() {
        return DurationGauge::Empty;
    }
    let current = estimated_minutes(script);
    if (current - target_minutes).abs() <= target_minutes * 0.2 {
        DurationGauge::Success
    } else if current < target_minutes * 0.5 || current > target_minutes * 1.5 {
        DurationGauge::Error
    } else {
        DurationGauge::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ChapterState::*;

    #[test]
    fn test_fresh_relay() {
        let p = ProgressReport::from_counts(0, 3);
        assert_eq!(p.total_scenes, 30);
        assert_eq!(p.percent, 0);
        assert_eq!(p.chapters, vec![Active, Pending, Pending]);
    }

    #[test]
    fn test_partial_and_full() {
        let p = ProgressReport::from_counts(15, 3);
        assert_eq!(p.percent, 50);
        assert_eq!(p.chapters, vec![Done, Active, Pending]);

        let p = ProgressReport::from_counts(30, 3);
        assert_eq!(p.percent, 100);
        assert_eq!(p.chapters, vec![Done, Done, Done]);
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(ProgressReport::from_counts(99, 2).percent, 100);
        assert_eq!(ProgressReport::from_counts(5, 0).percent, 0);
    }

    #[test]
    fn test_duration_gauge() {
        let words = |n: usize| vec!["word"; n].join(" ");
        assert_eq!(duration_gauge("  ", 1.0), DurationGauge::Empty);
        assert_eq!(duration_gauge(&words(160), 1.0), DurationGauge::Success);
        assert_eq!(duration_gauge(&words(112), 1.0), DurationGauge::Warning);
        assert_eq!(duration_gauge(&words(40), 1.0), DurationGauge::Error);
        assert_eq!(duration_gauge(&words(400), 1.0), DurationGauge::Error);
        assert!((estimated_minutes(&words(80)) - 0.5).abs() < 1e-9);
    }
}
