use serde::{Deserialize, Serialize};

/// Length of one generation call, in seconds.
pub const CHUNK_SECONDS: u32 = 300;

/// How a total duration is cut into chapters. Every chapter but the last is
/// exactly [`CHUNK_SECONDS`]; the last holds the remainder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub total_seconds: u32,
    pub chapters: Vec<u32>,
}

impl ChapterPlan {
    pub fn for_seconds(total_seconds: u32) -> Self {
        if total_seconds <= CHUNK_SECONDS {
            return Self {
                total_seconds,
                chapters: vec![total_seconds],
            };
        }

        let count = total_seconds.div_ceil(CHUNK_SECONDS);
        let mut chapters = vec![CHUNK_SECONDS; count as usize];
        if let Some(last) = chapters.last_mut() {
            *last = total_seconds - (count - 1) * CHUNK_SECONDS;
        }

        Self {
            total_seconds,
            chapters,
        }
    }

    pub fn chapter_count(&self) -> u32 {
        self.chapters.len() as u32
    }

    pub fn is_relay(&self) -> bool {
        self.chapters.len() > 1
    }

    /// Seconds covered by the 1-based chapter `index`.
    pub fn slice_seconds(&self, index: u32) -> Option<u32> {
        let idx = index.checked_sub(1)? as usize;
        self.chapters.get(idx).copied()
    }

    pub fn slice_minutes(&self, index: u32) -> Option<f64> {
        self.slice_seconds(index).map(|s| f64::from(s) / 60.0)
    }
}
