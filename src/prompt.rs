//! Request assembly for one chapter of a relay run.
//!
//! [`GenerationSpec`] is fixed for the whole session. [`PromptBuilder`] merges it
//! with the per-chapter fields (slice length, carried context, chapter index) into
//! a [`ChapterRequest`], the JSON body sent to the generation service.

use crate::chapter_plan::ChapterPlan;
use crate::duration::parse_duration_seconds;
use crate::persona::{DEFAULT_TONE, TonePersona};
use serde::{Deserialize, Serialize};

/// Scenes requested per chapter in a relay run.
pub const SCENES_PER_CHAPTER: u32 = 10;
pub const WORDS_PER_MINUTE: f64 = 160.0;
const SUMMARY_CHARS: usize = 500;

pub const DEFAULT_INSTRUCTION: &str =
    "Keep the persona's tone and manner and write in natural spoken language.";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a narration script writer. Write only the spoken lines, in conversational language.";
const RELAY_SYSTEM_SUFFIX: &str = "Keep the same voice across every relay section.";
const TONE_CONSTRAINT: &str = "Never use sentence endings or expressions that do not fit the tone.";
const NUMERIC_PROTECTION: &str = "Do not change any numerical data in the script.";

pub const REGENERATE_INSTRUCTION: &str = "Rewrite the original script on the same subject, \
modelled on the structure of channels with over a million views.
- Traits of those channels: a strong hook, a clear structure, viewer participation, repetition of the key message, natural transitions
- Keep the core content and subject of the original, but improve how it is expressed and structured
- Use storytelling techniques that raise viewer immersion
- Make every scene flow naturally into the next";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    #[serde(alias = "shorts")]
    Short,
    #[serde(alias = "longform")]
    Long,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub hook: String,
    #[serde(default)]
    pub storyline: String,
}

/// External material the script is built from (a fetched article, or the
/// script being regenerated).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    pub raw: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl SourceContext {
    pub fn regenerate(original_script: &str) -> Self {
        let head: String = original_script.chars().take(SUMMARY_CHARS).collect();
        Self {
            raw: original_script.to_string(),
            summary: format!("{}...", head),
            mode: Some("regenerate".to_string()),
        }
    }
}

/// Session-wide settings; never changes once a run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSpec {
    pub format: TargetFormat,
    pub duration: String,
    pub tone: String,
    pub persona: TonePersona,
    pub required_keywords: Vec<String>,
    pub blueprint: Blueprint,
    pub source_context: Option<SourceContext>,
    pub instruction: String,
    pub system_instruction: String,
    /// Placed ahead of the instruction text; set for regeneration runs.
    pub instruction_prefix: Option<String>,
}

impl GenerationSpec {
    pub fn new(format: TargetFormat, duration: impl Into<String>, tone: impl Into<String>) -> Self {
        let tone = tone.into();
        let tone = if tone.trim().is_empty() {
            DEFAULT_TONE.to_string()
        } else {
            tone
        };
        Self {
            format,
            duration: duration.into(),
            persona: TonePersona::for_tone(&tone),
            tone,
            required_keywords: Vec::new(),
            blueprint: Blueprint::default(),
            source_context: None,
            instruction: DEFAULT_INSTRUCTION.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            instruction_prefix: None,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.required_keywords = keywords;
        self
    }

    pub fn with_blueprint(mut self, blueprint: Blueprint) -> Self {
        self.blueprint = blueprint;
        self
    }

    pub fn with_source_context(mut self, ctx: SourceContext) -> Self {
        self.source_context = Some(ctx);
        self
    }

    /// Same machinery as a fresh run, seeded with the existing script as the
    /// source and the restructuring instruction in front.
    pub fn regenerate_from(mut self, original_script: &str) -> Self {
        self.source_context = Some(SourceContext::regenerate(original_script));
        self.instruction_prefix = Some(REGENERATE_INSTRUCTION.to_string());
        self
    }

    pub fn total_seconds(&self) -> u32 {
        parse_duration_seconds(&self.duration)
    }

    pub fn target_minutes(&self) -> f64 {
        f64::from(self.total_seconds()) / 60.0
    }
}

/// Splits comma separated keyword input, dropping blanks.
pub fn parse_keywords(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Storyline text as scene lines, with `1)` / `1.` numbering removed.
pub fn parse_storyline(storyline: &str) -> Vec<String> {
    let lines: Vec<String> = storyline
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(strip_numbering)
        .collect();
    if lines.is_empty() {
        return vec!["Intro".into(), "Main points".into(), "Wrap-up".into()];
    }
    lines
}

fn strip_numbering(line: &str) -> String {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(')').or_else(|| rest.strip_prefix('.')) {
            return stripped.trim().to_string();
        }
    }
    line.to_string()
}

/// The service's own scene estimate for a single-call script.
pub fn estimate_scene_count(format: TargetFormat, minutes: f64) -> u32 {
    match format {
        TargetFormat::Short => {
            if minutes <= 1.0 {
                ((minutes * 5.5).round() as u32).clamp(5, 6)
            } else {
                (minutes * 2.0).round() as u32
            }
        }
        TargetFormat::Long => {
            let mut count = ((minutes * 2.0).round() as u32).max(20);
            if minutes >= 60.0 {
                count = count.max(120);
            } else if minutes >= 40.0 {
                count = count.max(80);
            }
            count
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericalProtection {
    pub enabled: bool,
    pub instruction: String,
}

/// Fields shared by every chapter of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptBody {
    pub title: String,
    pub target: String,
    pub hook: String,
    pub storyline: String,
    pub scenes: Vec<String>,
    pub scene_count: u32,
    pub format: TargetFormat,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_scene_min_words: Option<u32>,
    pub tone: String,
    pub required_keywords: Vec<String>,
    pub tone_persona: TonePersona,
    pub source_context: Option<SourceContext>,
    pub constraints: Vec<String>,
    pub duration_instructions: String,
    pub numerical_protection: NumericalProtection,
    pub system_instruction: String,
}

/// One request to the generation service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRequest {
    #[serde(flatten)]
    pub body: PromptBody,
    pub target_minutes: f64,
    pub target_word_count: u32,
    pub required_scene_count: u32,
    #[serde(rename = "previous_context")]
    pub previous_context: String,
    pub is_last: bool,
    pub current_chapter: u32,
    pub total_chapters: u32,
    pub instruction: String,
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

fn minutes_label(minutes: f64) -> String {
    let secs = (minutes * 60.0).round() as u32;
    match (secs / 60, secs % 60) {
        (0, s) => format!("{} seconds", s),
        (m, 0) => format!("{} minutes", m),
        (m, s) => format!("{} minutes {} seconds", m, s),
    }
}

fn join_instruction<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct PromptBuilder<'a> {
    spec: &'a GenerationSpec,
    plan: &'a ChapterPlan,
    body: PromptBody,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(spec: &'a GenerationSpec, plan: &'a ChapterPlan) -> Self {
        let body = Self::session_body(spec, plan);
        Self { spec, plan, body }
    }

    fn session_body(spec: &GenerationSpec, plan: &ChapterPlan) -> PromptBody {
        let minutes = f64::from(plan.total_seconds) / 60.0;
        let scene_count = estimate_scene_count(spec.format, minutes);

        let scenes = if minutes >= 60.0 {
            vec![String::new(); 120]
        } else {
            let mut lines = parse_storyline(&spec.blueprint.storyline);
            if lines.len() < scene_count as usize {
                lines.resize(scene_count as usize, String::new());
            }
            lines
        };

        let mut system_instruction = spec.system_instruction.clone();
        if plan.is_relay() {
            system_instruction = join_instruction([system_instruction.as_str(), RELAY_SYSTEM_SUFFIX]);
        }

        PromptBody {
            title: or_placeholder(&spec.blueprint.title, "(untitled)"),
            target: or_placeholder(&spec.blueprint.target, "(audience tbd)"),
            hook: or_placeholder(&spec.blueprint.hook, "(hook tbd)"),
            storyline: spec.blueprint.storyline.clone(),
            scenes,
            scene_count,
            format: spec.format,
            duration: spec.duration.clone(),
            per_scene_min_words: (minutes >= 60.0).then_some(200),
            tone: spec.tone.clone(),
            required_keywords: spec.required_keywords.clone(),
            tone_persona: spec.persona.clone(),
            source_context: spec.source_context.clone(),
            constraints: vec![TONE_CONSTRAINT.to_string()],
            duration_instructions: format!(
                "The target video length is {}. Write at least {} words per minute.",
                minutes_label(minutes),
                WORDS_PER_MINUTE as u32
            ),
            numerical_protection: NumericalProtection {
                enabled: true,
                instruction: NUMERIC_PROTECTION.to_string(),
            },
            system_instruction,
        }
    }

    fn single_time_instruction(&self) -> String {
        let total = self.plan.total_seconds;
        if total >= 60 {
            format!(
                "Write a script that reads aloud in about {} minutes. A full read-aloud script, \
                 not a summary, with concrete examples, step-by-step explanations and lines the viewer can repeat.",
                (f64::from(total) / 60.0).round() as u32
            )
        } else {
            format!(
                "Write a short, punchy script that reads aloud in about {} seconds. A full read-aloud script, \
                 not a summary, with concrete examples, step-by-step explanations and lines the viewer can repeat.",
                total
            )
        }
    }

    fn relay_instruction(&self, chapter_index: u32, slice_minutes: f64) -> String {
        format!(
            "You are writing section {} of {} of a {}-minute script. This section must hold exactly {} of content. \
             Keep the tone of the earlier sections and pick up the story where the previous section ended; \
             do not restart the topic and do not summarise what came before. \
             Write a full read-aloud script, not a summary, with concrete examples, step-by-step explanations \
             and lines the viewer can repeat.",
            chapter_index,
            self.plan.chapter_count(),
            (f64::from(self.plan.total_seconds) / 60.0).round() as u32,
            minutes_label(slice_minutes)
        )
    }

    /// Request for the 1-based `chapter_index`, or `None` when the plan has no
    /// such chapter. `previous_context` is ignored for single-chapter plans.
    pub fn build(&self, chapter_index: u32, previous_context: &str) -> Option<ChapterRequest> {
        let slice_minutes = self.plan.slice_minutes(chapter_index)?;
        let total_chapters = self.plan.chapter_count();
        let prefix = self.spec.instruction_prefix.as_deref().unwrap_or("");

        let (required_scene_count, previous_context, instruction) = if self.plan.is_relay() {
            let persona_line = format!(
                "Apply the \"{}\" voice rules above everything else.",
                self.spec.persona.name
            );
            let time = self.relay_instruction(chapter_index, slice_minutes);
            (
                SCENES_PER_CHAPTER,
                previous_context.to_string(),
                join_instruction([prefix, self.spec.instruction.as_str(), persona_line.as_str(), time.as_str()]),
            )
        } else {
            let time = self.single_time_instruction();
            (
                self.body.scene_count,
                String::new(),
                join_instruction([prefix, self.spec.instruction.as_str(), time.as_str()]),
            )
        };

        Some(ChapterRequest {
            body: self.body.clone(),
            target_minutes: slice_minutes,
            target_word_count: (slice_minutes * WORDS_PER_MINUTE).round() as u32,
            required_scene_count,
            previous_context,
            is_last: chapter_index == total_chapters,
            current_chapter: chapter_index,
            total_chapters,
            instruction,
        })
    }
}
