//! Joins chapter outputs into one script and scrubs generation artifacts.
//!
//! Cleanup is an ordered table of named `pattern -> replacement` rules. The
//! table is applied repeatedly until the text stops changing, so a rule that
//! exposes a new match for an earlier rule still converges and `clean` stays
//! idempotent. Every rule deletes text or shortens a run of newlines, so each
//! pass that changes the text makes it shorter and the loop ends.

use anyhow::{Context, Result};
use regex::Regex;

pub const CHAPTER_SEPARATOR: &str = "\n\n";

/// Uncompiled rule: a name for tests and logs, a regex, a replacement.
pub struct RuleDef {
    pub name: &'static str,
    pub pattern: &'static str,
    pub replacement: &'static str,
}

pub const CLEANUP_RULES: &[RuleDef] = &[
    RuleDef {
        name: "code_fences",
        pattern: r"(?m)^[ \t]*```[A-Za-z0-9_-]*[ \t]*$",
        replacement: "",
    },
    RuleDef {
        name: "scene_tags",
        pattern: r"(?i)\[[ \t]*(?:scene|chapter|씬|챕터)[ \t]*\d+[^\]\n]*\][ \t]*",
        replacement: "",
    },
    RuleDef {
        name: "start_end_markers",
        pattern: r"(?i)\[[ \t]*(?:start|end|시작|끝)[ \t]*\][ \t]*",
        replacement: "",
    },
    RuleDef {
        name: "role_leakage",
        pattern: r"(?im)^[ \t]*(?:role|instructions?|insight|역할|지시사항|인사이트)[ \t]*:.*$",
        replacement: "",
    },
    RuleDef {
        name: "acknowledgements",
        pattern: r"(?im)^[ \t]*(?:understood|sure|certainly|okay|got it|알겠습니다)[ \t]*[.!]?[ \t]*$",
        replacement: "",
    },
    RuleDef {
        name: "finished_script_phrases",
        pattern: r"(?im)^[ \t]*(?:here(?:'s| is) (?:the |your )?(?:finished |completed |final )?script\b|작성된 대본입니다|이 부분에서는).*$",
        replacement: "",
    },
    RuleDef {
        name: "markdown_emphasis",
        pattern: r"\*+",
        replacement: "",
    },
    RuleDef {
        name: "markdown_headings",
        pattern: r"(?m)^[ \t]*#{1,6}[ \t]+",
        replacement: "",
    },
    RuleDef {
        name: "trailing_spaces",
        pattern: r"(?m)[ \t]+$",
        replacement: "",
    },
    RuleDef {
        name: "blank_runs",
        pattern: r"\n{3,}",
        replacement: "\n\n",
    },
];

pub struct CleanupRule {
    pub name: &'static str,
    regex: Regex,
    replacement: &'static str,
}

impl CleanupRule {
    pub fn compile(def: &RuleDef) -> Result<Self> {
        let regex = Regex::new(def.pattern)
            .with_context(|| format!("failed to compile cleanup rule {}", def.name))?;
        Ok(Self {
            name: def.name,
            regex,
            replacement: def.replacement,
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.regex.replace_all(text, self.replacement).into_owned()
    }
}

pub struct ScriptAssembler {
    rules: Vec<CleanupRule>,
}

impl ScriptAssembler {
    pub fn new() -> Result<Self> {
        Self::with_rules(CLEANUP_RULES)
    }

    pub fn with_rules(defs: &[RuleDef]) -> Result<Self> {
        let rules = defs.iter().map(CleanupRule::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rule(&self, name: &str) -> Option<&CleanupRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    fn pass(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule.apply(&out);
        }
        out.trim().to_string()
    }

    pub fn clean(&self, text: &str) -> String {
        let mut current = self.pass(text);
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Ordered join of chapter scripts, cleaned.
    pub fn assemble<S: AsRef<str>>(&self, chapters: &[S]) -> String {
        let joined = chapters
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(CHAPTER_SEPARATOR);
        self.clean(&joined)
    }
}

fn is_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '。' | '！' | '？')
}

/// Splits after sentence-terminal punctuation that is followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (idx, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let piece = text[start..idx].trim();
            if !piece.is_empty() {
                out.push(piece);
            }
            start = idx;
        }
        prev_terminal = is_terminal(ch);
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

pub fn last_sentence(text: &str) -> Option<String> {
    split_sentences(text).last().map(|s| s.to_string())
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> ScriptAssembler {
        ScriptAssembler::new().unwrap()
    }

    #[test]
    fn test_all_rules_compile() {
        let a = assembler();
        for def in CLEANUP_RULES {
            assert!(a.rule(def.name).is_some(), "missing rule {}", def.name);
        }
    }

    #[test]
    fn test_scene_tags_rule() {
        let a = assembler();
        let rule = a.rule("scene_tags").unwrap();
        assert_eq!(rule.apply("[Scene 3] The morning walk."), "The morning walk.");
        assert_eq!(rule.apply("[씬 12]아침 산책"), "아침 산책");
        assert_eq!(rule.apply("[Chapter 2: Knees] Stretch."), "Stretch.");
    }

    #[test]
    fn test_role_leakage_rule() {
        let a = assembler();
        let rule = a.rule("role_leakage").unwrap();
        let out = rule.apply("Drink water.\nRole: senior expert\nInsight: hydration\n지시사항: 톤 유지");
        assert_eq!(out.trim_end(), "Drink water.");
        assert_eq!(rule.apply("The role: of water is big."), "The role: of water is big.");
    }

    #[test]
    fn test_meta_commentary_rules() {
        let a = assembler();
        let text = "Understood.\nHere is the finished script:\nWalk every day.\n알겠습니다!";
        assert_eq!(a.clean(text), "Walk every day.");
    }

    #[test]
    fn test_markdown_rules() {
        let a = assembler();
        let text = "```markdown\n## **Morning** routine\n[start] Stretch *slowly*. [END]\n```";
        assert_eq!(a.clean(text), "Morning routine\nStretch slowly.");
    }

    #[test]
    fn test_assemble_joins_with_blank_line() {
        let a = assembler();
        let out = a.assemble(&["[Scene 1] First part.", "[Scene 2] Second part.\n\n\n\nEnd."]);
        assert_eq!(out, "First part.\n\nSecond part.\n\nEnd.");
    }

    #[test]
    fn test_clean_is_idempotent() {
        let a = assembler();
        let samples = [
            "[Scene 1] [Scene 2] Hello there.\nRole: narrator\n\n\n\nBye.",
            "[시[시작]작] body text",
            "Sure.\n# # Title\n**bold** text   \n[Chapter 1]\ninstruction: keep tone\n",
            "  \n\n[씬 1]\n\nHere's your script\n알겠습니다.\n인사이트: x\nFinal line!  ",
            "",
        ];
        for s in samples {
            let once = a.clean(s);
            assert_eq!(a.clean(&once), once, "not idempotent for {s:?}");
        }
        let joined = a.assemble(&samples);
        assert_eq!(a.clean(&joined), joined);
    }

    #[test]
    fn test_deeply_nested_markers_clean_in_one_call() {
        let a = assembler();
        let input = format!("Body. {}[start]{}", "[s".repeat(9), "tart]".repeat(9));
        let once = a.clean(&input);
        assert_eq!(once, "Body.");
        assert_eq!(a.clean(&once), once);

        let scenes = format!("{}[Scene 1]{} Text.", "[Scene 1".repeat(12), "]".repeat(12));
        let once = a.clean(&scenes);
        assert_eq!(a.clean(&once), once);
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One. Two! Three? 넷。 Five");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "넷。", "Five"]);
        assert_eq!(split_sentences("3.5 percent rose.").len(), 1);
    }

    #[test]
    fn test_last_sentence() {
        assert_eq!(last_sentence("Walk daily. Sleep well.\n").as_deref(), Some("Sleep well."));
        assert_eq!(last_sentence("   "), None);
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("  one two\nthree  "), 3);
        assert_eq!(count_words(""), 0);
    }
}
