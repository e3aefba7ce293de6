use serde::{Deserialize, Serialize};

pub const DEFAULT_TONE: &str = "senior-expert";

/// Named bundle of style rules applied to every chapter of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TonePersona {
    pub name: String,
    pub rules: Vec<String>,
}

struct PersonaDef {
    key: &'static str,
    name: &'static str,
    rules: &'static [&'static str],
    preview: &'static str,
}

const PERSONAS: &[PersonaDef] = &[
    PersonaDef {
        key: "senior-expert",
        name: "Senior health expert",
        rules: &[
            "Use trustworthy professional terms but keep sentence endings formal.",
            "Explain medical terms in plain language.",
            "Keep the polite register consistent throughout.",
            "Deliver calmly and with authority.",
        ],
        preview: "Written in a formal, measured register.",
    },
    PersonaDef {
        key: "friendly-neighbor",
        name: "Friendly neighbor",
        rules: &[
            "Use a soft, conversational register.",
            "Ask the listener questions often to keep it interactive.",
        ],
        preview: "Written in a warm conversational register.",
    },
    PersonaDef {
        key: "grandchild-friendly",
        name: "Affectionate grandchild",
        rules: &[
            "Use a warm, affectionate voice.",
            "Include caring expressions.",
        ],
        preview: "Written with sweet, affectionate phrasing.",
    },
    PersonaDef {
        key: "charismatic-trainer",
        name: "Charismatic trainer",
        rules: &[
            "Use an energetic imperative voice.",
            "Lean on motivational phrasing.",
        ],
        preview: "Written as energetic commands.",
    },
    PersonaDef {
        key: "professional-analyst",
        name: "Professional data analyst",
        rules: &[
            "Lead with figures and evidence.",
            "Stay objective and fact-driven.",
        ],
        preview: "Written in an objective, number-driven style.",
    },
    PersonaDef {
        key: "emotional-storyteller",
        name: "Emotional storyteller",
        rules: &[
            "Use a narrative voice that comforts and empathises.",
            "Apply storytelling techniques.",
        ],
        preview: "Written as an emotional narrative.",
    },
    PersonaDef {
        key: "humorous-comedian",
        name: "Humorous comedian",
        rules: &[
            "Mix in witty metaphors and jokes.",
            "Keep the humour light.",
        ],
        preview: "Written with humorous expressions.",
    },
    PersonaDef {
        key: "urgent-news-anchor",
        name: "Urgent news anchor",
        rules: &[
            "Use clear, concise sentence structure.",
            "Stress why it matters.",
        ],
        preview: "Written in a news-anchor style.",
    },
];

fn lookup(key: &str) -> &'static PersonaDef {
    PERSONAS
        .iter()
        .find(|p| p.key == key)
        .unwrap_or(&PERSONAS[0])
}

impl TonePersona {
    /// Persona for a tone key; unknown keys get the senior expert.
    pub fn for_tone(key: &str) -> Self {
        let def = lookup(key);
        Self {
            name: def.name.to_string(),
            rules: def.rules.iter().map(|r| r.to_string()).collect(),
        }
    }
}

pub fn persona_preview(key: &str) -> &'static str {
    lookup(key).preview
}

pub fn tone_keys() -> impl Iterator<Item = &'static str> {
    PERSONAS.iter().map(|p| p.key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tone() {
        let p = TonePersona::for_tone("urgent-news-anchor");
        assert_eq!(p.name, "Urgent news anchor");
        assert_eq!(p.rules.len(), 2);
    }

    #[test]
    fn test_unknown_tone_falls_back() {
        assert_eq!(TonePersona::for_tone("pirate"), TonePersona::for_tone(DEFAULT_TONE));
        assert_eq!(persona_preview("pirate"), persona_preview(DEFAULT_TONE));
    }

    #[test]
    fn test_all_keys_resolve_to_themselves() {
        assert_eq!(tone_keys().count(), 8);
        for key in tone_keys() {
            assert!(!TonePersona::for_tone(key).rules.is_empty());
        }
    }
}
