use regex::{Regex, RegexBuilder};

use crate::error::{Error, Result};

/// First anonymization stage. Removes every configured keyword, ignoring case, wherever it
/// occurs in a title, including inside other words.
#[derive(Debug, Clone)]
pub struct KeywordRedactor {
    pattern: Option<Regex>,
    placeholder: String,
}

impl KeywordRedactor {
    pub fn new(keywords: &[String], placeholder: impl Into<String>) -> Result<Self> {
        let mut keywords: Vec<&str> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Ok(Self {
                pattern: None,
                placeholder: placeholder.into(),
            });
        }

        // Longest first so that "alice smith" wins over "alice".
        keywords.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));
        keywords.dedup();

        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid forbidden keyword list: {e}")))?;

        Ok(Self {
            pattern: Some(pattern),
            placeholder: placeholder.into(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    /// Replaces keyword occurrences with the placeholder. When the placeholder itself, or a
    /// seam between it and its neighbours, still matches a keyword, the remaining matches are
    /// dropped until nothing matches. Every removal pass shortens the text, so this ends.
    pub fn redact(&self, text: &str) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };

        let mut redacted = pattern
            .replace_all(text, regex::NoExpand(&self.placeholder))
            .into_owned();

        while pattern.is_match(&redacted) {
            redacted = pattern.replace_all(&redacted, "").into_owned();
        }
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn redactor(keywords: &[&str]) -> KeywordRedactor {
        let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
        KeywordRedactor::new(&keywords, "[redacted]").unwrap()
    }

    #[test]
    fn redacts_with_placeholder() {
        let redactor = redactor(&["alice"]);
        assert_eq!(
            redactor.redact("alice's document - Editor"),
            "[redacted]'s document - Editor"
        );
    }

    #[test]
    fn ignores_case_and_word_boundaries() {
        let redactor = redactor(&["alice"]);
        assert_eq!(
            redactor.redact("ALICE and Alice in MaliceAlIcE"),
            "[redacted] and [redacted] in M[redacted][redacted]"
        );
    }

    #[test]
    fn no_keywords_is_identity() {
        let redactor = redactor(&[]);
        assert!(redactor.is_empty());
        assert_eq!(redactor.redact("alice - Editor"), "alice - Editor");
    }

    #[test]
    fn handles_empty_and_odd_input() {
        let redactor = redactor(&["a.b", "(x"]);
        assert_eq!(redactor.redact(""), "");
        assert_eq!(redactor.redact("aXb a.b (x"), "aXb [redacted] [redacted]");
    }

    #[test]
    fn prefers_longest_keyword() {
        let redactor = redactor(&["alice", "alice smith"]);
        assert_eq!(redactor.redact("Alice Smith - Mail"), "[redacted] - Mail");
    }

    #[test]
    fn keyword_inside_placeholder_is_still_removed() {
        let redactor = redactor(&["red", "act"]);
        let output = redactor.redact("red act Red");
        assert!(!output.to_lowercase().contains("red"), "{output}");
        assert!(!output.to_lowercase().contains("act"), "{output}");
    }

    #[test]
    fn keyword_never_survives() {
        let keywords = ["alice", "bob", "ob"];
        let redactor = redactor(&keywords);
        let titles = [
            "Alice's notes",
            "BOBBY tables",
            "aliceALICEalice",
            "bo b",
            "alialicece",
            "bobob - ALI CE",
            "",
        ];
        for title in titles {
            let output = redactor.redact(title).to_lowercase();
            for keyword in keywords {
                assert!(!output.contains(keyword), "{title:?} -> {output:?}");
            }
        }
    }
}
