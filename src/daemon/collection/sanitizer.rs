use crate::config::{CleanupRule, TitleConfig};

/// Stored when no title could be obtained.
pub const UNKNOWN_TITLE: &str = "Unknown";

const TRUNCATION_MARKER: &str = "...";

/// How far back from the length limit a word boundary is still preferred over a hard cut.
const WORD_BOUNDARY_SLACK: usize = 20;

/// Normalizes and shortens raw window titles. Sanitization is about readability, privacy is
/// handled by the anonymization stages.
#[derive(Debug, Clone)]
pub struct TitleSanitizer {
    max_title_length: usize,
    known_browsers: Vec<String>,
    cleanup_rules: Vec<CleanupRule>,
}

impl TitleSanitizer {
    pub fn new(config: &TitleConfig) -> Self {
        Self {
            max_title_length: config.max_title_length.max(1),
            known_browsers: config.known_browsers.clone(),
            cleanup_rules: config.cleanup_rules.clone(),
        }
    }

    pub fn sanitize(&self, raw_title: &str) -> String {
        let title = raw_title.trim();
        if title.is_empty() {
            return UNKNOWN_TITLE.to_string();
        }

        let browser = self.browser_of(title);

        if let Some(rule) = self.cleanup_rules.iter().find(|r| title.contains(&r.pattern)) {
            // Keep the browser so that the same site in two browsers stays distinguishable.
            let cleaned = match browser {
                Some(browser) => format!("{} - {browser}", rule.replacement),
                None => rule.replacement.clone(),
            };
            return self.truncate(&cleaned);
        }

        self.truncate(title)
    }

    /// Browser tabs look like `<page> - <Browser Name>`.
    fn browser_of(&self, title: &str) -> Option<&str> {
        self.known_browsers
            .iter()
            .find(|browser| {
                title
                    .strip_suffix(browser.as_str())
                    .is_some_and(|rest| rest.ends_with(" - ") || rest.ends_with(" — "))
            })
            .map(String::as_str)
    }

    fn truncate(&self, title: &str) -> String {
        let max = self.max_title_length;
        if title.chars().count() <= max {
            return if title.is_empty() {
                UNKNOWN_TITLE.to_string()
            } else {
                title.to_string()
            };
        }

        let cut = title
            .char_indices()
            .nth(max)
            .map(|(i, _)| i)
            .unwrap_or(title.len());
        let head = &title[..cut];

        let head = match head.rfind(char::is_whitespace) {
            Some(space) if head[space..].chars().count() <= WORD_BOUNDARY_SLACK => &head[..space],
            _ => head,
        };

        format!("{}{TRUNCATION_MARKER}", head.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer(rules: &[(&str, &str)]) -> TitleSanitizer {
        TitleSanitizer::new(&TitleConfig {
            max_title_length: 120,
            known_browsers: vec!["Mozilla Firefox".into(), "Google Chrome".into()],
            cleanup_rules: rules
                .iter()
                .map(|(pattern, replacement)| CleanupRule {
                    pattern: pattern.to_string(),
                    replacement: replacement.to_string(),
                })
                .collect(),
        })
    }

    #[test]
    fn empty_title_maps_to_sentinel() {
        let sanitizer = sanitizer(&[]);
        assert_eq!(sanitizer.sanitize(""), UNKNOWN_TITLE);
        assert_eq!(sanitizer.sanitize("   "), UNKNOWN_TITLE);
    }

    #[test]
    fn short_titles_are_kept() {
        let sanitizer = sanitizer(&[]);
        assert_eq!(sanitizer.sanitize(" main.rs - nvim "), "main.rs - nvim");
    }

    #[test]
    fn first_matching_rule_wins() {
        let sanitizer = sanitizer(&[("YouTube", "Video"), ("Tube", "Tubes")]);
        assert_eq!(sanitizer.sanitize("Cats compilation - YouTube"), "Video");
        assert_eq!(sanitizer.sanitize("My Tube map"), "Tubes");
    }

    #[test]
    fn browser_suffix_survives_cleanup() {
        let sanitizer = sanitizer(&[("YouTube", "YouTube")]);
        assert_eq!(
            sanitizer.sanitize("Cats compilation - YouTube - Mozilla Firefox"),
            "YouTube - Mozilla Firefox"
        );
        assert_eq!(
            sanitizer.sanitize("Some page - Google Chrome"),
            "Some page - Google Chrome"
        );
    }

    #[test]
    fn long_titles_are_truncated() {
        let sanitizer = sanitizer(&[]);
        let title = "word ".repeat(40);
        assert_eq!(title.len(), 200);

        let sanitized = sanitizer.sanitize(&title);
        assert!(sanitized.ends_with(TRUNCATION_MARKER));
        let body = sanitized.trim_end_matches(TRUNCATION_MARKER);
        assert!(body.chars().count() <= 120, "{}", body.len());
        assert!(body.ends_with("word"), "cut should land on a word boundary");
    }

    #[test]
    fn long_titles_without_spaces_are_cut_hard() {
        let sanitizer = sanitizer(&[]);
        let title = "x".repeat(200);
        let sanitized = sanitizer.sanitize(&title);
        assert_eq!(sanitized, format!("{}{TRUNCATION_MARKER}", "x".repeat(120)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let sanitizer = TitleSanitizer::new(&TitleConfig {
            max_title_length: 3,
            ..TitleConfig::default()
        });
        assert_eq!(sanitizer.sanitize("ééééé"), "ééé...");
    }
}
