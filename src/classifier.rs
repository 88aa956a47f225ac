use serde::Serialize;
use tracing::debug;

use crate::config::DEFAULT_EXCLUSION_KEYWORDS;
use crate::types::Section;

/// Derives the webinar count from a course's sections by excluding
/// administrative sections through a case-insensitive keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebinarClassifier {
    keywords: Vec<String>,
}

/// Decision for a single section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionVerdict {
    pub section: Section,
    pub included: bool,
    /// Keyword that excluded the section, if one matched.
    pub matched_keyword: Option<String>,
}

impl Default for WebinarClassifier {
    fn default() -> Self { Self::new(DEFAULT_EXCLUSION_KEYWORDS.iter().copied()) }
}

impl WebinarClassifier {
    /// Keywords are trimmed and lowercased; empty ones are dropped since they
    /// would match every name.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] { &self.keywords }

    /// First keyword contained in `name`, compared case-insensitively.
    pub fn excluded_by(&self, name: Option<&str>) -> Option<&str> {
        let name = name.unwrap_or_default().to_lowercase();
        self.keywords.iter().map(String::as_str).find(|k| name.contains(k))
    }

    pub fn is_included(&self, section: &Section) -> bool { self.decide(section).0 }

    /// Inclusion decision plus the keyword that excluded the section, if any.
    fn decide(&self, section: &Section) -> (bool, Option<&str>) {
        let matched = self.excluded_by(section.name.as_deref());
        (section.lectures > 0 && matched.is_none(), matched)
    }

    /// Sum of lecture counts over included sections.
    pub fn classify(&self, sections: &[Section]) -> u64 {
        let total = sections
            .iter()
            .filter(|s| self.is_included(s))
            .map(|s| s.lectures as u64)
            .sum();
        debug!(sections = sections.len(), webinars = total, "classified course sections");
        total
    }

    pub fn explain(&self, sections: &[Section]) -> Vec<SectionVerdict> {
        sections
            .iter()
            .map(|s| {
                let (included, matched) = self.decide(s);
                debug!(
                    id = s.id.as_deref().unwrap_or("-"),
                    name = s.name.as_deref().unwrap_or(""),
                    lectures = s.lectures,
                    included,
                    "section"
                );
                SectionVerdict { section: s.clone(), included, matched_keyword: matched.map(str::to_string) }
            })
            .collect()
    }
}
