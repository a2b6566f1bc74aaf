//! Keyword extraction from free-text commands.

use once_cell::sync::Lazy;
use regex::Regex;
use todd_core::Technology;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bemail\s*[:=]?\s*)?\b([\w.+-]+@[\w-]+(?:\.[\w-]+)+)").unwrap());
static PASSWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:password|passwd|pwd)\s*[:=]?\s*(\S+)").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

const TECHNOLOGY_WORDS: &[(&str, Technology)] = &[
    ("selenium", Technology::Selenium),
    ("testng", Technology::Selenium),
    ("playwright", Technology::Playwright),
    ("maestro", Technology::Maestro),
];

const PROD_WORDS: &[&str] = &["prod", "production"];
const QA_WORDS: &[&str] = &["qa", "staging"];
const US_WORDS: &[&str] = &["us", "usa"];
const CA_WORDS: &[&str] = &["ca", "canada"];
const FOLLOW_UP_PHRASES: &[&str] = &["again", "same", "rerun", "re run", "that one", "those"];
const EXPAND_ALL_PHRASES: &[&str] = &[
    "everything",
    "all suites",
    "all workflows",
    "all frameworks",
    "all technologies",
];

/// Test categories that become tags or select a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    CoreUx,
    E2e,
    Checkout,
    Login,
    Search,
    Payments,
    Smoke,
    Regression,
    Sanity,
}

const CATEGORY_PHRASES: &[(&[&str], Category)] = &[
    (&["core ux", "coreux"], Category::CoreUx),
    (&["e2e", "end to end"], Category::E2e),
    (&["checkout"], Category::Checkout),
    (&["login", "sign in", "signin"], Category::Login),
    (&["search"], Category::Search),
    (&["payments", "payment"], Category::Payments),
    (&["smoke"], Category::Smoke),
    (&["regression"], Category::Regression),
    (&["sanity"], Category::Sanity),
];

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::CoreUx => "coreUx",
            Category::E2e => "e2e",
            Category::Checkout => "checkout",
            Category::Login => "login",
            Category::Search => "search",
            Category::Payments => "payments",
            Category::Smoke => "smoke",
            Category::Regression => "regression",
            Category::Sanity => "sanity",
        }
    }

    /// Smoke and regression pick a suite in the web repository instead of a tag.
    pub fn is_suite_selector(&self) -> bool {
        matches!(self, Category::Smoke | Category::Regression)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedCommand {
    pub text: String,
    normalized: String,
    pub technologies: Vec<Technology>,
    pub environment: Option<String>,
    pub region: Option<String>,
    pub categories: Vec<Category>,
    pub credentials: Credentials,
    pub follow_up: bool,
    pub expand_all: bool,
}

impl ParsedCommand {
    pub fn parse(text: &str) -> Self {
        let credentials = Credentials {
            email: EMAIL.captures(text).map(|c| c[1].to_string()),
            password: PASSWORD.captures(text).map(|c| c[1].to_string()),
        };

        // Credentials must not leak into keyword matching ("qa@shop.com").
        let scrubbed = PASSWORD.replace_all(text, " ");
        let scrubbed = EMAIL.replace_all(&scrubbed, " ");
        let normalized = format!(
            " {} ",
            NON_WORD.replace_all(&scrubbed.to_lowercase(), " ").trim()
        );

        let mut parsed = Self {
            text: text.to_string(),
            normalized,
            technologies: Vec::new(),
            environment: None,
            region: None,
            categories: Vec::new(),
            credentials,
            follow_up: false,
            expand_all: false,
        };

        parsed.technologies = parsed.ordered(
            TECHNOLOGY_WORDS
                .iter()
                .map(|(w, t)| (std::slice::from_ref(w), *t)),
        );
        parsed.categories = parsed.ordered(CATEGORY_PHRASES.iter().map(|(p, c)| (*p, *c)));
        parsed.environment = parsed
            .ordered([(PROD_WORDS, "prod"), (QA_WORDS, "qa")].into_iter())
            .first()
            .map(|e| e.to_string());
        parsed.region = parsed
            .ordered([(US_WORDS, "us"), (CA_WORDS, "ca")].into_iter())
            .first()
            .map(|r| r.to_string());
        parsed.follow_up = parsed.has_any(FOLLOW_UP_PHRASES);
        parsed.expand_all = parsed.has_any(EXPAND_ALL_PHRASES);

        parsed
    }

    fn position(&self, phrase: &str) -> Option<usize> {
        self.normalized.find(&format!(" {} ", phrase))
    }

    pub fn has(&self, phrase: &str) -> bool {
        self.position(phrase).is_some()
    }

    pub fn has_any(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.has(p))
    }

    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    pub fn is_prod(&self) -> bool {
        self.environment.as_deref() == Some("prod")
    }

    /// Values whose phrases appear in the text, ordered by first appearance.
    fn ordered<'a, T: Copy + PartialEq>(
        &self,
        table: impl Iterator<Item = (&'a [&'a str], T)>,
    ) -> Vec<T> {
        let mut found: Vec<(usize, T)> = table
            .filter_map(|(phrases, value)| {
                phrases
                    .iter()
                    .filter_map(|p| self.position(p))
                    .min()
                    .map(|pos| (pos, value))
            })
            .collect();
        found.sort_by_key(|(pos, _)| *pos);

        let mut values = Vec::new();
        for (_, value) in found {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }
}
