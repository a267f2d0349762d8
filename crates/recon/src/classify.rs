//! Line item → structured enrollment.
//!
//! Titles and variants are free text typed by whoever set up the shop, so
//! classification is substring matching against a priority-ordered rule
//! table. First matching rule wins.

use regex::Regex;

use crate::config::ClassificationConfig;
use crate::model::{Block, ClassName, ClassificationResult, Role};

const FREE_CLASS_MARKER: &str = "free class";

/// Built-in rules, highest priority first. Free-class detection is handled
/// separately and always wins.
const DEFAULT_RULES: &[(&[&str], ClassName)] = &[
    (&["unlimited bundle", "platinum bundle"], ClassName::Bundle),
    (&["body movement"], ClassName::BodyMovement),
    (&["shines"], ClassName::Shines),
    (&["level 3"], ClassName::Level3),
    (&["level 2"], ClassName::Level2),
    (&["level 1"], ClassName::Level1),
];

#[derive(Debug, Clone)]
struct Rule {
    patterns: Vec<String>,
    class_name: ClassName,
}

impl Rule {
    fn matches(&self, title_lower: &str) -> bool {
        self.patterns.iter().any(|p| title_lower.contains(p.as_str()))
    }
}

/// Deterministic classifier. Build once per run, reuse for every item.
#[derive(Debug, Clone)]
pub struct TextClassifier {
    rules: Vec<Rule>,
    term_re: Regex,
}

impl Default for TextClassifier {
    fn default() -> Self {
        Self::new(&ClassificationConfig::default())
    }
}

impl TextClassifier {
    /// Configured rules go first, then the built-in table.
    pub fn new(config: &ClassificationConfig) -> Self {
        let mut rules: Vec<Rule> = config
            .rules
            .iter()
            .map(|r| Rule {
                patterns: r.contains.iter().map(|p| p.trim().to_lowercase()).collect(),
                class_name: r.class,
            })
            .collect();

        rules.extend(DEFAULT_RULES.iter().map(|(patterns, class_name)| Rule {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            class_name: *class_name,
        }));

        Self {
            rules,
            term_re: Regex::new(r"term\s*(\d+)\s*([ab])?\b").expect("term pattern is valid"),
        }
    }

    pub fn classify(&self, title: &str, variant: &str) -> ClassificationResult {
        let title_lower = title.to_lowercase();
        let variant_lower = variant.to_lowercase();
        let (term, block) = self.term_and_block(&variant_lower);

        if title_lower.contains(FREE_CLASS_MARKER) {
            return ClassificationResult {
                class_name: ClassName::FreeClass,
                term,
                block,
                role: extract_role(&variant_lower, &title_lower),
                is_free: true,
                is_bundle: false,
            };
        }

        let class_name = self
            .rules
            .iter()
            .find(|rule| rule.matches(&title_lower))
            .map(|rule| rule.class_name)
            .unwrap_or(ClassName::Unknown);

        let role = if class_name.is_solo() {
            Role::NoRole
        } else {
            extract_role(&variant_lower, &title_lower)
        };

        ClassificationResult {
            class_name,
            term,
            block,
            role,
            is_free: false,
            is_bundle: class_name == ClassName::Bundle,
        }
    }

    /// First `term N` mention is the term. Letters attached to that number
    /// anywhere in the variant decide the block.
    fn term_and_block(&self, variant_lower: &str) -> (Option<String>, Block) {
        let mut term: Option<String> = None;
        let mut saw_a = false;
        let mut saw_b = false;

        for caps in self.term_re.captures_iter(variant_lower) {
            let number = &caps[1];
            match term {
                None => term = Some(number.to_string()),
                Some(ref t) if t != number => continue,
                Some(_) => {}
            }
            match caps.get(2).map(|m| m.as_str()) {
                Some("a") => saw_a = true,
                Some("b") => saw_b = true,
                _ => {}
            }
        }

        let block = match (&term, saw_a, saw_b) {
            (None, _, _) => Block::None,
            (Some(_), true, false) => Block::A,
            (Some(_), false, true) => Block::B,
            (Some(_), _, _) => Block::Both,
        };
        (term, block)
    }
}

/// Earliest `leader`/`follower` mention in the variant, else the title.
fn extract_role(variant_lower: &str, title_lower: &str) -> Role {
    role_in(variant_lower)
        .or_else(|| role_in(title_lower))
        .unwrap_or(Role::Unspecified)
}

fn role_in(text: &str) -> Option<Role> {
    match (text.find("leader"), text.find("follower")) {
        (Some(l), Some(f)) => Some(if l < f { Role::Leader } else { Role::Follower }),
        (Some(_), None) => Some(Role::Leader),
        (None, Some(_)) => Some(Role::Follower),
        (None, None) => None,
    }
}
