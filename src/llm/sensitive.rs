//! Reversible term substitution for text crossing the service boundary.
//!
//! Outbound content is masked just before it leaves the process and replies are
//! unmasked as soon as they arrive, so the rest of the crate only sees the
//! original terms.

use crate::config::SensitiveConfig;
use regex::{Captures, Regex};

struct Rule {
    pattern: Regex,
    replacement: String,
}

pub struct SensitiveFilter {
    mask_rules: Vec<Rule>,
    unmask_rules: Vec<Rule>,
}

impl SensitiveFilter {
    /// Build from config. Returns `None` when disabled or the map is empty.
    pub fn from_config(config: &SensitiveConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled || config.replacements.is_empty() {
            return Ok(None);
        }
        let pairs: Vec<(String, String)> = config
            .replacements
            .iter()
            .filter(|(from, to)| !from.is_empty() && !to.is_empty())
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        Ok(Some(Self::new(&pairs)?))
    }

    pub fn new(pairs: &[(String, String)]) -> anyhow::Result<Self> {
        let reversed: Vec<(String, String)> =
            pairs.iter().map(|(a, b)| (b.clone(), a.clone())).collect();
        Ok(Self {
            mask_rules: compile(pairs)?,
            unmask_rules: compile(&reversed)?,
        })
    }

    pub fn mask(&self, text: &str) -> String {
        apply(&self.mask_rules, text)
    }

    pub fn unmask(&self, text: &str) -> String {
        apply(&self.unmask_rules, text)
    }
}

fn compile(pairs: &[(String, String)]) -> anyhow::Result<Vec<Rule>> {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    // Longer keys first so a short key never splits a longer match.
    sorted.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .map(|(from, to)| -> anyhow::Result<Rule> {
            Ok(Rule {
                pattern: Regex::new(&format!("(?i){}", regex::escape(from)))?,
                replacement: to.clone(),
            })
        })
        .collect()
}

fn apply(rules: &[Rule], text: &str) -> String {
    let mut out = text.to_string();
    for rule in rules {
        out = rule
            .pattern
            .replace_all(&out, |caps: &Captures<'_>| {
                match_case(&caps[0], &rule.replacement)
            })
            .into_owned();
    }
    out
}

/// ALL CAPS stays caps, Capitalized stays capitalized, anything else is lowercased.
fn match_case(sample: &str, template: &str) -> String {
    let has_letters = sample.chars().any(char::is_alphabetic);
    if has_letters && sample.to_uppercase() == sample {
        return template.to_uppercase();
    }
    let mut chars = sample.chars();
    let capitalized = chars.next().is_some_and(char::is_uppercase)
        && chars.clone().next().is_some()
        && chars.all(char::is_lowercase);
    if capitalized {
        let lower = template.to_lowercase();
        let mut out = String::with_capacity(lower.len());
        let mut tchars = lower.chars();
        if let Some(first) = tchars.next() {
            out.extend(first.to_uppercase());
        }
        out.extend(tchars);
        return out;
    }
    template.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn filter() -> SensitiveFilter {
        SensitiveFilter::new(&[
            ("xvideos".to_string(), "xv1deos".to_string()),
            ("91".to_string(), "61".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn mask_preserves_case_shape() {
        let f = filter();
        assert_eq!(f.mask("XVIDEOS and Xvideos and xVideos"), "XV1DEOS and Xv1deos and xv1deos");
    }

    #[test]
    fn longer_keys_win_over_substrings() {
        let f = SensitiveFilter::new(&[
            ("video".to_string(), "clip".to_string()),
            ("xvideos".to_string(), "xv1deos".to_string()),
        ])
        .unwrap();
        assert_eq!(f.mask("xvideos video"), "xv1deos clip");
    }

    #[test]
    fn unmask_reverses_mask() {
        let f = filter();
        let masked = f.mask("https://91.example/xvideos/path");
        assert_eq!(masked, "https://61.example/xv1deos/path");
        assert_eq!(f.unmask(&masked), "https://91.example/xvideos/path");
    }

    #[test]
    fn disabled_or_empty_config_yields_no_filter() {
        let mut config = SensitiveConfig::default();
        assert!(SensitiveFilter::from_config(&config).unwrap().is_none());
        config.replacements = BTreeMap::from([("a".to_string(), "b".to_string())]);
        config.enabled = false;
        assert!(SensitiveFilter::from_config(&config).unwrap().is_none());
        config.enabled = true;
        assert!(SensitiveFilter::from_config(&config).unwrap().is_some());
    }
}
