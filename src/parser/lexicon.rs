//! Data-driven synonym dictionary for clinical entity matching.
//!
//! Maps canonical terms (conditions, biomarkers, lab names) to their
//! surface forms — "Her-2" and "HER2" both resolve to the canonical
//! biomarker `HER2`. Matching is case-insensitive and whole-word so
//! that "walking" never matches `ALK` and "supplement" never matches
//! "men". A built-in dictionary ships embedded in the binary; callers
//! can load a replacement from JSON.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Deserialize;

use crate::error::RankError;

/// Built-in dictionary, shared with the original clinical synonym data.
const BUILTIN_JSON: &str = include_str!("../../data/clinical_synonyms.json");

/// One canonical term and the compiled pattern matching all its aliases.
#[derive(Debug)]
struct TermSet {
    canonical: String,
    pattern: Regex,
    /// Lowercased aliases, kept for reverse lookup in [`Lexicon::canonicalize`].
    aliases: Vec<String>,
}

/// A lab entry: canonical name, comparator-aware threshold pattern, and
/// whether a failed threshold on this lab disqualifies the patient
/// outright.
#[derive(Debug)]
pub struct LabEntry {
    pub canonical: String,
    pub gating: bool,
    /// Matches `<alias> … <comparator> <number>` with a bounded gap, e.g.
    /// "Creatinine ≤ 1.5 mg/dL" or "platelet count of >= 100,000/µL".
    /// Capture 1 is the comparator symbol, capture 2 the numeric value.
    pub(super) threshold_re: Regex,
}

/// On-disk shape of the dictionary file.
#[derive(Debug, Deserialize)]
struct LexiconFile {
    conditions: BTreeMap<String, Vec<String>>,
    biomarkers: BTreeMap<String, Vec<String>>,
    labs: BTreeMap<String, LabSpec>,
}

#[derive(Debug, Deserialize)]
struct LabSpec {
    aliases: Vec<String>,
    #[serde(default)]
    gating: bool,
}

/// An immutable, load-once synonym dictionary.
#[derive(Debug)]
pub struct Lexicon {
    conditions: Vec<TermSet>,
    biomarkers: Vec<TermSet>,
    labs: Vec<LabEntry>,
}

static BUILTIN: OnceLock<Arc<Lexicon>> = OnceLock::new();

impl Lexicon {
    /// The embedded built-in dictionary, compiled once per process.
    ///
    /// The built-in JSON is validated by tests, so compilation cannot
    /// fail at runtime; an empty lexicon is the fallback if it somehow
    /// does.
    pub fn builtin() -> Arc<Lexicon> {
        BUILTIN
            .get_or_init(|| {
                Arc::new(Self::from_json(BUILTIN_JSON).unwrap_or(Lexicon {
                    conditions: Vec::new(),
                    biomarkers: Vec::new(),
                    labs: Vec::new(),
                }))
            })
            .clone()
    }

    /// Load a dictionary from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`RankError::Lexicon`] if the JSON is malformed or an
    /// alias set compiles to an invalid pattern.
    pub fn from_json(json: &str) -> Result<Lexicon, RankError> {
        let file: LexiconFile =
            serde_json::from_str(json).map_err(|e| RankError::Lexicon(format!("invalid JSON: {e}")))?;

        let compile_terms = |entries: BTreeMap<String, Vec<String>>| -> Result<Vec<TermSet>, RankError> {
            entries
                .into_iter()
                .map(|(canonical, aliases)| {
                    let alternation = alias_alternation(&canonical, &aliases);
                    Ok(TermSet {
                        pattern: compile_alias_pattern(&canonical, &alternation)?,
                        aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
                        canonical,
                    })
                })
                .collect()
        };

        let labs = file
            .labs
            .into_iter()
            .map(|(canonical, spec)| {
                let alternation = alias_alternation(&canonical, &spec.aliases);
                Ok(LabEntry {
                    threshold_re: compile_threshold_pattern(&canonical, &alternation)?,
                    canonical,
                    gating: spec.gating,
                })
            })
            .collect::<Result<Vec<_>, RankError>>()?;

        Ok(Lexicon {
            conditions: compile_terms(file.conditions)?,
            biomarkers: compile_terms(file.biomarkers)?,
            labs,
        })
    }

    /// Canonical condition terms found anywhere in `text`. Overlapping
    /// matches resolve to the longest span, so "non-small cell lung
    /// cancer" reads as `NSCLC` only, never `SCLC` as well.
    pub fn conditions_in<'s>(&'s self, text: &str) -> impl Iterator<Item = &'s str> + 's {
        matched_terms(&self.conditions, text).into_iter()
    }

    /// Canonical biomarker terms found anywhere in `text`, longest
    /// span winning on overlap.
    pub fn biomarkers_in<'s>(&'s self, text: &str) -> impl Iterator<Item = &'s str> + 's {
        matched_terms(&self.biomarkers, text).into_iter()
    }

    /// All known labs, in canonical-name order.
    pub fn labs(&self) -> &[LabEntry] {
        &self.labs
    }

    /// Whether a failed threshold on `lab` disqualifies the patient.
    /// Unknown labs are treated as additive, not gating.
    pub fn is_gating_lab(&self, lab: &str) -> bool {
        self.labs
            .iter()
            .any(|entry| entry.gating && entry.canonical.eq_ignore_ascii_case(lab))
    }

    /// Map free-text condition input to its canonical term.
    ///
    /// Tries alias-in-input first ("metastatic thyroid cancer" →
    /// `Thyroid Cancer`), then input-in-alias ("hodgkin" matching the
    /// longer alias "hodgkin lymphoma"). Returns `None` when nothing
    /// matches; callers keep the original text in that case.
    pub fn canonicalize(&self, input: &str) -> Option<&str> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(canonical) = matched_terms(&self.conditions, trimmed).into_iter().next() {
            return Some(canonical);
        }
        // Reverse direction: does any alias contain the input as a word?
        let needle = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(trimmed))).ok()?;
        self.conditions
            .iter()
            .find(|set| set.aliases.iter().any(|alias| needle.is_match(alias)))
            .map(|set| set.canonical.as_str())
    }
}

/// Terms with at least one match that is not contained inside a longer
/// match of a different term, in canonical-name order. Alias sets
/// overlap ("small cell lung cancer" is a substring of "non-small cell
/// lung cancer" and the hyphen is a word boundary), so a term only
/// counts where a longer term does not already claim the span.
fn matched_terms<'s>(sets: &'s [TermSet], text: &str) -> Vec<&'s str> {
    struct Span {
        term: usize,
        start: usize,
        end: usize,
    }
    let mut spans: Vec<Span> = Vec::new();
    for (term, set) in sets.iter().enumerate() {
        for m in set.pattern.find_iter(text) {
            spans.push(Span {
                term,
                start: m.start(),
                end: m.end(),
            });
        }
    }

    let claimed_by_longer = |span: &Span| {
        spans.iter().any(|other| {
            other.term != span.term
                && other.start <= span.start
                && span.end <= other.end
                && other.end - other.start > span.end - span.start
        })
    };

    let mut found = Vec::new();
    for (term, set) in sets.iter().enumerate() {
        let survives = spans
            .iter()
            .filter(|s| s.term == term)
            .any(|s| !claimed_by_longer(s));
        if survives {
            found.push(set.canonical.as_str());
        }
    }
    found
}

/// Join one canonical term's aliases into an escaped alternation,
/// longest first so that "egfr mutation" wins over "egfr" when a scan
/// needs the full span. The canonical name itself is always included.
fn alias_alternation(canonical: &str, aliases: &[String]) -> String {
    let mut alternates: Vec<String> = Vec::with_capacity(aliases.len() + 1);
    alternates.push(regex::escape(&canonical.to_lowercase()));
    for alias in aliases {
        let escaped = regex::escape(&alias.to_lowercase());
        if !alternates.contains(&escaped) {
            alternates.push(escaped);
        }
    }
    alternates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    alternates.join("|")
}

/// Compile an alias alternation into a case-insensitive, whole-word pattern.
fn compile_alias_pattern(canonical: &str, alternation: &str) -> Result<Regex, RankError> {
    let pattern = format!(r"(?i)\b(?:{alternation})\b");
    Regex::new(&pattern)
        .map_err(|e| RankError::Lexicon(format!("bad alias pattern for '{canonical}': {e}")))
}

/// Compile a lab's comparator-aware threshold pattern. A bounded gap
/// between the alias and the comparator tolerates phrasing like
/// "creatinine level of" while never crossing a line or clause break.
fn compile_threshold_pattern(canonical: &str, alternation: &str) -> Result<Regex, RankError> {
    let pattern = format!(
        r"(?i)\b(?:{alternation})\b[^\n;<>≤≥]{{0,30}}?(≤|≥|<=|>=|=<|=>|<|>)\s*(\d{{1,3}}(?:,\d{{3}})+(?:\.\d+)?|\d+(?:\.\d+)?)"
    );
    Regex::new(&pattern)
        .map_err(|e| RankError::Lexicon(format!("bad threshold pattern for '{canonical}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lexicon_compiles() {
        let lexicon = Lexicon::builtin();
        assert!(!lexicon.conditions.is_empty());
        assert!(!lexicon.biomarkers.is_empty());
        assert!(!lexicon.labs.is_empty());
    }

    #[test]
    fn builtin_json_is_valid() {
        assert!(Lexicon::from_json(BUILTIN_JSON).is_ok());
    }

    #[test]
    fn synonym_matching_is_case_insensitive() {
        let lexicon = Lexicon::builtin();
        let found: Vec<&str> = lexicon
            .conditions_in("patients with Non-Small Cell Lung Cancer")
            .collect();
        assert_eq!(found, vec!["NSCLC"]);
    }

    #[test]
    fn her2_surface_forms_map_to_canonical() {
        let lexicon = Lexicon::builtin();
        for text in ["HER2 positive", "Her-2 amplification", "HER2/neu overexpression"] {
            let found: Vec<&str> = lexicon.biomarkers_in(text).collect();
            assert_eq!(found, vec!["HER2"], "failed for {text:?}");
        }
    }

    #[test]
    fn whole_word_boundary_prevents_false_positives() {
        let lexicon = Lexicon::builtin();
        // "walking" must not match ALK, "supplement" must not match anything.
        assert_eq!(lexicon.biomarkers_in("patients capable of walking").count(), 0);
        assert_eq!(lexicon.conditions_in("dietary supplement use").count(), 0);
    }

    #[test]
    fn overlapping_aliases_resolve_to_longest_match() {
        let lexicon = Lexicon::builtin();
        let found: Vec<&str> = lexicon
            .conditions_in("metastatic non-small cell lung cancer")
            .collect();
        assert_eq!(found, vec!["NSCLC"]);
        let found: Vec<&str> = lexicon
            .conditions_in("extensive-stage small cell lung cancer")
            .collect();
        assert_eq!(found, vec!["SCLC"]);
        // A standalone mention of each term keeps both.
        let found: Vec<&str> = lexicon
            .conditions_in("small cell lung cancer transformed from non-small cell lung cancer")
            .collect();
        assert_eq!(found, vec!["NSCLC", "SCLC"]);
    }

    #[test]
    fn multiple_conditions_found_in_order() {
        let lexicon = Lexicon::builtin();
        let found: Vec<&str> = lexicon
            .conditions_in("history of melanoma and breast cancer")
            .collect();
        assert_eq!(found, vec!["Breast Cancer", "Melanoma"]);
    }

    #[test]
    fn gating_labs_match_builtin_policy() {
        let lexicon = Lexicon::builtin();
        assert!(lexicon.is_gating_lab("Creatinine"));
        assert!(lexicon.is_gating_lab("bilirubin"));
        assert!(!lexicon.is_gating_lab("Hemoglobin"));
        assert!(!lexicon.is_gating_lab("NotALab"));
    }

    #[test]
    fn canonicalize_maps_surface_forms() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.canonicalize("metastatic thyroid cancer"), Some("Thyroid Cancer"));
        assert_eq!(lexicon.canonicalize("NSCLC"), Some("NSCLC"));
        assert_eq!(lexicon.canonicalize("tnbc"), Some("Breast Cancer"));
    }

    #[test]
    fn canonicalize_reverse_direction() {
        let lexicon = Lexicon::builtin();
        // "hodgkin" is not an alias, but appears inside "hodgkin lymphoma".
        assert_eq!(lexicon.canonicalize("hodgkin"), Some("Lymphoma"));
    }

    #[test]
    fn canonicalize_unknown_returns_none() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.canonicalize("common cold"), None);
        assert_eq!(lexicon.canonicalize(""), None);
        assert_eq!(lexicon.canonicalize("   "), None);
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        assert!(Lexicon::from_json("not json").is_err());
        assert!(Lexicon::from_json("{}").is_err());
    }

    #[test]
    fn custom_lexicon_loads() {
        let json = r#"{
            "conditions": {"Gout": ["gout", "gouty arthritis"]},
            "biomarkers": {},
            "labs": {"Urate": {"aliases": ["uric acid"], "gating": false}}
        }"#;
        let lexicon = Lexicon::from_json(json).expect("load");
        let found: Vec<&str> = lexicon.conditions_in("patients with gouty arthritis").collect();
        assert_eq!(found, vec!["Gout"]);
        assert!(!lexicon.is_gating_lab("Urate"));
    }
}
