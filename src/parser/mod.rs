//! Criteria parser: free-text eligibility rules → [`ParsedCriteria`].
//!
//! [`parse`] is a total function — no input text produces an error, and
//! text with nothing extractable yields an unconstrained record. It is
//! deterministic (identical text always produces an identical record)
//! and performs no I/O, so results are safely cacheable per trial text
//! version.

pub mod lexicon;

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{
    Comparator, EcogRange, ExclusionFlag, Gender, LabThreshold, LinesRange, ParsedCriteria,
};

pub use lexicon::Lexicon;

/// Parse raw eligibility text into a structured criteria record.
///
/// Section headers ("Inclusion Criteria" / "Exclusion Criteria") split
/// the text into segments; without headers the whole text is treated as
/// inclusion-only. Hard-exclusion flags are only matched inside the
/// exclusion segment, conditions/biomarkers/lab thresholds inside the
/// inclusion segment, and age/gender/washout/lines/ECOG anywhere.
pub fn parse(raw_text: &str, lexicon: &Lexicon) -> ParsedCriteria {
    let text = raw_text.trim();
    if text.is_empty() {
        return ParsedCriteria::default();
    }

    let (inclusion, exclusion) = split_sections(text);
    let pats = patterns();

    let mut parsed = ParsedCriteria {
        gender: extract_gender(text, pats),
        washout_days: extract_washout(text, pats),
        therapy_lines: extract_lines(text, pats),
        ecog: extract_ecog(text, pats),
        ..ParsedCriteria::default()
    };
    (parsed.age_min, parsed.age_max) = extract_age(text, pats);

    for condition in lexicon.conditions_in(inclusion) {
        parsed.inclusion_conditions.insert(condition.to_string());
    }
    for biomarker in lexicon.biomarkers_in(inclusion) {
        parsed.required_biomarkers.insert(biomarker.to_string());
    }

    for lab in lexicon.labs() {
        for caps in lab.threshold_re.captures_iter(inclusion) {
            let Some(op) = caps.get(1).and_then(|m| comparator_from_symbol(m.as_str())) else {
                continue;
            };
            let Some(value) = caps
                .get(2)
                .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            else {
                continue;
            };
            let threshold = LabThreshold { op, value };
            parsed
                .lab_thresholds
                .entry(lab.canonical.clone())
                .and_modify(|existing| *existing = existing.most_restrictive(threshold))
                .or_insert(threshold);
            if lab.gating {
                parsed.gating_labs.insert(lab.canonical.clone());
            }
        }
    }

    for (flag, pattern) in &pats.exclusions {
        if pattern.is_match(exclusion) {
            parsed.hard_exclusions.insert(*flag);
        }
    }

    parsed
}

/// Split text into (inclusion segment, exclusion segment) on section
/// headers. Each segment ends where the other section's header begins,
/// in either listing order. Missing headers degrade: no exclusion
/// header means an empty exclusion segment; no headers at all means the
/// whole text is inclusion.
fn split_sections(text: &str) -> (&str, &str) {
    let pats = patterns();
    let inclusion_at = pats.inclusion_header.find(text);
    let exclusion_at = pats.exclusion_header.find(text);

    match (inclusion_at, exclusion_at) {
        (Some(incl), Some(excl)) if incl.start() < excl.start() => {
            (&text[incl.end()..excl.start()], &text[excl.end()..])
        }
        (Some(incl), Some(excl)) => {
            (&text[incl.end()..], &text[excl.end()..incl.start()])
        }
        (None, Some(excl)) => (&text[..excl.start()], &text[excl.end()..]),
        (Some(incl), None) => (&text[incl.end()..], ""),
        (None, None) => (text, ""),
    }
}

fn extract_age(text: &str, pats: &Patterns) -> (Option<u32>, Option<u32>) {
    let capture_u32 = |re: &Regex, group: usize| {
        re.captures(text)
            .and_then(|c| c.get(group))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };

    let mut min = capture_u32(&pats.age_min, 1);
    let mut max = capture_u32(&pats.age_max, 1);

    // Range phrasing ("aged 18 to 75 years") only fills missing bounds.
    if min.is_none() || max.is_none() {
        if let Some(caps) = pats.age_range.captures(text) {
            let lo = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
            let hi = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
            min = min.or(lo);
            max = max.or(hi);
        }
    }

    // Humans rarely live past 120; an implausible bound is a parse
    // artifact (lab value, protocol number), not a constraint.
    if min.is_some_and(|m| m > 120) {
        min = None;
    }
    if max.is_some_and(|m| m > 120) {
        max = None;
    }
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            // Trust the minimum and drop the contradictory maximum.
            max = None;
        }
    }
    (min, max)
}

fn extract_gender(text: &str, pats: &Patterns) -> Gender {
    let has_female = pats.female.is_match(text);
    let has_male = pats.male.is_match(text);
    match (has_female, has_male) {
        (true, false) => Gender::Female,
        (false, true) => Gender::Male,
        _ => Gender::All,
    }
}

/// Window scanned around a duration phrase for treatment keywords.
const WASHOUT_CONTEXT: usize = 80;

fn extract_washout(text: &str, pats: &Patterns) -> Option<u32> {
    let mut best: Option<u32> = None;
    for caps in pats.washout.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let days = if caps.get(2).is_some_and(|m| m.as_str().starts_with('w')) {
            value.saturating_mul(7)
        } else {
            value
        };

        let start = whole.start().saturating_sub(WASHOUT_CONTEXT);
        let end = (whole.end() + WASHOUT_CONTEXT).min(text.len());
        let window = clamp_to_char_boundaries(text, start, end);
        if pats.treatment_context.is_match(window) {
            // Multiple washout mentions keep the longest requirement.
            best = Some(best.map_or(days, |b| b.max(days)));
        }
    }
    best
}

/// Shrink a byte range to valid char boundaries so slicing cannot panic
/// on multi-byte text.
fn clamp_to_char_boundaries(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

fn extract_lines(text: &str, pats: &Patterns) -> LinesRange {
    let mut range = LinesRange::default();

    if let Some(caps) = pats.ordinal_line.captures(text) {
        if let Some(ordinal) = caps.get(1).map(|m| m.as_str().to_lowercase()) {
            let prior = match ordinal.as_str() {
                "first" | "1st" => 0,
                "second" | "2nd" => 1,
                "third" | "3rd" => 2,
                "fourth" | "4th" => 3,
                _ => 4,
            };
            if prior == 0 {
                range.max = Some(0);
            } else {
                range.min = Some(prior);
                range.max = Some(prior);
            }
        }
    }

    // Explicit numeric bounds override ordinal phrasing.
    if let Some(value) = pats
        .lines_max
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        range.max = Some(value);
    }
    if let Some(value) = pats
        .lines_min
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        range.min = Some(value);
    }

    range
}

fn extract_ecog(text: &str, pats: &Patterns) -> Option<EcogRange> {
    if let Some(caps) = pats.ecog_le.captures(text) {
        let max = caps.get(1)?.as_str().parse::<u8>().ok()?;
        return Some(EcogRange { min: 0, max });
    }
    if let Some(caps) = pats.ecog_range.captures(text) {
        let first = caps.get(1)?.as_str().parse::<u8>().ok()?;
        match caps.get(2).and_then(|m| m.as_str().parse::<u8>().ok()) {
            Some(second) => {
                return Some(EcogRange {
                    min: first.min(second),
                    max: first.max(second),
                })
            }
            // A lone "ECOG 2" reads as "up to 2".
            None => return Some(EcogRange { min: 0, max: first }),
        }
    }
    None
}

fn comparator_from_symbol(symbol: &str) -> Option<Comparator> {
    match symbol {
        "≤" | "<=" | "=<" => Some(Comparator::Le),
        "≥" | ">=" | "=>" => Some(Comparator::Ge),
        "<" => Some(Comparator::Lt),
        ">" => Some(Comparator::Gt),
        _ => None,
    }
}

/// All fixed patterns, compiled once per process.
struct Patterns {
    inclusion_header: Regex,
    exclusion_header: Regex,
    age_min: Regex,
    age_max: Regex,
    age_range: Regex,
    female: Regex,
    male: Regex,
    washout: Regex,
    treatment_context: Regex,
    ordinal_line: Regex,
    lines_max: Regex,
    lines_min: Regex,
    ecog_le: Regex,
    ecog_range: Regex,
    exclusions: Vec<(ExclusionFlag, Regex)>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::compile)
}

impl Patterns {
    fn compile() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static pattern");

        let exclusions = ExclusionFlag::all()
            .iter()
            .map(|flag| {
                let body = match flag {
                    ExclusionFlag::Pregnancy => r"pregnan(?:t|cy)|breast[-\s]?feeding|lactating",
                    ExclusionFlag::Hiv => r"hiv|human immunodeficiency virus",
                    ExclusionFlag::HepatitisB => r"hepatitis b|hbv",
                    ExclusionFlag::HepatitisC => r"hepatitis c|hcv",
                    ExclusionFlag::CnsMetastases => {
                        r"cns metastas[ei]s|brain metastas[ei]s|leptomeningeal"
                    }
                    ExclusionFlag::PriorMalignancy => {
                        r"prior malignanc(?:y|ies)|second(?:ary)? malignancy|other malignanc(?:y|ies)"
                    }
                    ExclusionFlag::AutoimmuneDisease => r"autoimmune",
                    ExclusionFlag::ActiveInfection => {
                        r"active infection|uncontrolled infection|systemic infection"
                    }
                };
                (*flag, re(&format!(r"(?i)\b(?:{body})\b")))
            })
            .collect();

        Self {
            inclusion_header: re(r"(?i)\binclusion\s+criteria\b:?"),
            exclusion_header: re(r"(?i)\bexclusion\s+criteria\b:?"),
            // "years"/"yrs"/"yo" anchors avoid matching lab values.
            age_min: re(
                r"(?i)(?:≥|>=|>|at least|aged?)\s*:?\s*(\d{1,3})\s*(?:years?|yrs?|y\.o\.|yo)\b",
            ),
            age_max: re(
                r"(?i)(?:≤|<=|<|up to|younger than|no older than)\s*:?\s*(\d{1,3})\s*(?:years?|yrs?|y\.o\.|yo)\b",
            ),
            age_range: re(r"(?i)\b(\d{1,3})\s*(?:-|–|to)\s*(\d{1,3})\s*(?:years?|yrs?)\b"),
            female: re(r"(?i)\b(?:women|females?)\b"),
            male: re(r"(?i)\b(?:men|males?)\b"),
            washout: re(r"(?i)\b(?:within|at least|less than|fewer than)\s+(\d{1,3})\s*(days?|weeks?)\b"),
            treatment_context: re(
                r"(?i)\b(?:chemo(?:therapy)?|radio(?:therapy)?|radiation|immunotherapy|treatment|therap(?:y|ies)|anti[-\s]?cancer|investigational\s+(?:agent|drug|product)|systemic)\b",
            ),
            ordinal_line: re(r"(?i)\b(first|second|third|fourth|fifth|1st|2nd|3rd|4th|5th)[-\s]line\b"),
            lines_max: re(
                r"(?i)(?:≤|<=|no more than|up to|at most|a maximum of)\s*:?\s*(\d{1,2})\s*(?:prior\s+)?lines?\b",
            ),
            lines_min: re(
                r"(?i)(?:≥|>=|at least|a minimum of)\s*:?\s*(\d{1,2})\s*(?:prior\s+)?lines?\b",
            ),
            ecog_le: re(r"(?i)\becog[^\n;]{0,25}?(?:≤|<=|=<)\s*(\d)\b"),
            ecog_range: re(r"(?i)\becog[^\n;]{0,25}?\b(\d)(?:\s*(?:-|–|to|or)\s*(\d))?\b"),
            exclusions,
        }
    }
}
