//! Rule-based query analysis: countries, phases, survey rounds and years.
//!
//! Every pattern is anchored on word boundaries, so "Mali" is never found
//! inside "Somalia" and "p2" is never found inside "sp2x".

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use surveydb_core::types::{QueryEntities, SurveyType};

const COUNTRIES: &[&str] = &[
    "Bangladesh", "Cambodia", "Ethiopia", "Ghana", "Guatemala", "Haiti", "Honduras", "Kenya", "Liberia", "Malawi",
    "Mali", "Mozambique", "Nepal", "Nigeria", "Rwanda", "Senegal", "Tajikistan", "Tanzania", "Uganda", "Zambia",
];

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("tajik", "Tajikistan"),
    ("guatemalan", "Guatemala"),
    ("tanzanian", "Tanzania"),
    ("ugandan", "Uganda"),
    ("kenyan", "Kenya"),
    ("malawian", "Malawi"),
    ("zambian", "Zambia"),
    ("ghanaian", "Ghana"),
    ("liberian", "Liberia"),
    ("haitian", "Haiti"),
    ("honduran", "Honduras"),
    ("nepali", "Nepal"),
    ("nepalese", "Nepal"),
    ("rwandan", "Rwanda"),
    ("senegalese", "Senegal"),
    ("nigerian", "Nigeria"),
    ("malian", "Mali"),
    ("mozambican", "Mozambique"),
    ("ethiopian", "Ethiopia"),
    ("cambodian", "Cambodia"),
    ("bangladeshi", "Bangladesh"),
];

/// Lowercase surface form -> canonical country.
static COUNTRY_LOOKUP: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    let mut map: HashMap<String, &'static str> = COUNTRIES.iter().map(|c| (c.to_lowercase(), *c)).collect();
    map.extend(COUNTRY_ALIASES.iter().map(|(alias, c)| (alias.to_string(), *c)));
    map
});

static COUNTRY_RE: Lazy<Regex> = Lazy::new(|| {
    let mut names: Vec<&String> = COUNTRY_LOOKUP.keys().collect();
    // longest first so an alias never shadows a longer name at the same position
    names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
    compile(&format!(r"(?i)\b(?:{alternation})\b"))
});

static PHASE_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bphase\s*[-#]?\s*(iv|iii|ii|i|one|two|three|four|[1-4])\b"));

static PHASE_SHORT_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bp([1-4])\b"));

static SURVEY_TYPE_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\b(base|mid|end)[\s-]?lines?\b|\binterim\b"));

static YEAR_RE: Lazy<Regex> = Lazy::new(|| compile(r"\b(?:19|20)\d{2}\b"));

/// Two full years joined by a range connector: `2012-2015`, `2012 to 2015`,
/// `from 2012 through 2015`.
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b((?:19|20)\d{2})\s*(?:-|–|to|through|thru|until|till)\s*((?:19|20)\d{2})\b")
});

static BETWEEN_RE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bbetween\s+((?:19|20)\d{2})\s+and\s+((?:19|20)\d{2})\b"));

/// Abbreviated range end: `2012-15`, `2012/13`.
static SHORT_RANGE_RE: Lazy<Regex> = Lazy::new(|| compile(r"\b((?:19|20)\d{2})\s*[-–/]\s*(\d{2})\b"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in pattern compiles")
}

fn phase_number(token: &str) -> Option<u32> {
    match token.to_ascii_lowercase().as_str() {
        "1" | "i" | "one" => Some(1),
        "2" | "ii" | "two" => Some(2),
        "3" | "iii" | "three" => Some(3),
        "4" | "iv" | "four" => Some(4),
        _ => None,
    }
}

fn survey_type(matched: &str) -> Option<SurveyType> {
    let lower = matched.to_ascii_lowercase();
    if lower == "interim" {
        return Some(SurveyType::Interim);
    }
    match lower.get(..3)? {
        "bas" => Some(SurveyType::Baseline),
        "mid" => Some(SurveyType::Midline),
        "end" => Some(SurveyType::Endline),
        _ => None,
    }
}

/// Expand a two-digit range end (`2012-15`) against its start year.
fn short_range_end(start: i32, end: &str) -> Option<i32> {
    let full = start - start % 100 + end.parse::<i32>().ok()?;
    (full > start).then_some(full)
}

fn parse_year(caps: &regex::Captures<'_>, group: usize) -> Option<i32> {
    caps.get(group)?.as_str().parse().ok()
}

/// Years mentioned in the query as one inclusive span.
///
/// The first pair of years joined by a range connector ("2012-2015",
/// "2012 to 2015", "between 2012 and 2015", "2012-15") gives that range.
/// Without a connector the first year mentioned gives `(y, y)`, so
/// "2012 versus 2018" never admits the years in between.
fn year_range(query: &str) -> Option<(i32, i32)> {
    let full = RANGE_RE.captures_iter(query).chain(BETWEEN_RE.captures_iter(query)).filter_map(|caps| {
        let start = caps.get(0)?.start();
        Some((start, parse_year(&caps, 1)?, parse_year(&caps, 2)?))
    });
    let short = SHORT_RANGE_RE.captures_iter(query).filter_map(|caps| {
        let start = caps.get(0)?.start();
        let from = parse_year(&caps, 1)?;
        Some((start, from, short_range_end(from, caps.get(2)?.as_str())?))
    });
    if let Some((_, a, b)) = full.chain(short).min_by_key(|(start, _, _)| *start) {
        return Some((a.min(b), a.max(b)));
    }
    let year = YEAR_RE.find(query)?.as_str().parse().ok()?;
    Some((year, year))
}

/// Extract structured entities from free text. Never fails: anything not
/// recognized simply leaves that kind unconstrained.
pub fn analyze(query: &str) -> QueryEntities {
    let mut entities = QueryEntities::default();

    for m in COUNTRY_RE.find_iter(query) {
        if let Some(country) = COUNTRY_LOOKUP.get(&m.as_str().to_lowercase()) {
            entities.countries.insert((*country).to_string());
        }
    }

    for caps in PHASE_RE.captures_iter(query).chain(PHASE_SHORT_RE.captures_iter(query)) {
        if let Some(phase) = caps.get(1).and_then(|m| phase_number(m.as_str())) {
            entities.phases.insert(phase);
        }
    }

    for m in SURVEY_TYPE_RE.find_iter(query) {
        if let Some(t) = survey_type(m.as_str()) {
            entities.survey_types.insert(t);
        }
    }

    entities.year_range = year_range(query);
    entities
}
