//! Flat-text result parser.
//!
//! Accepts the loose "football.txt" style files that result scrapers emit:
//!
//! ```text
//! = Premier League 2024/25
//! [Sat Aug 17 2024]
//!   15.00  Arsenal            2-0 (1-0)  Wolverhampton Wanderers
//!   17.30  Everton            0-3        Brighton & Hove Albion
//! 2024-08-18 Chelsea 0-2 Manchester City
//! 2024-08-24  Fulham  v  Leicester City
//! ```
//!
//! Date headers apply to following lines until the next header. A fixture
//! without a score (`v`, `vs`, `-` between the names) is scheduled, not
//! finished. Lines that match nothing are skipped.

use crate::models::Score;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref DATE_PREFIX_RE: Regex =
        Regex::new(r"^\[?(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})\]?\s*(.*)$").expect("static regex");
    static ref WORD_DATE_RE: Regex =
        Regex::new(r"^\[?(?:[A-Za-z]{3}\s+)?([A-Za-z]{3})[\s/]+(\d{1,2}),?\s+(\d{4})\]?$")
            .expect("static regex");
    static ref TIME_PREFIX_RE: Regex = Regex::new(r"^\d{1,2}[.:]\d{2}\s+").expect("static regex");
    static ref RESULT_RE: Regex = Regex::new(
        r"^(?P<home>.+?)\s+(?P<hg>\d{1,2})\s*[-:]\s*(?P<ag>\d{1,2})(?:\s*\((?P<hth>\d{1,2})\s*[-:]\s*(?P<hta>\d{1,2})\))?\s+(?P<away>.+?)$"
    )
    .expect("static regex");
    static ref RESULT_AFTER_NAMES_RE: Regex = Regex::new(
        r"(?i)^(?P<home>.+?)\s+(?:vs?\.?|-)\s+(?P<away>.+?)\s+(?P<hg>\d{1,2})\s*[-:]\s*(?P<ag>\d{1,2})(?:\s*\((?P<hth>\d{1,2})\s*[-:]\s*(?P<hta>\d{1,2})\))?$"
    )
    .expect("static regex");
    static ref SCHEDULED_RE: Regex =
        Regex::new(r"(?i)^(?P<home>.+?)\s+(?:vs?\.?|-)\s+(?P<away>.+?)$").expect("static regex");
}

/// One fixture line from a result file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFixture {
    pub date: Option<NaiveDate>,
    pub home_team: String,
    pub away_team: String,
    /// Full-time score; None while the match is only scheduled
    pub score: Option<Score>,
    pub half_time: Option<Score>,
}

/// Parse a whole file body
pub fn parse_results_text(raw: &str) -> Vec<ParsedFixture> {
    parse_results(raw.lines())
}

/// Parse result lines into fixtures, carrying date headers forward
pub fn parse_results<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<ParsedFixture> {
    let mut current_date: Option<NaiveDate> = None;
    let mut out = Vec::new();

    for raw in lines {
        let line = strip_annotations(raw);
        if line.is_empty() || line.starts_with('=') || line.starts_with('#') {
            continue;
        }

        if let Some(date) = parse_word_date(line) {
            current_date = Some(date);
            continue;
        }

        let mut body = line;
        if let Some(caps) = DATE_PREFIX_RE.captures(line) {
            if let Some(date) = parse_numeric_date(&caps[1]) {
                current_date = Some(date);
                body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            }
        }
        if body.trim().is_empty() {
            continue;
        }

        if let Some(fixture) = parse_fixture(body, current_date) {
            out.push(fixture);
        }
    }

    out
}

/// Drop comments and venue notes (`# ...`, `@ Stadium`)
fn strip_annotations(raw: &str) -> &str {
    let line = raw.trim();
    let line = match line.find(" @ ") {
        Some(idx) => &line[..idx],
        None => line,
    };
    match line.find(" #") {
        Some(idx) => line[..idx].trim(),
        None => line.trim(),
    }
}

fn parse_numeric_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

fn parse_word_date(line: &str) -> Option<NaiveDate> {
    let caps = WORD_DATE_RE.captures(line)?;
    let joined = format!("{} {} {}", &caps[1], &caps[2], &caps[3]);
    NaiveDate::parse_from_str(&joined, "%b %d %Y").ok()
}

fn parse_fixture(body: &str, date: Option<NaiveDate>) -> Option<ParsedFixture> {
    let body = TIME_PREFIX_RE.replace(body.trim(), "");
    let body = body.trim();

    if let Some(caps) = RESULT_AFTER_NAMES_RE.captures(body) {
        return finished(&caps, date);
    }
    if let Some(caps) = RESULT_RE.captures(body) {
        return finished(&caps, date);
    }
    if let Some(caps) = SCHEDULED_RE.captures(body) {
        let (home, away) = team_names(&caps)?;
        return Some(ParsedFixture {
            date,
            home_team: home,
            away_team: away,
            score: None,
            half_time: None,
        });
    }
    None
}

fn finished(caps: &Captures<'_>, date: Option<NaiveDate>) -> Option<ParsedFixture> {
    let (home, away) = team_names(caps)?;
    let score = Score::new(caps["hg"].parse().ok()?, caps["ag"].parse().ok()?);
    let half_time = match (caps.name("hth"), caps.name("hta")) {
        (Some(h), Some(a)) => Some(Score::new(h.as_str().parse().ok()?, a.as_str().parse().ok()?)),
        _ => None,
    };
    Some(ParsedFixture {
        date,
        home_team: home,
        away_team: away,
        score: Some(score),
        half_time,
    })
}

fn team_names(caps: &Captures<'_>) -> Option<(String, String)> {
    let home = caps["home"].trim();
    let away = caps["away"].trim();
    if home.is_empty() || away.is_empty() || !home.chars().any(char::is_alphabetic) {
        return None;
    }
    if !away.chars().any(char::is_alphabetic) {
        return None;
    }
    Some((home.to_string(), away.to_string()))
}
