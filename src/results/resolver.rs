//! Final-score lookup for one fixture.
//!
//! Matching is order-sensitive. A source that only lists the fixture with
//! home and away swapped yields an ambiguous outcome; it is never corrected
//! automatically, since crediting a misattributed result cannot be undone.

use super::{
    parser::ParsedFixture,
    source::ResultSource,
};
use crate::{
    error::{EngineError, EngineResult, ResolutionError},
    models::{BetLeg, MatchOutcome, Score},
    names::TeamAliases,
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// What to look up
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureQuery {
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: Option<DateTime<Utc>>,
}

impl FixtureQuery {
    pub fn for_leg(leg: &BetLeg) -> Self {
        Self {
            competition: leg.competition.clone(),
            home_team: leg.home_team.clone(),
            away_team: leg.away_team.clone(),
            kickoff: Some(leg.match_datetime),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lookup {
    Found(Score),
    NotStarted,
    NotYetAvailable,
    Reversed,
    NoSuchMatch,
    Failed(ResolutionError),
}

pub struct ResultResolver {
    sources: Vec<Arc<dyn ResultSource>>,
    aliases: TeamAliases,
    /// Max distance between kick-off and a dated result line
    window: Duration,
}

impl ResultResolver {
    pub fn new(sources: Vec<Arc<dyn ResultSource>>, aliases: TeamAliases, window: Duration) -> Self {
        Self {
            sources,
            aliases,
            window,
        }
    }

    /// Lookup as a plain outcome record
    pub fn resolve(&self, query: &FixtureQuery, now: DateTime<Utc>) -> MatchOutcome {
        match self.lookup(query, now) {
            Lookup::Found(score) => MatchOutcome::found(score),
            Lookup::NotStarted => MatchOutcome::missing("not started"),
            Lookup::NotYetAvailable => MatchOutcome::missing("not yet available"),
            Lookup::Reversed => MatchOutcome::ambiguous("fixture listed with home/away reversed"),
            Lookup::NoSuchMatch => MatchOutcome::missing("no such match"),
            Lookup::Failed(err) => MatchOutcome::missing(err.to_string()),
        }
    }

    /// Lookup in terms of the error taxonomy. `Ok(None)` means "no result yet";
    /// reversed fixtures and source failures are errors.
    pub fn resolve_score(
        &self,
        query: &FixtureQuery,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Score>> {
        match self.lookup(query, now) {
            Lookup::Found(score) => Ok(Some(score)),
            Lookup::NotStarted | Lookup::NotYetAvailable | Lookup::NoSuchMatch => Ok(None),
            Lookup::Reversed => Err(EngineError::AmbiguousResult {
                home: query.home_team.clone(),
                away: query.away_team.clone(),
                competition: query.competition.clone(),
            }),
            Lookup::Failed(err) => Err(EngineError::Resolution(err)),
        }
    }

    fn lookup(&self, query: &FixtureQuery, now: DateTime<Utc>) -> Lookup {
        if matches!(query.kickoff, Some(kickoff) if kickoff > now) {
            return Lookup::NotStarted;
        }

        let home = self.aliases.canonical(&query.home_team);
        let away = self.aliases.canonical(&query.away_team);

        let mut scheduled = false;
        let mut reversed = false;
        let mut answered = false;
        let mut failure: Option<ResolutionError> = None;

        for source in &self.sources {
            let fixtures = match source.fixtures(&query.competition) {
                Ok(fixtures) => fixtures,
                Err(ResolutionError::NoSource) => continue,
                Err(err) => {
                    warn!(source = source.name(), competition = %query.competition, error = %err, "Result source failed");
                    failure.get_or_insert(err);
                    continue;
                }
            };
            answered = true;

            let mut best: Option<(i64, Score)> = None;
            for fixture in fixtures.iter() {
                let Some(distance) = self.date_distance(fixture, query.kickoff) else {
                    continue;
                };
                let f_home = self.aliases.canonical(&fixture.home_team);
                let f_away = self.aliases.canonical(&fixture.away_team);

                if f_home == home && f_away == away {
                    match fixture.score {
                        Some(score) if best.map_or(true, |(d, _)| distance < d) => {
                            best = Some((distance, score));
                        }
                        Some(_) => {}
                        None => scheduled = true,
                    }
                } else if f_home == away && f_away == home {
                    reversed = true;
                }
            }

            if let Some((_, score)) = best {
                return Lookup::Found(score);
            }
        }

        if scheduled {
            Lookup::NotYetAvailable
        } else if reversed {
            Lookup::Reversed
        } else if answered {
            Lookup::NoSuchMatch
        } else {
            Lookup::Failed(failure.unwrap_or(ResolutionError::NoSource))
        }
    }

    /// Seconds between fixture date and kick-off date, None when outside the
    /// window. Undated lines are accepted but rank last.
    fn date_distance(&self, fixture: &ParsedFixture, kickoff: Option<DateTime<Utc>>) -> Option<i64> {
        let (Some(date), Some(kickoff)) = (fixture.date, kickoff) else {
            return Some(i64::MAX);
        };
        let distance = (date - kickoff.date_naive()).num_days().abs() * 86_400;
        (distance <= self.window.as_secs() as i64).then_some(distance)
    }
}
