//! Deterministic ranking
//!
//! Ranking is a pure function of a [`LedgerView`], a roster copy and the
//! window. Given the same inputs it always yields the same order:
//! - score descending;
//! - then the configured [`TieBreak`];
//! - then ascending entity id, so ranks are unique and sequential.

use crate::metric::{metric_for, ScoreMetric};
use crate::roster::{departments, in_scope, teams};
use crate::snapshot::{LeaderboardEntry, LeaderboardSnapshot};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use vitality_core::{
    local_midnight, start_of_month, start_of_next_month, start_of_week, Aggregation,
    LeaderboardConfig, LeaderboardScope, Period, RankedEntity, TieBreak, UserId, UserProfile,
    WeekStart,
};
use vitality_ledger::LedgerView;

/// A period resolved against a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    /// Period kind
    pub period: Period,
    /// Inclusive start; `None` for all time
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl PeriodWindow {
    /// Resolve `period` to the window containing `now`
    #[must_use]
    pub fn resolve(
        period: Period,
        now: DateTime<Utc>,
        offset: FixedOffset,
        week_start: WeekStart,
    ) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        let (start, end) = match period {
            Period::Daily => (today, today + Duration::days(1)),
            Period::Weekly => {
                let first = start_of_week(today, week_start);
                (first, first + Duration::days(7))
            }
            Period::Monthly => (start_of_month(today), start_of_next_month(today)),
            Period::AllTime => {
                return Self {
                    period,
                    start: None,
                    end: DateTime::<Utc>::MAX_UTC,
                }
            }
        };
        Self {
            period,
            start: Some(local_midnight(start, offset)),
            end: local_midnight(end, offset),
        }
    }

    /// Whether `at` falls inside
    #[inline]
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| start <= at) && at < self.end
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    score: u64,
    reached_at: Option<DateTime<Utc>>,
}

impl Tally {
    fn add(&mut self, points: u64, at: DateTime<Utc>) {
        self.score = self.score.saturating_add(points);
        self.reached_at = self.reached_at.max(Some(at));
    }
}

#[derive(Debug)]
struct Row {
    entity: RankedEntity,
    tally: Tally,
}

/// Ranks participants by a score metric
#[derive(Debug, Clone)]
pub struct Ranker {
    metric: Arc<dyn ScoreMetric>,
    aggregation: Aggregation,
    tie_break: TieBreak,
}

impl Ranker {
    /// Create ranker
    #[must_use]
    pub fn new(metric: Arc<dyn ScoreMetric>, aggregation: Aggregation, tie_break: TieBreak) -> Self {
        Self {
            metric,
            aggregation,
            tie_break,
        }
    }

    /// Create ranker from configuration
    #[must_use]
    pub fn from_config(config: &LeaderboardConfig) -> Self {
        Self::new(metric_for(config.metric), config.aggregation, config.tie_break)
    }

    /// Metric in use
    #[inline]
    #[must_use]
    pub fn metric(&self) -> &dyn ScoreMetric {
        self.metric.as_ref()
    }

    /// Rank `scope` over `window`
    ///
    /// `profiles` is the roster copy; `previous` is the baseline for rank
    /// deltas.
    #[must_use]
    pub fn rank(
        &self,
        view: &LedgerView,
        profiles: &[UserProfile],
        scope: &LeaderboardScope,
        window: PeriodWindow,
        generated_at: DateTime<Utc>,
        previous: Option<&LeaderboardSnapshot>,
    ) -> LeaderboardSnapshot {
        let tallies = self.tally(view, window);
        let mut rows = self.rows(&tallies, profiles, scope);
        rows.sort_by(|a, b| self.order(a, b));

        let entries = rows
            .into_iter()
            .zip(1u32..)
            .map(|(row, rank)| {
                let rank_delta = previous
                    .and_then(|snapshot| snapshot.rank_of(&row.entity))
                    .map_or(0, |before| i64::from(before) - i64::from(rank));
                LeaderboardEntry {
                    entity: row.entity,
                    score: row.tally.score,
                    rank,
                    rank_delta,
                    reached_at: row.tally.reached_at,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            scope = %scope,
            period = %window.period,
            ledger_version = view.version(),
            entries = entries.len(),
            "leaderboard ranked"
        );

        LeaderboardSnapshot {
            scope: scope.clone(),
            period: window.period,
            window_start: window.start,
            window_end: window.end,
            generated_at,
            ledger_version: view.version(),
            metric: self.metric.name().to_string(),
            entries,
        }
    }

    fn tally(&self, view: &LedgerView, window: PeriodWindow) -> BTreeMap<UserId, Tally> {
        let mut tallies: BTreeMap<UserId, Tally> = BTreeMap::new();
        for tx in view.iter().filter(|tx| window.contains(tx.timestamp)) {
            let points = self.metric.score(tx);
            if points > 0 {
                tallies
                    .entry(tx.user_id.clone())
                    .or_default()
                    .add(points, tx.timestamp);
            }
        }
        tallies
    }

    fn rows(
        &self,
        tallies: &BTreeMap<UserId, Tally>,
        profiles: &[UserProfile],
        scope: &LeaderboardScope,
    ) -> Vec<Row> {
        let tally_of = |id: &UserId| tallies.get(id).copied().unwrap_or_default();

        match scope {
            LeaderboardScope::Users => {
                let mut users: BTreeMap<&UserId, Tally> =
                    tallies.iter().map(|(id, tally)| (id, *tally)).collect();
                for profile in profiles {
                    users.entry(&profile.id).or_default();
                }
                users
                    .into_iter()
                    .map(|(id, tally)| Row {
                        entity: RankedEntity::User(id.clone()),
                        tally,
                    })
                    .collect()
            }
            LeaderboardScope::Department(_) | LeaderboardScope::Team(_) => profiles
                .iter()
                .filter(|profile| in_scope(profile, scope))
                .map(|profile| Row {
                    entity: RankedEntity::User(profile.id.clone()),
                    tally: tally_of(&profile.id),
                })
                .collect(),
            LeaderboardScope::Departments => departments(profiles)
                .into_iter()
                .map(|department| {
                    let members = profiles
                        .iter()
                        .filter(|p| p.department.as_ref() == Some(&department))
                        .map(|p| tally_of(&p.id));
                    Row {
                        tally: self.aggregate(members),
                        entity: RankedEntity::Department(department),
                    }
                })
                .collect(),
            LeaderboardScope::Teams => teams(profiles)
                .into_iter()
                .map(|team| {
                    let members = profiles
                        .iter()
                        .filter(|p| p.team.as_ref() == Some(&team))
                        .map(|p| tally_of(&p.id));
                    Row {
                        tally: self.aggregate(members),
                        entity: RankedEntity::Team(team),
                    }
                })
                .collect(),
        }
    }

    fn aggregate(&self, members: impl Iterator<Item = Tally>) -> Tally {
        let mut total = Tally::default();
        let mut count = 0u64;
        for member in members {
            total.score = total.score.saturating_add(member.score);
            total.reached_at = total.reached_at.max(member.reached_at);
            count += 1;
        }
        if self.aggregation == Aggregation::Mean && count > 0 {
            total.score /= count;
        }
        total
    }

    fn order(&self, a: &Row, b: &Row) -> Ordering {
        b.tally
            .score
            .cmp(&a.tally.score)
            .then_with(|| match self.tie_break {
                TieBreak::EntityId => Ordering::Equal,
                TieBreak::EarliestReached => earliest_first(a.tally.reached_at, b.tally.reached_at),
            })
            .then_with(|| a.entity.cmp(&b.entity))
    }
}

impl Default for Ranker {
    fn default() -> Self {
        Self::from_config(&LeaderboardConfig::default())
    }
}

/// Earlier instants first, unreached last
fn earliest_first(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
