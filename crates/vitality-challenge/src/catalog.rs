//! Published challenge templates
//!
//! Templates are immutable once published. A new version of a challenge is
//! a new id.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vitality_core::{
    ActivityKind, Category, ChallengeId, ChallengeType, Difficulty, EntityKind, QuestError,
    Result,
};

/// Challenge template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Identifier
    pub id: ChallengeId,
    /// Display name
    pub name: String,
    /// Cadence
    pub challenge_type: ChallengeType,
    /// Difficulty
    pub difficulty: Difficulty,
    /// Category
    pub category: Category,
    /// Activity whose quantity counts toward the target
    pub activity: ActivityKind,
    /// Goal, in units of `activity`
    pub target: u64,
    /// XP paid on claim
    pub reward_xp: u64,
    /// Credits paid on claim
    pub reward_credits: u64,
    /// Start of availability; the window itself for special challenges
    pub window_start: DateTime<Utc>,
    /// End of availability (exclusive)
    pub window_end: DateTime<Utc>,
    /// Challenge the user must have claimed first
    pub prerequisite: Option<ChallengeId>,
}

impl Challenge {
    /// Create template with no reward and no prerequisite
    #[must_use]
    pub fn new(
        id: impl Into<ChallengeId>,
        challenge_type: ChallengeType,
        activity: ActivityKind,
        target: u64,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            challenge_type,
            difficulty: Difficulty::Medium,
            category: Category::Fitness,
            activity,
            target,
            reward_xp: 0,
            reward_credits: 0,
            window_start,
            window_end,
            prerequisite: None,
        }
    }

    /// With display name
    #[inline]
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// With difficulty
    #[inline]
    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// With category
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// With reward
    #[inline]
    #[must_use]
    pub fn with_reward(mut self, xp: u64, credits: u64) -> Self {
        self.reward_xp = xp;
        self.reward_credits = credits;
        self
    }

    /// With prerequisite challenge
    #[inline]
    #[must_use]
    pub fn with_prerequisite(mut self, prerequisite: impl Into<ChallengeId>) -> Self {
        self.prerequisite = Some(prerequisite.into());
        self
    }

    /// Check the template is internally consistent
    ///
    /// # Errors
    /// `QuestError::InvalidArgument` describing the first problem
    pub fn validate(&self) -> Result<()> {
        if self.target == 0 {
            return Err(QuestError::invalid_argument(format!(
                "challenge {}: target must be positive",
                self.id
            )));
        }
        if self.window_end <= self.window_start {
            return Err(QuestError::invalid_argument(format!(
                "challenge {}: window must end after it starts",
                self.id
            )));
        }
        if i64::try_from(self.reward_xp).is_err() || i64::try_from(self.reward_credits).is_err() {
            return Err(QuestError::invalid_argument(format!(
                "challenge {}: reward out of range",
                self.id
            )));
        }
        if self.prerequisite.as_ref() == Some(&self.id) {
            return Err(QuestError::invalid_argument(format!(
                "challenge {} cannot require itself",
                self.id
            )));
        }
        Ok(())
    }
}

/// Registry of published templates
#[derive(Debug, Default)]
pub struct ChallengeCatalog {
    challenges: DashMap<ChallengeId, Arc<Challenge>>,
}

impl ChallengeCatalog {
    /// Create empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a template
    ///
    /// # Errors
    /// - `QuestError::InvalidArgument` if the template is invalid or its id
    ///   is already published
    /// - `QuestError::NotFound` if the prerequisite is unknown
    pub fn publish(&self, challenge: Challenge) -> Result<Arc<Challenge>> {
        challenge.validate()?;
        if let Some(prerequisite) = &challenge.prerequisite {
            if !self.challenges.contains_key(prerequisite) {
                return Err(QuestError::not_found(EntityKind::Challenge, prerequisite));
            }
        }

        match self.challenges.entry(challenge.id.clone()) {
            Entry::Occupied(_) => Err(QuestError::invalid_argument(format!(
                "challenge {} is already published",
                challenge.id
            ))),
            Entry::Vacant(slot) => {
                let challenge = Arc::new(challenge);
                slot.insert(Arc::clone(&challenge));
                tracing::info!(
                    challenge = %challenge.id,
                    activity = %challenge.activity,
                    target = challenge.target,
                    "challenge published"
                );
                Ok(challenge)
            }
        }
    }

    /// Look up a template
    ///
    /// # Errors
    /// `QuestError::NotFound` for an unknown id
    pub fn get(&self, id: &ChallengeId) -> Result<Arc<Challenge>> {
        self.challenges
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QuestError::not_found(EntityKind::Challenge, id))
    }

    /// Templates counting `activity`, ordered by id
    #[must_use]
    pub fn for_activity(&self, activity: &ActivityKind) -> Vec<Arc<Challenge>> {
        self.collect(|challenge| &challenge.activity == activity)
    }

    /// Templates requiring `prerequisite`, ordered by id
    #[must_use]
    pub fn dependents(&self, prerequisite: &ChallengeId) -> Vec<Arc<Challenge>> {
        self.collect(|challenge| challenge.prerequisite.as_ref() == Some(prerequisite))
    }

    /// Every template, ordered by id
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Challenge>> {
        self.collect(|_| true)
    }

    /// Number of templates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    /// Whether nothing is published
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    fn collect(&self, keep: impl Fn(&Challenge) -> bool) -> Vec<Arc<Challenge>> {
        let mut found: Vec<_> = self
            .challenges
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn steps(id: &str) -> Challenge {
        Challenge::new(
            id,
            ChallengeType::Daily,
            ActivityKind::Steps,
            10_000,
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
        )
        .with_reward(50, 5)
    }

    #[test]
    fn publish_and_get() {
        let catalog = ChallengeCatalog::new();
        catalog.publish(steps("walk")).unwrap();

        let walk = catalog.get(&ChallengeId::from("walk")).unwrap();
        assert_eq!(walk.reward_xp, 50);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let catalog = ChallengeCatalog::new();
        catalog.publish(steps("walk")).unwrap();

        let err = catalog.publish(steps("walk").with_reward(1_000, 0)).unwrap_err();
        assert!(matches!(err, QuestError::InvalidArgument(_)));
        assert_eq!(catalog.get(&ChallengeId::from("walk")).unwrap().reward_xp, 50);
    }

    #[test]
    fn invalid_templates_are_rejected() {
        let catalog = ChallengeCatalog::new();
        let mut zero = steps("zero");
        zero.target = 0;
        assert!(catalog.publish(zero).is_err());

        let mut inverted = steps("inverted");
        inverted.window_end = inverted.window_start;
        assert!(catalog.publish(inverted).is_err());

        assert!(catalog.publish(steps("self").with_prerequisite("self")).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn prerequisite_must_exist() {
        let catalog = ChallengeCatalog::new();
        let err = catalog
            .publish(steps("advanced").with_prerequisite("basic"))
            .unwrap_err();
        assert!(matches!(err, QuestError::NotFound { .. }));

        catalog.publish(steps("basic")).unwrap();
        catalog
            .publish(steps("advanced").with_prerequisite("basic"))
            .unwrap();

        let dependents = catalog.dependents(&ChallengeId::from("basic"));
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].id, ChallengeId::from("advanced"));
    }

    #[test]
    fn lookup_by_activity() {
        let catalog = ChallengeCatalog::new();
        catalog.publish(steps("b")).unwrap();
        catalog.publish(steps("a")).unwrap();
        let mut water = steps("water");
        water.activity = ActivityKind::WaterGlasses;
        catalog.publish(water).unwrap();

        let ids: Vec<_> = catalog
            .for_activity(&ActivityKind::Steps)
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
