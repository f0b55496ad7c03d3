//! Who belongs where
//!
//! The roster maps users to departments and teams. Ranking reads a sorted
//! copy, never the live map.

use dashmap::DashMap;
use std::collections::BTreeSet;
use vitality_core::{DepartmentId, LeaderboardScope, TeamId, UserId, UserProfile};

/// Registered user profiles
#[derive(Debug, Default)]
pub struct Roster {
    profiles: DashMap<UserId, UserProfile>,
}

impl Roster {
    /// Create empty roster
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile
    ///
    /// Returns the replaced profile, if any.
    pub fn register(&self, profile: UserProfile) -> Option<UserProfile> {
        self.profiles.insert(profile.id.clone(), profile)
    }

    /// Profile of a user
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<UserProfile> {
        self.profiles.get(user_id).map(|entry| entry.value().clone())
    }

    /// Whether a user is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.profiles.contains_key(user_id)
    }

    /// Number of registered users
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether nobody is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Sorted copy of every profile
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserProfile> {
        let mut profiles: Vec<_> = self
            .profiles
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }
}

/// Whether `profile` is ranked individually in `scope`
#[must_use]
pub fn in_scope(profile: &UserProfile, scope: &LeaderboardScope) -> bool {
    match scope {
        LeaderboardScope::Users => true,
        LeaderboardScope::Department(id) => profile.department.as_ref() == Some(id),
        LeaderboardScope::Team(id) => profile.team.as_ref() == Some(id),
        LeaderboardScope::Departments | LeaderboardScope::Teams => false,
    }
}

/// Departments with at least one member
#[must_use]
pub fn departments(profiles: &[UserProfile]) -> BTreeSet<DepartmentId> {
    profiles
        .iter()
        .filter_map(|profile| profile.department.clone())
        .collect()
}

/// Teams with at least one member
#[must_use]
pub fn teams(profiles: &[UserProfile]) -> BTreeSet<TeamId> {
    profiles.iter().filter_map(|profile| profile.team.clone()).collect()
}
