use chrono::{DateTime, SubsecRound, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const TYPE_READY: &str = "Ready";
pub const TYPE_DEGRADED: &str = "Degraded";
pub const TYPE_INVALID: &str = "Invalid";

pub const REASON_VALIDATION_SUCCESS: &str = "ValidationSuccess";
pub const REASON_VALIDATION_FAILURE: &str = "ValidationFailure";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconciliationComplete";
pub const REASON_RECONCILE_FAILURE: &str = "ReconciliationFailure";
pub const REASON_MANAGEMENT_UNMANAGED: &str = "ManagementStateUnmanaged";
pub const REASON_MISSING_RESOURCE: &str = "MissingResource";

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status: if status {
                ConditionStatus::True
            } else {
                ConditionStatus::False
            },
            reason: reason.into(),
            message: message.into(),
            // The API server stores second precision.
            last_transition_time: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Same content, ignoring the transition time.
    pub fn same_state(&self, other: &Self) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Sets `condition` in `conditions`, replacing any condition of the same type.
///
/// The existing transition time is kept when nothing else changed. Returns whether the list
/// changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.same_state(&condition) => false,
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            condition.last_transition_time = condition.last_transition_time.trunc_subsecs(0);
            conditions.push(condition);
            true
        }
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Carries transition times over from `previous` for every condition whose state is unchanged.
pub fn preserve_transition_times(previous: &[Condition], next: &mut [Condition]) {
    for condition in next.iter_mut() {
        if let Some(old) = find_condition(previous, &condition.type_) {
            if old.same_state(condition) {
                condition.last_transition_time = old.last_transition_time;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn unchanged_condition_keeps_time() {
        let mut first = Condition::new(TYPE_READY, true, REASON_VALIDATION_SUCCESS, "");
        first.last_transition_time -= Duration::hours(1);
        let stamp = first.last_transition_time;
        let mut conditions = vec![first];

        let changed = set_condition(
            &mut conditions,
            Condition::new(TYPE_READY, true, REASON_VALIDATION_SUCCESS, ""),
        );
        assert!(!changed);
        assert_eq!(conditions[0].last_transition_time, stamp);

        let changed = set_condition(
            &mut conditions,
            Condition::new(TYPE_READY, false, REASON_VALIDATION_FAILURE, "bad url"),
        );
        assert!(changed);
        assert_ne!(conditions[0].last_transition_time, stamp);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn preserve_only_matching_state() {
        let mut old = Condition::new(TYPE_READY, true, REASON_VALIDATION_SUCCESS, "");
        old.last_transition_time -= Duration::minutes(5);
        let mut degraded = Condition::new(TYPE_DEGRADED, false, REASON_VALIDATION_SUCCESS, "");
        degraded.last_transition_time -= Duration::minutes(5);
        let previous = vec![old.clone(), degraded.clone()];

        let mut next = vec![
            Condition::new(TYPE_READY, true, REASON_VALIDATION_SUCCESS, ""),
            Condition::new(TYPE_DEGRADED, true, REASON_RECONCILE_FAILURE, "boom"),
        ];
        preserve_transition_times(&previous, &mut next);
        assert_eq!(next[0].last_transition_time, old.last_transition_time);
        assert_ne!(next[1].last_transition_time, degraded.last_transition_time);
    }
}
