// SPDX-FileCopyrightText: 2026 Gavel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static operation type to lane table.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use gavel_config::model::ClassifierConfig;
use gavel_core::Lane;
use gavel_core::ops::*;

use crate::normalizer::type_name;

/// Immediate actions over the live connection.
const REALTIME: &[&str] = &[
    SEND_MESSAGE,
    EDIT_MESSAGE,
    DELETE_MESSAGE,
    PIN_MESSAGE,
    UNPIN_MESSAGE,
    ADD_REACTION,
    REMOVE_REACTION,
];

/// Long-running or rate-limited work that always goes through the queue.
const DURABLE: &[&str] = &[
    BULK_BAN,
    BULK_KICK,
    BULK_TIMEOUT,
    BULK_DELETE_MESSAGES,
    PRUNE_MEMBERS,
    SYNC_ROLES,
    SEND_ANNOUNCEMENT,
];

/// Try live first, fall back to the queue.
const HYBRID: &[&str] = &[
    BAN_USER,
    UNBAN_USER,
    KICK_USER,
    TIMEOUT_USER,
    UNTIMEOUT_USER,
    ADD_ROLE,
    REMOVE_ROLE,
    CREATE_CHANNEL,
    UPDATE_CHANNEL,
    DELETE_CHANNEL,
    LOCK_CHANNEL,
    UNLOCK_CHANNEL,
    SET_SLOWMODE,
];

/// The three lane lists, sorted, for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaneTable {
    pub realtime: Vec<String>,
    pub durable: Vec<String>,
    pub hybrid: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OperationClassifier {
    lanes: HashMap<String, Lane>,
}

impl Default for OperationClassifier {
    fn default() -> Self {
        Self::from_config(&ClassifierConfig::default())
    }
}

impl OperationClassifier {
    /// Built-in table extended by configured types. Configured entries win
    /// over built-in ones, so a deployment can move a type to another lane.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let mut lanes = HashMap::new();
        let builtin = [
            (Lane::Realtime, REALTIME),
            (Lane::Durable, DURABLE),
            (Lane::Hybrid, HYBRID),
        ];
        for (lane, types) in builtin {
            for op_type in types {
                lanes.insert((*op_type).to_string(), lane);
            }
        }
        let extra = [
            (Lane::Realtime, &config.realtime),
            (Lane::Durable, &config.durable),
            (Lane::Hybrid, &config.hybrid),
        ];
        for (lane, types) in extra {
            for op_type in types {
                lanes.insert(type_name(op_type), lane);
            }
        }
        Self { lanes }
    }

    /// Lane for `op_type`. Unknown types are durable.
    pub fn classify(&self, op_type: &str) -> Lane {
        match self.lanes.get(op_type) {
            Some(lane) => *lane,
            None => {
                warn!(op_type, "unknown operation type, defaulting to durable lane");
                Lane::Durable
            }
        }
    }

    pub fn is_known(&self, op_type: &str) -> bool {
        self.lanes.contains_key(op_type)
    }

    pub fn lanes(&self) -> LaneTable {
        let mut table = LaneTable {
            realtime: Vec::new(),
            durable: Vec::new(),
            hybrid: Vec::new(),
        };
        for (op_type, lane) in &self.lanes {
            let list = match lane {
                Lane::Realtime => &mut table.realtime,
                Lane::Durable => &mut table.durable,
                Lane::Hybrid => &mut table.hybrid,
            };
            list.push(op_type.clone());
        }
        table.realtime.sort();
        table.durable.sort();
        table.hybrid.sort();
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn builtin_lanes() {
        let classifier = OperationClassifier::default();
        assert_eq!(classifier.classify(SEND_MESSAGE), Lane::Realtime);
        assert_eq!(classifier.classify(BULK_BAN), Lane::Durable);
        assert_eq!(classifier.classify(BAN_USER), Lane::Hybrid);
    }

    #[test]
    #[traced_test]
    fn unknown_type_is_durable_with_warning() {
        let classifier = OperationClassifier::default();
        assert!(!classifier.is_known("WARN_USER"));
        assert_eq!(classifier.classify("WARN_USER"), Lane::Durable);
        assert!(logs_contain("unknown operation type"));
    }

    #[test]
    fn configured_types_extend_and_override() {
        let config = ClassifierConfig {
            realtime: vec!["warn_user".into()],
            durable: vec![SEND_MESSAGE.into()],
            hybrid: vec![],
        };
        let classifier = OperationClassifier::from_config(&config);
        assert_eq!(classifier.classify("WARN_USER"), Lane::Realtime);
        assert_eq!(classifier.classify(SEND_MESSAGE), Lane::Durable);
    }

    #[test]
    fn configured_types_use_the_submission_spelling() {
        let config = ClassifierConfig {
            realtime: vec![" warn-user ".into()],
            durable: vec![],
            hybrid: vec!["Mute-Voice".into()],
        };
        let classifier = OperationClassifier::from_config(&config);
        assert_eq!(classifier.classify(&type_name("warn-user")), Lane::Realtime);
        assert_eq!(classifier.classify("WARN_USER"), Lane::Realtime);
        assert_eq!(classifier.classify(&type_name("mute_voice")), Lane::Hybrid);
        assert!(!classifier.is_known("WARN-USER"));
    }

    #[test]
    fn lane_lists_are_disjoint_and_sorted() {
        let table = OperationClassifier::default().lanes();
        let total = table.realtime.len() + table.durable.len() + table.hybrid.len();
        assert_eq!(total, REALTIME.len() + DURABLE.len() + HYBRID.len());

        let mut sorted = table.hybrid.clone();
        sorted.sort();
        assert_eq!(table.hybrid, sorted);
        assert!(table.durable.contains(&PRUNE_MEMBERS.to_string()));
    }
}
