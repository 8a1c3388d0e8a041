//! Index catalogue shared by every document store.
//!
//! Both stores create exactly the indexes listed in [`REQUIRED_INDEXES`] and
//! drop every name in [`LEGACY_INDEXES`] first, because a store may reject a
//! second index over the same key pattern under a different name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted entity collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    /// Workflow instances
    Workflows,
    /// Events
    Events,
    /// Event subscriptions
    Subscriptions,
    /// Scheduled commands
    ScheduledCommands,
    /// Execution errors
    ExecutionErrors,
    /// Workflow definitions
    Definitions,
    /// Versioned resources
    Resources,
}

impl Collection {
    /// Every collection, in creation order
    pub const ALL: [Collection; 7] = [
        Collection::Workflows,
        Collection::Events,
        Collection::Subscriptions,
        Collection::ScheduledCommands,
        Collection::ExecutionErrors,
        Collection::Definitions,
        Collection::Resources,
    ];

    /// Storage name
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Workflows => "workflows",
            Collection::Events => "events",
            Collection::Subscriptions => "subscriptions",
            Collection::ScheduledCommands => "scheduled_commands",
            Collection::ExecutionErrors => "execution_errors",
            Collection::Definitions => "definitions",
            Collection::Resources => "resources",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An index every store must carry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    /// Indexed collection
    pub collection: Collection,
    /// Index name
    pub name: &'static str,
    /// Ascending key fields, in order
    pub keys: &'static [&'static str],
    /// Unique constraint
    pub unique: bool,
}

/// An index name from an earlier layout that must be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyIndex {
    /// Collection that carried it
    pub collection: Collection,
    /// Old name
    pub name: &'static str,
}

/// Indexes ensured at startup
pub const REQUIRED_INDEXES: &[IndexSpec] = &[
    IndexSpec {
        collection: Collection::Workflows,
        name: "idx_next_exec",
        keys: &["next_execution"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::Events,
        name: "idx_event_namekey",
        keys: &["event_name", "event_key", "event_time"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::Events,
        name: "idx_event_processed",
        keys: &["is_processed"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::Subscriptions,
        name: "idx_sub_namekey",
        keys: &["event_name", "event_key"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::ScheduledCommands,
        name: "idx_cmd_exectime",
        keys: &["execute_time"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::Definitions,
        name: "unq_definition_id_version",
        keys: &["definition_id", "version"],
        unique: true,
    },
    IndexSpec {
        collection: Collection::Definitions,
        name: "idx_definition_id",
        keys: &["definition_id"],
        unique: false,
    },
    IndexSpec {
        collection: Collection::Resources,
        name: "unq_resource_bucket_name_version",
        keys: &["bucket", "name", "version"],
        unique: true,
    },
];

/// Names dropped before the required indexes are created
pub const LEGACY_INDEXES: &[LegacyIndex] = &[
    LegacyIndex {
        collection: Collection::Events,
        name: "idx_namekey",
    },
    LegacyIndex {
        collection: Collection::Events,
        name: "idx_processed",
    },
    LegacyIndex {
        collection: Collection::Subscriptions,
        name: "idx_namekey",
    },
];

/// An index as reported by a store
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// Collection name
    pub collection: String,
    /// Index name
    pub name: String,
    /// Ascending key fields, in order
    pub keys: Vec<String>,
    /// Unique constraint
    pub unique: bool,
}

impl From<&IndexSpec> for IndexDescriptor {
    fn from(spec: &IndexSpec) -> Self {
        Self {
            collection: spec.collection.name().to_string(),
            name: spec.name.to_string(),
            keys: spec.keys.iter().map(|key| key.to_string()).collect(),
            unique: spec.unique,
        }
    }
}

/// The catalogue as descriptors, sorted the way stores report them
pub fn expected_indexes() -> Vec<IndexDescriptor> {
    let mut expected: Vec<IndexDescriptor> = REQUIRED_INDEXES.iter().map(IndexDescriptor::from).collect();
    expected.sort();
    expected
}

/// Required indexes for one collection
pub fn required_for(collection: Collection) -> impl Iterator<Item = &'static IndexSpec> {
    REQUIRED_INDEXES
        .iter()
        .filter(move |spec| spec.collection == collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn required_names_are_unique() {
        let names: HashSet<_> = REQUIRED_INDEXES.iter().map(|spec| spec.name).collect();
        assert_eq!(names.len(), REQUIRED_INDEXES.len());
    }

    #[test]
    fn legacy_names_never_collide_with_required_ones() {
        for legacy in LEGACY_INDEXES {
            assert!(REQUIRED_INDEXES.iter().all(|spec| spec.name != legacy.name));
        }
    }

    #[test]
    fn key_patterns_are_distinct_per_collection() {
        for collection in Collection::ALL {
            let patterns: Vec<_> = required_for(collection).map(|spec| spec.keys).collect();
            let distinct: HashSet<_> = patterns.iter().collect();
            assert_eq!(patterns.len(), distinct.len(), "duplicate pattern on {}", collection);
        }
    }

    #[test]
    fn expected_indexes_cover_the_catalogue() {
        let expected = expected_indexes();
        assert_eq!(expected.len(), REQUIRED_INDEXES.len());
        assert!(expected
            .iter()
            .any(|idx| idx.name == "unq_definition_id_version" && idx.unique));
    }
}
