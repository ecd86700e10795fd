//! Logical collection names shared by the coordinator, read view, dispatch
//! tracker and snapshot store (spec.md §4.C, §6 "Collection/table names").

pub const AGGREGATES: &str = "aggregates";
pub const INSTANCES: &str = "aggregates_model";
pub const COMMITS: &str = "aggregates_model_event_commits";
pub const COMMIT_HEADERS: &str = "aggregates_model_event_commit_header";
pub const DISPATCH: &str = "aggregates_model_event_dispatch";
pub const SNAPSHOTS: &str = "aggregates_model_snapshots";
