mod helpers;

use helpers::{event_at, test_memory};
use serde_json::Map;
use tempfile::TempDir;
use vigil::config::MemoryConfig;
use vigil::memory::{EdgeType, NewOutcome};

fn memory_config() -> MemoryConfig {
    MemoryConfig {
        similarity_threshold: 0.0,
        ..MemoryConfig::default()
    }
}

fn outcome(incident_id: &str, success: bool) -> NewOutcome {
    NewOutcome {
        incident_id: incident_id.to_string(),
        actions_taken: vec!["restart_container".into()],
        success,
        resolution_time_minutes: 12.0,
        lessons_learned: vec![],
    }
}

#[tokio::test]
async fn storing_same_event_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());
    let event = event_at("api", 450.0, 0.12, 0);

    let first = memory.store_incident(&event, Map::new());
    let second = memory.store_incident(&event, Map::new());

    assert_eq!(first, second);
    let stats = memory.graph_stats();
    assert_eq!(stats.incident_nodes, 1);
    assert_eq!(stats.total_incidents, 1);
    assert_eq!(stats.indexed_vectors, 1);
}

#[tokio::test]
async fn incident_cap_evicts_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let config = MemoryConfig {
        max_incident_nodes: 2,
        ..memory_config()
    };
    let memory = test_memory(tmp.path(), &config);

    let a = memory.store_incident(&event_at("api", 100.0, 0.01, 0), Map::new());
    let b = memory.store_incident(&event_at("api", 200.0, 0.02, 1), Map::new());
    let c = memory.store_incident(&event_at("api", 300.0, 0.03, 2), Map::new());

    assert!(memory.get_incident(&a).is_none());
    assert!(memory.get_incident(&b).is_some());
    assert!(memory.get_incident(&c).is_some());

    let stats = memory.graph_stats();
    assert_eq!(stats.incident_nodes, 2);
    assert_eq!(stats.total_incidents, 3);
    assert_eq!(stats.evicted_incidents, 1);
}

#[tokio::test]
async fn outcome_for_unknown_incident_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());

    let err = memory.store_outcome(outcome("inc_missing", true)).unwrap_err();
    assert!(err.is_not_found());
    assert!(memory.edges_for("inc_missing").is_empty());

    let stats = memory.graph_stats();
    assert_eq!(stats.outcome_nodes, 0);
    assert_eq!(stats.edges, 0);
}

#[tokio::test]
async fn outcome_is_linked_by_resolved_by_edge() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());
    let incident = memory.store_incident(&event_at("db", 900.0, 0.2, 0), Map::new());

    let outcome_id = memory.store_outcome(outcome(&incident, true)).unwrap();
    let edges = memory.edges_for(&incident);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].edge_type, EdgeType::ResolvedBy);
    assert_eq!(edges[0].source_id, incident);
    assert_eq!(edges[0].target_id, outcome_id);

    let stored = memory.get_outcome(&outcome_id).unwrap();
    assert_eq!(stored.incident_id, incident);
    assert_eq!(memory.outcomes_for(&incident).len(), 1);
}

#[tokio::test]
async fn repeated_outcomes_get_distinct_ids() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());
    let incident = memory.store_incident(&event_at("db", 900.0, 0.2, 0), Map::new());

    let first = memory.store_outcome(outcome(&incident, true)).unwrap();
    let second = memory.store_outcome(outcome(&incident, true)).unwrap();
    assert_ne!(first, second);
    assert_eq!(memory.outcomes_for(&incident).len(), 2);
}

#[tokio::test]
async fn evicted_outcome_takes_its_edge_with_it() {
    let tmp = TempDir::new().unwrap();
    let config = MemoryConfig {
        max_outcome_nodes: 1,
        ..memory_config()
    };
    let memory = test_memory(tmp.path(), &config);
    let incident = memory.store_incident(&event_at("db", 900.0, 0.2, 0), Map::new());

    let old = memory.store_outcome(outcome(&incident, false)).unwrap();
    let new = memory.store_outcome(outcome(&incident, true)).unwrap();

    assert!(memory.get_outcome(&old).is_none());
    let edges = memory.edges_for(&incident);
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].target_id, new);
}

#[tokio::test]
async fn find_similar_returns_history_with_success_rate() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());

    let past = event_at("payments", 450.0, 0.12, 0);
    let incident = memory.store_incident(&past, Map::new());
    memory.store_outcome(outcome(&incident, true)).unwrap();
    memory.store_outcome(outcome(&incident, false)).unwrap();
    memory.index().force_save().await.unwrap();

    // Same symptoms an hour later.
    let query = event_at("payments", 450.0, 0.12, 3600);
    let results = memory.find_similar(&query, 3).unwrap();

    assert_eq!(results.len(), 1);
    let hit = &results[0];
    assert_eq!(hit.incident.incident_id, incident);
    assert!(hit.similarity > 0.999, "similarity {}", hit.similarity);
    assert_eq!(hit.outcomes.len(), 2);
    assert_eq!(hit.success_rate, Some(0.5));
}

#[tokio::test]
async fn results_are_ordered_and_thresholded() {
    let tmp = TempDir::new().unwrap();
    let config = MemoryConfig {
        similarity_threshold: 0.99,
        ..MemoryConfig::default()
    };
    let memory = test_memory(tmp.path(), &config);

    let same = memory.store_incident(&event_at("payments", 450.0, 0.12, 0), Map::new());
    memory.store_incident(&event_at("search-indexer", 20.0, 0.0, 1), Map::new());
    memory.index().force_save().await.unwrap();

    let results = memory
        .find_similar(&event_at("payments", 450.0, 0.12, 60), 5)
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].incident.incident_id, same);
}

#[tokio::test]
async fn unflushed_incidents_are_not_searchable_yet() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());
    memory.store_incident(&event_at("api", 450.0, 0.12, 0), Map::new());

    let results = memory.find_similar(&event_at("api", 451.0, 0.12, 5), 3).unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn similarity_cache_is_lru() {
    let tmp = TempDir::new().unwrap();
    let config = MemoryConfig {
        cache_size: 2,
        ..memory_config()
    };
    let memory = test_memory(tmp.path(), &config);

    let q1 = event_at("api", 100.0, 0.01, 0);
    let q2 = event_at("api", 200.0, 0.02, 0);
    let q3 = event_at("api", 300.0, 0.03, 0);

    memory.find_similar(&q1, 3).unwrap();
    memory.find_similar(&q2, 3).unwrap();
    // Touch q1 so q2 becomes least recently used.
    memory.find_similar(&q1, 3).unwrap();
    memory.find_similar(&q3, 3).unwrap();

    assert!(memory.is_cached(&q1));
    assert!(!memory.is_cached(&q2));
    assert!(memory.is_cached(&q3));

    let stats = memory.graph_stats();
    assert_eq!(stats.similarity_searches, 4);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 3);
    assert_eq!(stats.cache_entries, 2);
    assert!((stats.cache_hit_rate() - 0.25).abs() < 1e-9);
}

#[tokio::test]
async fn cached_results_are_not_invalidated_by_writes() {
    let tmp = TempDir::new().unwrap();
    let memory = test_memory(tmp.path(), &memory_config());
    let query = event_at("api", 450.0, 0.12, 0);

    assert!(memory.find_similar(&query, 3).unwrap().is_empty());

    memory.store_incident(&event_at("api", 450.0, 0.12, 10), Map::new());
    memory.index().force_save().await.unwrap();

    // Served from the cache, which predates the new incident.
    assert!(memory.find_similar(&query, 3).unwrap().is_empty());
    assert_eq!(memory.graph_stats().cache_hits, 1);
}
