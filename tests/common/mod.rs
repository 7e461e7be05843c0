//! Shared fixtures for integration tests: a small order entity and an
//! engine wired to the in-memory store with a fast retry policy.

#![allow(dead_code)]

use entity_engine::{
    AuditEntry, Auditable, EngineConfig, EntityEngine, EntityId, MemoryStore, Transition,
    TransitionTable,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: EntityId,
    pub version: i64,
    pub status: String,
    pub audit_trail: Vec<AuditEntry>,
    pub customer: String,
    pub total_cents: i64,
}

impl Order {
    pub fn new(customer: &str, total_cents: i64, status: &str) -> Self {
        Self {
            id: EntityId::new(),
            version: 0,
            status: status.to_string(),
            audit_trail: Vec::new(),
            customer: customer.to_string(),
            total_cents,
        }
    }
}

impl Auditable for Order {
    const TYPE_NAME: &'static str = "Order";

    fn id(&self) -> EntityId {
        self.id
    }
    fn version(&self) -> i64 {
        self.version
    }
    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn set_status(&mut self, status: String) {
        self.status = status;
    }
    fn audit_trail(&self) -> &[AuditEntry] {
        &self.audit_trail
    }
    fn audit_trail_mut(&mut self) -> &mut Vec<AuditEntry> {
        &mut self.audit_trail
    }
}

/// Strict lifecycle used by most tests: pending -> active -> shipped.
pub fn order_table() -> TransitionTable<Order> {
    TransitionTable::new()
        .allow(
            "pending",
            Transition::to("active").with_description("Order activated"),
        )
        .allow("active", Transition::to("shipped"))
        .terminal("shipped")
}

pub struct Harness {
    pub store: Arc<MemoryStore<Order>>,
    pub engine: Arc<EntityEngine<Order>>,
}

pub fn harness(table: TransitionTable<Order>) -> Harness {
    let store = Arc::new(MemoryStore::<Order>::new());
    let config = EngineConfig {
        retry_delay_ms: 1,
        ..EngineConfig::default()
    };
    let engine = Arc::new(EntityEngine::with_config(
        Arc::clone(&store),
        table,
        config,
    ));
    Harness { store, engine }
}

pub fn lenient_harness() -> Harness {
    harness(TransitionTable::new())
}
