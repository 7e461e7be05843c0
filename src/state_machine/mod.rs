// Status state machine for auditable entities.
//
// Transition rules are a plain per-entity-type table: states are the type's
// status values, edges are the table entries, and any status with no
// outgoing edges in strict mode is terminal. No external state-machine
// runtime is involved.

pub mod table;

pub use table::{FsmMode, Transition, TransitionEffect, TransitionTable};
