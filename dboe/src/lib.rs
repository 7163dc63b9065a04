// Layers, bottom up:
// 1. Records: fixed-length key + value byte arrays
// 2. Block storage: block stores, committed-block cache, per-writer overlay
// 3. B+Tree: node codec and algorithms over block ids
// 4. Range indexes: the B+Tree behind the `Index` contract, inside transactions
// 5. Transactions: shared redo journal and two-phase commit across indexes
// 6. Tuples: node-id tuples over several index orderings
//
// A write transaction copies every block it touches into its overlay.
// Prepare journals the overlays of all indexes behind one commit marker;
// commit applies them to the stores. Recovery replays committed journal
// groups.

#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod config;
pub mod index;
pub mod record;
pub mod storage;
pub mod tuple;
pub mod txn;

#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod simulation;
