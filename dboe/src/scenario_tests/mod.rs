//! Scenario tests at the index and transaction level.
//!
//! Each test file covers one property of the engine, using seeded inputs so
//! failures reproduce.

#![cfg(test)]

mod helpers;

mod test_commit_abort;
mod test_delete_idempotence;
mod test_invariants;
mod test_range_boundary;
mod test_reader_isolation;
mod test_recovery;
mod test_round_trip;
mod test_simulation;
