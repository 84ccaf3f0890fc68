//! Shared test infrastructure for integration tests: a Postgres
//! testcontainer, migrated once and reused across the whole test binary.

mod harness;

pub use harness::TestHarness;
