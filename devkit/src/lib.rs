/*!
# Meshwatch DevKit - Stubs and helpers for cache tests

- Scripted stub repo recording every query it receives
- Builders for agents, tasks, time series and whole MeshResults
- Test harness wiring a CachingRepo to the stub, with fetch expectations
*/

pub mod fixtures;
pub mod stub_repo;
pub mod test_utils;

pub use fixtures::{series, MeshBuilder, T0};
pub use stub_repo::StubRepo;
pub use test_utils::{TestHarness, TestStats};
