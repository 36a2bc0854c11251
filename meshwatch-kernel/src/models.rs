//! Mesh test data model: agents, tasks, connection records, the connection
//! matrix and the `MeshResults` aggregate root.

pub mod agents;
pub mod connection;
pub mod matrix;
pub mod mesh_results;
pub mod tasks;

pub use agents::{Agent, Agents, Coordinates};
pub use connection::{HealthItem, MeshColumn, MetricType};
pub use matrix::{ConnectionMatrix, ConnectionUpdatePolicy, MeshRow, ReplacePolicy, SplicePolicy};
pub use mesh_results::{MergeError, MeshConfig, MeshResults};
pub use tasks::{Task, Tasks};
