//! Pure topology algorithms for the intelgraph engine.
//!
//! Every algorithm runs over a [`GraphView`], a dense CSR projection built by
//! the caller. Nothing in this crate knows about tenants, node types or
//! storage.

pub mod centrality;
pub mod common;
pub mod community;
pub mod pagerank;

pub use centrality::{degree_centrality, DegreeCentrality};
pub use common::GraphView;
pub use community::{weakly_connected_components, WccResult};
pub use pagerank::{page_rank, PageRankConfig};
