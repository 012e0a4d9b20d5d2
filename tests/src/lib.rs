//! # WebSocket Gateway Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── harness.rs     # Gateway nodes on ephemeral ports, socket client helpers
//!     ├── e2e_sessions.rs # Auth, subscribe, timeouts, backpressure, limits
//!     └── cluster.rs     # Two-node delivery through the cluster bus
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo test -p gateway-tests integration::cluster
//! ```

pub mod integration;
