//! Subscription management backing the gateway's `SubscriptionManager` port.

pub mod cluster;
pub mod entity;
pub mod service;

pub use cluster::run_cluster_ingress;
pub use entity::EntitySubscriptions;
pub use service::SubscriptionService;
