//! Partition-aware routing between gateway nodes.

pub mod messages;
pub mod partition;
pub mod router;

pub use messages::{ClusterMessage, SubscriptionRecord};
pub use partition::{partition_of, PartitionAssignment, PartitionService, TopicPartitionInfo};
pub use router::{PartitionRouter, RouteOutcome};
