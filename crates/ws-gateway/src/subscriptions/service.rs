//! # Subscription Service
//!
//! Node-local side of subscription management.
//!
//! ```text
//!   client cmd ──► SubscriptionService ──route(tenant, entity)──┬─► local EntitySubscriptions
//!                                                               └─► owner node (AddSubscription)
//!
//!   update ──route──► owner: match records ──┬─► local session: UpdateSink
//!                                            └─► other node: SessionUpdate
//! ```
//!
//! Each connected session's records are also kept here, keyed by command
//! id, so a closing session can cancel everything it registered.

use crate::domain::commands::{EntityDataCmd, SubscriptionKind, WsCmd};
use crate::domain::error::SubscriptionError;
use crate::domain::ids::{EntityId, ExternalSessionId, TenantId};
use crate::domain::session::{SecurityCtx, SessionRef};
use crate::domain::update::CmdUpdate;
use crate::metrics::GatewayMetrics;
use crate::ports::{SubscriptionManager, UpdateSink};
use crate::routing::{ClusterMessage, PartitionRouter, RouteOutcome, SubscriptionRecord};
use crate::subscriptions::entity::EntitySubscriptions;
use async_trait::async_trait;
use cluster_bus::NodeId;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, warn};

pub struct SubscriptionService {
    router: Arc<PartitionRouter>,
    entities: EntitySubscriptions,
    sessions: DashMap<ExternalSessionId, HashMap<i32, SubscriptionRecord>>,
    sink: OnceLock<Weak<dyn UpdateSink>>,
    metrics: Arc<GatewayMetrics>,
}

impl SubscriptionService {
    pub fn new(router: Arc<PartitionRouter>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            router,
            entities: EntitySubscriptions::new(),
            sessions: DashMap::new(),
            sink: OnceLock::new(),
            metrics,
        }
    }

    /// Attach the session-facing sink. Only the first call has effect.
    pub fn bind_sink(&self, sink: Weak<dyn UpdateSink>) {
        if self.sink.set(sink).is_err() {
            warn!("Update sink already bound");
        }
    }

    pub fn router(&self) -> &Arc<PartitionRouter> {
        &self.router
    }

    /// Records held by this node as partition owner.
    pub fn owned_subscriptions(&self) -> usize {
        self.entities.len()
    }

    /// Subscriptions of sessions connected to this node.
    pub fn session_subscriptions(&self, session_id: &ExternalSessionId) -> usize {
        self.sessions.get(session_id).map_or(0, |s| s.len())
    }

    fn local_node(&self) -> &NodeId {
        self.router.local_node()
    }

    fn entity_record(
        &self,
        session: &SessionRef,
        ctx: &SecurityCtx,
        cmd: &EntityDataCmd,
        kind: SubscriptionKind,
    ) -> SubscriptionRecord {
        SubscriptionRecord {
            session_id: session.external_id().clone(),
            node_id: self.local_node().clone(),
            tenant_id: ctx.tenant_id,
            entity_id: cmd.entity_id,
            cmd_id: cmd.cmd_id,
            kind,
            keys: cmd.key_list(),
        }
    }

    /// Notifications are addressed to the user as entity.
    fn user_record(
        &self,
        session: &SessionRef,
        ctx: &SecurityCtx,
        cmd_id: i32,
        kind: SubscriptionKind,
    ) -> SubscriptionRecord {
        SubscriptionRecord {
            session_id: session.external_id().clone(),
            node_id: self.local_node().clone(),
            tenant_id: ctx.tenant_id,
            entity_id: EntityId::new(*ctx.user_id.as_uuid()),
            cmd_id,
            kind,
            keys: None,
        }
    }

    fn handle_command(&self, session: &SessionRef, ctx: &SecurityCtx, cmd: WsCmd) {
        let record = match &cmd {
            WsCmd::Timeseries(c) => self.entity_record(session, ctx, c, SubscriptionKind::Timeseries),
            WsCmd::Attributes(c) => self.entity_record(session, ctx, c, SubscriptionKind::Attributes),
            WsCmd::Alarms(c) => self.entity_record(session, ctx, c, SubscriptionKind::Alarms),
            WsCmd::Notifications(c) => {
                self.user_record(session, ctx, c.cmd_id, SubscriptionKind::Notifications)
            }
            WsCmd::NotificationsCount(c) => {
                self.user_record(session, ctx, c.cmd_id, SubscriptionKind::NotificationsCount)
            }
            WsCmd::Unsubscribe(c) | WsCmd::NotificationsUnsubscribe(c) => {
                if !self.unsubscribe(session.external_id(), c.cmd_id) {
                    let err = SubscriptionError::UnknownCommand { cmd_id: c.cmd_id };
                    debug!(session_id = %session.external_id(), error = %err, "Unsubscribe ignored");
                }
                return;
            }
        };
        self.subscribe(record);
    }

    fn subscribe(&self, record: SubscriptionRecord) {
        let previous = self
            .sessions
            .entry(record.session_id.clone())
            .or_default()
            .insert(record.cmd_id, record.clone());
        if let Some(previous) = previous {
            self.route_cancel(&previous);
        }

        debug!(
            session_id = %record.session_id,
            cmd_id = record.cmd_id,
            entity_id = %record.entity_id,
            kind = ?record.kind,
            "Subscribe"
        );
        self.router.route(
            &record.tenant_id,
            &record.entity_id,
            || self.entities.add(record.clone()),
            || ClusterMessage::AddSubscription(record.clone()),
        );
    }

    fn unsubscribe(&self, session_id: &ExternalSessionId, cmd_id: i32) -> bool {
        let removed = self
            .sessions
            .get_mut(session_id)
            .and_then(|mut records| records.remove(&cmd_id));
        self.sessions.remove_if(session_id, |_, records| records.is_empty());

        match removed {
            Some(record) => {
                self.route_cancel(&record);
                true
            }
            None => false,
        }
    }

    fn route_cancel(&self, record: &SubscriptionRecord) {
        self.router.route(
            &record.tenant_id,
            &record.entity_id,
            || {
                self.entities
                    .cancel(&record.session_id, &record.entity_id, record.cmd_id);
            },
            || ClusterMessage::CancelSubscription {
                session_id: record.session_id.clone(),
                tenant_id: record.tenant_id,
                entity_id: record.entity_id,
                cmd_id: record.cmd_id,
            },
        );
    }

    /// Publish an update for an entity from anywhere in the cluster.
    pub fn publish_entity_update(
        &self,
        tenant_id: TenantId,
        entity_id: EntityId,
        kind: SubscriptionKind,
        data: serde_json::Value,
    ) -> RouteOutcome {
        self.router.route(
            &tenant_id,
            &entity_id,
            || self.deliver_local(&entity_id, kind, &data),
            || ClusterMessage::EntityUpdate {
                tenant_id,
                entity_id,
                kind,
                data: data.clone(),
            },
        )
    }

    /// Fan an update out to the records this node owns.
    fn deliver_local(&self, entity_id: &EntityId, kind: SubscriptionKind, data: &serde_json::Value) {
        for record in self.entities.matching(entity_id, kind) {
            let Some(filtered) = record.filter_data(data) else {
                continue;
            };
            let update = CmdUpdate::data(record.cmd_id, filtered);
            if record.node_id == *self.local_node() {
                self.push_to_session(&record.session_id, update);
            } else {
                self.router.forward_to(
                    record.node_id.clone(),
                    ClusterMessage::SessionUpdate {
                        session_id: record.session_id,
                        update,
                    },
                );
            }
        }
    }

    fn push_to_session(&self, session_id: &ExternalSessionId, update: CmdUpdate) {
        match self.sink.get().and_then(Weak::upgrade) {
            Some(sink) => sink.send_update(session_id, update),
            None => warn!(session_id = %session_id, "No update sink bound, update dropped"),
        }
    }

    /// Apply a message received from another node.
    pub fn on_cluster_message(&self, from: &NodeId, message: ClusterMessage) {
        self.metrics.record_cluster_received();
        debug!(from = %from, message = message.name(), "Cluster message");

        match message {
            ClusterMessage::AddSubscription(record) => self.entities.add(record),
            ClusterMessage::CancelSubscription {
                session_id,
                entity_id,
                cmd_id,
                ..
            } => {
                self.entities.cancel(&session_id, &entity_id, cmd_id);
            }
            ClusterMessage::EntityUpdate {
                entity_id,
                kind,
                data,
                ..
            } => self.deliver_local(&entity_id, kind, &data),
            ClusterMessage::SessionUpdate { session_id, update } => {
                self.push_to_session(&session_id, update)
            }
        }
    }
}

#[async_trait]
impl SubscriptionManager for SubscriptionService {
    async fn handle_commands(&self, session: &SessionRef, cmds: Vec<WsCmd>) {
        let Some(ctx) = session.security_ctx() else {
            let err = SubscriptionError::Unauthenticated(session.external_id().clone());
            warn!(error = %err, "Commands dropped");
            return;
        };
        for cmd in cmds {
            self.handle_command(session, ctx, cmd);
        }
    }

    async fn cancel_all_session_subscriptions(&self, session: &SessionRef) {
        let Some((_, records)) = self.sessions.remove(session.external_id()) else {
            return;
        };
        debug!(
            session_id = %session.external_id(),
            count = records.len(),
            "Cancelling session subscriptions"
        );
        for record in records.values() {
            self.route_cancel(record);
        }
    }
}
