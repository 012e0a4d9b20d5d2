//! # WebSocket Endpoint
//!
//! Session lifecycle glue between the transport and the rest of the
//! gateway.
//!
//! ```text
//!   connect ──► token? ──yes──► establish ──► registry
//!                 │                 ▲
//!                 no                │ valid authCmd (auth stripped,
//!                 ▼                 │ bundled cmds forwarded once)
//!          pending-auth cache ──────┘
//!                 │
//!           deadline passed ──► close (policy violation)
//! ```
//!
//! Establishing runs the session caps before the session becomes visible
//! in the registry. Teardown releases caps, rate-limit state and
//! subscriptions exactly once.
//!
//! A session being promoted sits in `authenticating` until it is in the
//! registry, so a close that lands mid-promotion is never lost: the
//! close marks the state, and `establish` rolls back whatever it took.

use crate::domain::close::CloseStatus;
use crate::domain::commands::{self, CommandEnvelope, WsCmd};
use crate::domain::config::WsConfig;
use crate::domain::error::AuthError;
use crate::domain::ids::{ConnectionId, ExternalSessionId};
use crate::domain::session::{SecurityCtx, SessionRef, SessionType};
use crate::domain::update::{codes, CmdUpdate, DECODE_FAILURE_MSG, TOO_MANY_UPDATES_MSG};
use crate::executor::WorkerPool;
use crate::limits::{SessionLimiter, UpdateDecision, UpdateRateLimiter};
use crate::metrics::GatewayMetrics;
use crate::ports::{
    SubscriptionManager, TenantProfileProvider, TokenValidator, TransportSession, UpdateSink,
};
use crate::ws::outbound::{Outbound, OutboundDispatcher};
use crate::ws::pending::PendingAuthCache;
use crate::ws::registry::SessionRegistry;
use crate::ws::session::SessionState;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Close reason for a session that never authenticated.
pub const AUTH_TIMEOUT_REASON: &str = "Auth timeout";

/// Command id used for errors that cannot be tied to a command.
const UNKNOWN_CMD_ID: i32 = 0;

pub struct WsEndpoint {
    config: WsConfig,
    registry: SessionRegistry,
    pending: PendingAuthCache,
    authenticating: DashMap<ConnectionId, Arc<SessionState>>,
    dispatcher: OutboundDispatcher,
    limits: SessionLimiter,
    update_limits: UpdateRateLimiter,
    tokens: Arc<dyn TokenValidator>,
    profiles: Arc<dyn TenantProfileProvider>,
    subscriptions: Arc<dyn SubscriptionManager>,
    metrics: Arc<GatewayMetrics>,
    pool: WorkerPool,
}

impl WsEndpoint {
    pub fn new(
        config: WsConfig,
        tokens: Arc<dyn TokenValidator>,
        profiles: Arc<dyn TenantProfileProvider>,
        subscriptions: Arc<dyn SubscriptionManager>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        let pool = WorkerPool::new(config.worker_threads);
        let dispatcher = OutboundDispatcher::new(config.send_timeout, Arc::clone(&metrics));
        Self {
            pending: PendingAuthCache::new(config.auth_timeout),
            authenticating: DashMap::new(),
            registry: SessionRegistry::new(),
            dispatcher,
            limits: SessionLimiter::new(),
            update_limits: UpdateRateLimiter::new(),
            tokens,
            profiles,
            subscriptions,
            metrics,
            pool,
            config,
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn pending(&self) -> &PendingAuthCache {
        &self.pending
    }

    pub fn limits(&self) -> &SessionLimiter {
        &self.limits
    }

    pub fn update_limits(&self) -> &UpdateRateLimiter {
        &self.update_limits
    }

    pub fn dispatcher(&self) -> &OutboundDispatcher {
        &self.dispatcher
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Validate a handshake token.
    pub fn validate_token(&self, token: &str) -> Result<SecurityCtx, AuthError> {
        self.tokens.validate(token)
    }

    /// A transport connection finished its handshake.
    ///
    /// With a security context the session is established right away,
    /// otherwise it waits in the pending-auth cache. Returns `None` when
    /// the session was refused and closed.
    pub async fn on_connected(
        &self,
        conn_id: ConnectionId,
        session_type: SessionType,
        transport: Arc<dyn TransportSession>,
        security: Option<SecurityCtx>,
        local_addr: Option<SocketAddr>,
        remote_addr: Option<SocketAddr>,
    ) -> Option<Arc<SessionState>> {
        let session = Arc::new(SessionRef::new(session_type, local_addr, remote_addr));
        let state = Arc::new(SessionState::new(
            conn_id,
            session,
            transport,
            self.config.max_queue_messages_per_session,
        ));
        self.registry
            .link_external(state.external_id().clone(), conn_id);

        match security {
            Some(ctx) => self.establish(&state, ctx).await.then_some(state),
            None => {
                self.pending.put(Arc::clone(&state), Instant::now());
                self.metrics.record_pending();
                info!(
                    conn_id = %conn_id,
                    session_id = %state.external_id(),
                    session_type = %session_type,
                    "Session awaiting auth"
                );
                Some(state)
            }
        }
    }

    /// Run the caps and publish the session. `false` if it was refused or
    /// closed before it became visible.
    async fn establish(&self, state: &Arc<SessionState>, ctx: SecurityCtx) -> bool {
        let profile = self.profiles.profile(&ctx.tenant_id);
        state.set_max_queue(profile.negotiated_queue_cap(self.config.max_queue_messages_per_session));

        if !state.session().bind_security(ctx.clone()) {
            warn!(session_id = %state.external_id(), "Security context already bound");
        }

        if let Err(e) = self.limits.try_acquire(state.external_id(), &ctx, &profile) {
            self.registry
                .unlink_external(state.external_id(), state.conn_id());
            self.metrics.record_refused();
            state.close(CloseStatus::policy_violation(e.to_string())).await;
            return false;
        }

        self.registry.insert(Arc::clone(state));
        self.metrics.record_established();
        if state.is_closed() {
            // Whoever removes it from the registry owns the teardown
            if self.registry.remove(&state.conn_id()).is_some() {
                self.limits.release(state.external_id(), &ctx);
                self.update_limits.forget(state.external_id());
                self.registry
                    .unlink_external(state.external_id(), state.conn_id());
                self.metrics.record_closed();
                debug!(conn_id = %state.conn_id(), "Session closed while establishing");
            }
            return false;
        }
        info!(
            conn_id = %state.conn_id(),
            session_id = %state.external_id(),
            tenant_id = %ctx.tenant_id,
            user_id = %ctx.user_id,
            max_queue = state.max_queue(),
            "Session established"
        );
        true
    }

    /// Inbound text frame. Never waits for command processing.
    pub fn on_message(self: &Arc<Self>, conn_id: ConnectionId, text: String) {
        self.metrics.record_frame();
        let Some(state) = self
            .registry
            .get(&conn_id)
            .or_else(|| self.pending.get(&conn_id))
        else {
            debug!(conn_id = %conn_id, "Frame for unknown session dropped");
            return;
        };
        if state.is_closed() {
            return;
        }

        if state.inbound.push(text) {
            let this = Arc::clone(self);
            self.pool.spawn(async move {
                state
                    .inbound
                    .drain_with(|frame| this.dispatch(&state, frame))
                    .await;
            });
        }
    }

    async fn dispatch(&self, state: &Arc<SessionState>, frame: String) {
        if state.is_closed() {
            return;
        }
        let session = state.session();

        let envelope = match commands::decode(session.session_type(), &frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.metrics.record_decode_error();
                if session.is_authenticated() {
                    debug!(session_id = %session.external_id(), error = %e, "Bad command frame");
                    let reply = CmdUpdate::error(UNKNOWN_CMD_ID, codes::BAD_REQUEST, DECODE_FAILURE_MSG);
                    self.deliver(state, &reply);
                } else {
                    warn!(
                        conn_id = %state.conn_id(),
                        error = %e,
                        "Undecodable frame before auth, closing"
                    );
                    self.close_pending(state, CloseStatus::bad_data(DECODE_FAILURE_MSG))
                        .await;
                }
                return;
            }
        };

        if session.is_authenticated() {
            if envelope.auth.is_some() {
                debug!(session_id = %session.external_id(), "Ignoring authCmd on authenticated session");
            }
            self.handle_commands(state, envelope.cmds).await;
            return;
        }

        self.authenticate(state, envelope).await;
    }

    async fn authenticate(&self, state: &Arc<SessionState>, envelope: CommandEnvelope) {
        let CommandEnvelope { auth, cmds } = envelope;

        let Some(auth) = auth else {
            self.metrics.record_auth_failure();
            warn!(conn_id = %state.conn_id(), "First frame without authCmd");
            self.close_pending(
                state,
                CloseStatus::policy_violation(AuthError::MissingAuthCmd.to_string()),
            )
            .await;
            return;
        };

        let ctx = match self.tokens.validate(&auth.token) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.metrics.record_auth_failure();
                warn!(conn_id = %state.conn_id(), error = %e, "Auth failed");
                self.close_pending(state, CloseStatus::bad_data(e.to_string()))
                    .await;
                return;
            }
        };

        let conn_id = state.conn_id();
        self.authenticating.insert(conn_id, Arc::clone(state));
        let Some(state) = self.pending.promote(&conn_id) else {
            self.authenticating.remove(&conn_id);
            debug!(conn_id = %conn_id, "Session no longer pending, auth ignored");
            return;
        };
        self.metrics.record_pending_done();

        let established = self.establish(&state, ctx).await;
        self.authenticating.remove(&conn_id);
        if established {
            self.handle_commands(&state, cmds).await;
        }
    }

    async fn handle_commands(&self, state: &Arc<SessionState>, cmds: Vec<WsCmd>) {
        if cmds.is_empty() {
            return;
        }
        self.subscriptions
            .handle_commands(state.session(), cmds)
            .await;
        // Teardown may have run while the commands were in progress
        if state.is_closed() {
            self.subscriptions
                .cancel_all_session_subscriptions(state.session())
                .await;
        }
    }

    async fn close_pending(&self, state: &Arc<SessionState>, status: CloseStatus) {
        if self.pending.remove(&state.conn_id()).is_some() {
            self.metrics.record_pending_done();
        }
        self.registry
            .unlink_external(state.external_id(), state.conn_id());
        state.close(status).await;
    }

    /// Pong received: the peer is alive.
    pub fn on_pong(&self, conn_id: ConnectionId) {
        if let Some(state) = self.registry.get(&conn_id) {
            state.touch(Instant::now());
        }
    }

    /// The transport is gone. Safe to call more than once.
    pub async fn on_closed(&self, conn_id: ConnectionId) {
        if let Some(state) = self.pending.remove(&conn_id) {
            self.metrics.record_pending_done();
            self.registry
                .unlink_external(state.external_id(), conn_id);
            Self::discard(&state);
            debug!(conn_id = %conn_id, "Pending session closed");
            return;
        }
        if let Some(state) = self.authenticating.get(&conn_id).map(|e| Arc::clone(e.value())) {
            Self::discard(&state);
            debug!(conn_id = %conn_id, "Session closed during auth");
        }

        let Some(state) = self.registry.remove(&conn_id) else {
            return;
        };
        Self::discard(&state);

        let session_id = state.external_id();
        if let Some(ctx) = state.session().security_ctx() {
            self.limits.release(session_id, ctx);
        }
        self.update_limits.forget(session_id);
        self.subscriptions
            .cancel_all_session_subscriptions(state.session())
            .await;
        self.metrics.record_closed();
        info!(conn_id = %conn_id, session_id = %session_id, "Session closed");
    }

    fn discard(state: &SessionState) {
        state.begin_close();
        state.inbound.clear();
        state.outbound.clear();
    }

    /// Close every pending session whose auth deadline passed.
    pub fn evict_expired_pending(&self, now: Instant) -> usize {
        let expired = self.pending.evict_expired(now);
        for state in &expired {
            self.metrics.record_pending_done();
            self.metrics.record_auth_timeout();
            self.registry
                .unlink_external(state.external_id(), state.conn_id());
            state.close_detached(CloseStatus::policy_violation(AUTH_TIMEOUT_REASON));
        }
        expired.len()
    }

    /// One liveness pass over established sessions.
    ///
    /// Returns `(pinged, closed)`.
    pub fn sweep_liveness(&self, now: Instant) -> (usize, usize) {
        let ping_timeout = self.config.ping_timeout;
        let ping_after = self.config.ping_period();
        let (mut pinged, mut closed) = (0, 0);

        for state in self.registry.sessions() {
            if state.is_closed() {
                continue;
            }
            let idle = now.saturating_duration_since(state.last_activity());
            if idle >= ping_timeout {
                self.metrics.record_ping_timeout();
                warn!(
                    conn_id = %state.conn_id(),
                    session_id = %state.external_id(),
                    idle_ms = idle.as_millis(),
                    "Ping timeout, closing session"
                );
                state.close_detached(CloseStatus::not_reliable());
                closed += 1;
            } else if idle >= ping_after && self.dispatcher.send(&state, Outbound::Ping).is_ok() {
                pinged += 1;
            }
        }
        (pinged, closed)
    }

    /// Close every live and pending session with `status`.
    pub async fn close_all(&self, status: CloseStatus) {
        let mut sessions = self.registry.sessions();
        for state in self.pending.take_all() {
            self.metrics.record_pending_done();
            sessions.push(state);
        }
        info!(count = sessions.len(), "Closing all sessions");
        for state in sessions {
            if !state.close(status.clone()).await {
                warn!(conn_id = %state.conn_id(), "Session already closing during shutdown");
            }
        }
    }

    fn deliver(&self, state: &Arc<SessionState>, update: &CmdUpdate) {
        let text = update.to_client_json(state.session().session_type());
        if let Err(e) = self.dispatcher.send(state, Outbound::Text(text)) {
            debug!(session_id = %state.external_id(), error = %e, "Update not enqueued");
        }
    }
}

impl UpdateSink for WsEndpoint {
    fn send_update(&self, session_id: &ExternalSessionId, update: CmdUpdate) {
        let Some(state) = self.registry.get_by_external(session_id) else {
            debug!(session_id = %session_id, "Update for unknown session dropped");
            return;
        };
        let Some(ctx) = state.session().security_ctx() else {
            return;
        };

        let profile = self.profiles.profile(&ctx.tenant_id);
        match self
            .update_limits
            .check(&ctx.tenant_id, session_id, &profile.update_windows)
        {
            UpdateDecision::Deliver => self.deliver(&state, &update),
            UpdateDecision::WarnOnce => {
                self.metrics.record_rate_limited();
                warn!(
                    session_id = %session_id,
                    tenant_id = %ctx.tenant_id,
                    "Too many updates, session blacklisted"
                );
                let warning =
                    CmdUpdate::error(update.cmd_id, codes::TOO_MANY_UPDATES, TOO_MANY_UPDATES_MSG);
                self.deliver(&state, &warning);
            }
            UpdateDecision::Drop => {
                self.metrics.record_rate_limited();
            }
        }
    }
}
