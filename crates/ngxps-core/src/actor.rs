//! `UnitActor`: owns the engine and serialises passes
//!
//! One pass runs to completion before the next message is handled.

use std::sync::Arc;

use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{info, warn};

use crate::actions::Actions;
use crate::engine::{Engine, PassReport};
use crate::environment::UnitEnvironment;
use crate::error::CoreError;
use crate::message::{FlagSnapshot, GetFlags, GetStatus, RunHook, StatusReport};
use crate::store::{StateBackend, UnitStore};

/// Arguments for spawning a `UnitActor`
pub struct UnitActorArgs {
    /// Where flags, baselines and status are persisted
    pub backend: Box<dyn StateBackend>,
    /// Operations against the host
    pub actions: Arc<dyn Actions>,
    /// Configuration, relation data and resources
    pub environment: Arc<dyn UnitEnvironment>,
}

/// Actor owning the reconciliation engine of one unit
pub struct UnitActor {
    engine: Engine,
}

impl UnitActor {
    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl Actor for UnitActor {
    type Args = UnitActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let backend_type = args.backend.backend_type();
        let store = UnitStore::open(args.backend)?;

        info!(
            id = %actor_ref.id(),
            backend = backend_type,
            flags = store.flags.len(),
            "UnitActor starting"
        );

        Ok(Self {
            engine: Engine::new(store, args.actions, args.environment),
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "UnitActor stopping");

        if let Err(e) = self.engine.flush() {
            warn!(error = %e, "failed to persist unit state on stop");
        }

        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RunHook> for UnitActor {
    type Reply = Result<PassReport, CoreError>;

    async fn handle(&mut self, msg: RunHook, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.engine.run(msg.trigger).await
    }
}

impl Message<GetFlags> for UnitActor {
    type Reply = FlagSnapshot;

    async fn handle(&mut self, _msg: GetFlags, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        FlagSnapshot {
            flags: self.engine.flags().to_vec(),
        }
    }
}

impl Message<GetStatus> for UnitActor {
    type Reply = StatusReport;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        StatusReport {
            status: self.engine.status().cloned(),
        }
    }
}
