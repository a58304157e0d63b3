//! Startup orchestration.
//!
//! # Responsibilities
//! - Run the pre-start and start sequences in their fixed order
//! - Wrap each failure with the failing component's role, type and tag
//! - Tear the box down before a phase error reaches the caller
//!
//! # Design Decisions
//! - Fail fast: the first failing component ends the phase
//! - `start` runs pre-start first unless it already completed
//! - A closed box refuses both phases
//! - A panic during that teardown is escalated as `DoubleFault`, never swallowed

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::time::Instant;

use futures_util::FutureExt;

use crate::config::ScriptMode;
use crate::error::{panic_message, CloseError, Component, DoubleFault, Phase, PhaseError};
use crate::instance::ProxyBox;
use crate::observability::metrics;
use crate::script::{run_start_hooks, HookFailure};

/// Tag used in messages: the adapter's tag, or its index when untagged.
pub(crate) fn resolved_tag(tag: &str, index: usize) -> String {
    if tag.is_empty() {
        index.to_string()
    } else {
        tag.to_string()
    }
}

fn script_failure(phase: Phase, failure: HookFailure) -> PhaseError {
    PhaseError::new(
        phase,
        Component::Script {
            tag: failure.tag,
            mode: failure.mode,
        },
        failure.source,
    )
}

impl ProxyBox {
    /// Run the pre-start sequence. On failure the box is closed before the
    /// error is returned.
    pub async fn pre_start(&self) -> Result<(), PhaseError> {
        self.ensure_open(Phase::PreStart)?;
        let began = Instant::now();
        if let Err(err) = self.run_pre_start().await {
            return Err(self.abort(err).await);
        }
        metrics::record_phase(Phase::PreStart.as_str(), began.elapsed());
        self.logger.info(format_args!(
            "pre-started ({:.2}s)",
            self.created_at.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    /// Run pre-start (if not done yet) and the start sequence. On failure the
    /// box is closed before the error is returned.
    pub async fn start(&self) -> Result<(), PhaseError> {
        self.ensure_open(Phase::Start)?;
        let began = Instant::now();
        if let Err(err) = self.run_start().await {
            return Err(self.abort(err).await);
        }
        metrics::record_phase(Phase::Start.as_str(), began.elapsed());
        self.logger.info(format_args!(
            "started ({:.2}s)",
            self.created_at.elapsed().as_secs_f64()
        ));
        Ok(())
    }

    fn ensure_open(&self, phase: Phase) -> Result<(), PhaseError> {
        if self.latch.is_closed() {
            return Err(PhaseError::new(
                phase,
                Component::Instance,
                "already closed".into(),
            ));
        }
        Ok(())
    }

    async fn run_pre_start(&self) -> Result<(), PhaseError> {
        if self.pre_started.load(Ordering::Acquire) {
            return Ok(());
        }
        let phase = Phase::PreStart;

        run_start_hooks(&self.scripts, ScriptMode::StartPre, &self.context, &self.logger)
            .await
            .map_err(|f| script_failure(phase, f))?;

        for (name, service) in self.pre_services.iter() {
            self.logger.trace(format_args!("pre-start {}", name));
            service.pre_start().await.map_err(|e| {
                PhaseError::new(phase, Component::PreStartService(name.to_string()), e)
            })?;
        }

        for (i, outbound) in self.registry.outbounds().iter().enumerate() {
            if !outbound.has_start() {
                continue;
            }
            let tag = resolved_tag(outbound.tag(), i);
            self.logger.trace(format_args!(
                "initializing outbound/{}[{}]",
                outbound.kind(),
                tag
            ));
            outbound.start().await.map_err(|e| {
                PhaseError::new(
                    phase,
                    Component::Outbound {
                        kind: outbound.kind().to_string(),
                        tag,
                    },
                    e,
                )
            })?;
        }

        self.logger.trace("starting router");
        self.router
            .start()
            .await
            .map_err(|e| PhaseError::new(phase, Component::Router, e))?;
        self.pre_started.store(true, Ordering::Release);
        Ok(())
    }

    async fn run_start(&self) -> Result<(), PhaseError> {
        self.run_pre_start().await?;
        let phase = Phase::Start;

        for (name, service) in self.pre_services.iter() {
            self.logger.trace(format_args!("starting {}", name));
            service
                .start()
                .await
                .map_err(|e| PhaseError::new(phase, Component::Service(name.to_string()), e))?;
        }

        for (i, inbound) in self.registry.inbounds().iter().enumerate() {
            let tag = resolved_tag(inbound.tag(), i);
            self.logger.trace(format_args!(
                "initializing inbound/{}[{}]",
                inbound.kind(),
                tag
            ));
            inbound.start().await.map_err(|e| {
                PhaseError::new(
                    phase,
                    Component::Inbound {
                        kind: inbound.kind().to_string(),
                        tag,
                    },
                    e,
                )
            })?;
        }

        for (name, service) in self.post_services.iter() {
            self.logger.trace(format_args!("starting {}", name));
            service
                .start()
                .await
                .map_err(|e| PhaseError::new(phase, Component::Service(name.to_string()), e))?;
        }

        run_start_hooks(&self.scripts, ScriptMode::StartPost, &self.context, &self.logger)
            .await
            .map_err(|f| script_failure(phase, f))
    }

    /// Close the box after a phase failure and hand the failure back.
    async fn abort(&self, err: PhaseError) -> PhaseError {
        metrics::record_component_failure(err.phase.as_str(), err.component.role());
        self.logger
            .error(format_args!("{} failed: {}", err.phase.as_str(), err));

        match AssertUnwindSafe(self.close()).catch_unwind().await {
            Ok(Ok(())) | Ok(Err(CloseError::AlreadyClosed)) => {}
            Ok(Err(CloseError::Teardown(errors))) => {
                self.logger
                    .warn(format_args!("errors while closing after failure: {}", errors));
            }
            Err(payload) => self.escalate(err, payload),
        }
        err
    }

    fn escalate(&self, origin: PhaseError, payload: Box<dyn Any + Send>) -> ! {
        let fault = panic_message(payload.as_ref());
        self.logger.error(format_args!("origin error: {}", origin));
        self.logger.error(format_args!(
            "panic on early close: {}\n{}",
            fault,
            Backtrace::force_capture()
        ));
        std::panic::panic_any(DoubleFault {
            origin: origin.to_string(),
            fault,
        })
    }
}
