//! Teardown orchestration.
//!
//! Every step is attempted whatever happened before it; failures are
//! collected under the label of their step and returned together.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::ScriptMode;
use crate::error::{CloseError, ErrorAggregator};
use crate::instance::ProxyBox;
use crate::observability::metrics;
use crate::script::{run_close_hooks, stop_kept_scripts};

impl ProxyBox {
    /// Stop every component. Only the first call does any work; later calls
    /// return `CloseError::AlreadyClosed`.
    pub async fn close(&self) -> Result<(), CloseError> {
        let Some(_guard) = self.latch.close_guard() else {
            return Err(CloseError::AlreadyClosed);
        };
        let began = Instant::now();
        let mut errors = ErrorAggregator::new();
        self.teardown(&mut errors).await;
        metrics::record_close(errors.len());
        metrics::record_phase("close", began.elapsed());
        errors.finish().map_err(CloseError::from)
    }

    async fn teardown(&self, errors: &mut ErrorAggregator) {
        run_close_hooks(
            &self.scripts,
            ScriptMode::ClosePre,
            &self.context,
            &self.logger,
            errors,
        )
        .await;
        stop_kept_scripts(&self.scripts, ScriptMode::StartPost, &self.logger, errors).await;

        for (name, service) in self.post_services.iter() {
            self.logger.trace(format_args!("closing {}", name));
            errors.record(service.close().await, || format!("close {}", name));
        }

        for (i, inbound) in self.registry.inbounds().iter().enumerate() {
            self.logger
                .trace(format_args!("closing inbound/{}[{}]", inbound.kind(), i));
            errors.record(inbound.close().await, || {
                format!("close inbound/{}[{}]", inbound.kind(), i)
            });
        }

        for (i, outbound) in self.registry.outbounds().iter().enumerate() {
            self.logger
                .trace(format_args!("closing outbound/{}[{}]", outbound.kind(), i));
            errors.record(outbound.close().await, || {
                format!("close outbound/{}[{}]", outbound.kind(), i)
            });
        }

        self.logger.trace("closing router");
        errors.record(self.router.close().await, || "close router".to_string());

        for (name, service) in self.pre_services.iter() {
            self.logger.trace(format_args!("closing {}", name));
            errors.record(service.close().await, || format!("close {}", name));
        }

        stop_kept_scripts(&self.scripts, ScriptMode::StartPre, &self.logger, errors).await;
        // The ambient context may already be cancelled at this point.
        run_close_hooks(
            &self.scripts,
            ScriptMode::ClosePost,
            &CancellationToken::new(),
            &self.logger,
            errors,
        )
        .await;

        self.logger.trace("closing log factory");
        errors.record(self.log_factory.close().await, || {
            "close log factory".to_string()
        });
    }
}
