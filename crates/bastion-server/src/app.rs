//! Application wiring and main loop.

use std::sync::Arc;
use std::time::Duration;

use bastion_attest::{AttestationService, KeyManager, SignerRegistry};
use bastion_core::{ChannelEscalationSink, Clock, ContextSnapshot, EscalationEvent, SystemClock};
use bastion_gate::GateEngine;
use bastion_ledger::{JsonLinesStore, Ledger, LedgerStore, MemoryStore};
use bastion_oracle::ContextOracle;
use bastion_pipeline::PromotionPipeline;
use bastion_signal::SignalEngine;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{AppConfig, StorageBackend};
use crate::error::{AppError, AppResult};
use crate::observer::LedgerSnapshotObserver;
use crate::service::GovernanceService;

/// Main application.
pub struct Application {
    config: AppConfig,
    service: Arc<GovernanceService>,
    escalations: mpsc::UnboundedReceiver<EscalationEvent>,
}

impl Application {
    /// Build every engine on the system clock.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;

        let store: Arc<dyn LedgerStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Jsonl => Arc::new(JsonLinesStore::open(&config.storage.dir)?),
        };
        let (sink, escalations) = ChannelEscalationSink::new();
        let sink = Arc::new(sink);

        let ledger = Arc::new(Ledger::open(
            store,
            Arc::clone(&clock),
            sink.clone(),
            config.ledger.clone(),
        )?);

        let registry = SignerRegistry::from_config(&config.attestation.signers)?;
        let keys = KeyManager::load(&config.attestation.keys)?;
        for identity in keys.identities() {
            let registered = registry.lookup(identity);
            match (registered, keys.address(identity)) {
                (Some(r), Some(address)) if r.address == address => {}
                (Some(_), _) => {
                    return Err(AppError::Config(format!(
                        "local key for {identity} does not match its registered address"
                    )))
                }
                (None, _) => warn!(%identity, "Local key has no registered signer; its signatures will be refused"),
            }
        }
        let attestation = Arc::new(AttestationService::new(
            Arc::clone(&ledger),
            registry,
            Arc::clone(&clock),
            &config.attestation,
        ));

        let gate = Arc::new(GateEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&attestation),
            Arc::clone(&clock),
            config.gate.clone(),
        ));

        let (oracle, _status) =
            ContextOracle::new(config.oracle.clone(), Arc::clone(&clock), sink.clone());
        let oracle = Arc::new(
            oracle.with_observer(Arc::new(LedgerSnapshotObserver::new(Arc::clone(&ledger)))),
        );

        let signal = Arc::new(SignalEngine::new(
            Arc::clone(&ledger),
            Arc::clone(&oracle),
            Arc::clone(&clock),
            config.signal.clone(),
        ));
        let pipeline = Arc::new(PromotionPipeline::new(
            Arc::clone(&ledger),
            Arc::clone(&gate),
            Arc::clone(&signal),
            Arc::clone(&clock),
            sink,
            config.pipeline.clone(),
        ));

        let service = Arc::new(GovernanceService::new(
            ledger,
            attestation,
            gate,
            oracle,
            signal,
            pipeline,
            keys,
            Duration::from_millis(config.attestation.sign_timeout_ms),
        ));

        info!(
            storage = ?config.storage.backend,
            chains = service.chains()?.len(),
            "Application initialized"
        );
        Ok(Self {
            config,
            service,
            escalations,
        })
    }

    pub fn service(&self) -> Arc<GovernanceService> {
        Arc::clone(&self.service)
    }

    /// Pending escalations, without blocking.
    pub fn drain_escalations(&mut self) -> Vec<EscalationEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.escalations.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Verify all chains once, at startup.
    pub fn verify_on_start(&self) -> AppResult<bool> {
        let results = self.service.verify_all()?;
        let broken = results.iter().filter(|v| !v.valid).count();
        if broken > 0 {
            error!(broken, total = results.len(), "Ledger verification found broken chains");
        } else {
            info!(chains = results.len(), "Ledger verified");
        }
        Ok(broken == 0)
    }

    /// Run until ctrl-c: poll the oracle, tick the signal machine, apply
    /// incoming snapshots and drain escalations.
    pub async fn run(mut self, mut snapshots: Option<mpsc::Receiver<ContextSnapshot>>) -> AppResult<()> {
        let mut poll = tokio::time::interval(Duration::from_millis(
            self.config.oracle.poll_interval_ms.max(1),
        ));
        let mut tick = tokio::time::interval(Duration::from_millis(
            self.config.signal.tick_interval_ms.max(1),
        ));
        let mut applied = 0u64;

        info!("Entering main event loop");
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.service.oracle.poll_status();
                }

                _ = tick.tick() => {
                    let cooled = self.service.signal.tick();
                    if !cooled.is_empty() {
                        info!(count = cooled.len(), "Cooled candidates returned to DORMANT");
                    }
                }

                Some(snapshot) = recv_snapshot(&mut snapshots) => {
                    match self.service.ingest_snapshot(snapshot) {
                        Ok(active) => {
                            applied += 1;
                            info!(version = active.version, "Snapshot applied");
                        }
                        Err(e) => warn!(error = %e, "Snapshot rejected"),
                    }
                }

                Some(event) = self.escalations.recv() => {
                    // The sink already logged the event; the external
                    // alerting hook attaches here.
                    info!(id = %event.id, kind = %event.kind, requires_human = event.requires_human, "Escalation drained");
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(snapshots_applied = applied, "Shutting down");
        self.verify_on_start()?;
        Ok(())
    }
}

/// Next snapshot, or pending forever once the source is gone.
async fn recv_snapshot(
    snapshots: &mut Option<mpsc::Receiver<ContextSnapshot>>,
) -> Option<ContextSnapshot> {
    let Some(rx) = snapshots.as_mut() else {
        return std::future::pending().await;
    };
    let next = rx.recv().await;
    if next.is_none() {
        info!("Snapshot feed closed");
        *snapshots = None;
        return std::future::pending().await;
    }
    next
}
