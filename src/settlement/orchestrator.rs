//! Two-leg settlement state machine.
//!
//! # Responsibilities
//! - Serialize settlements: one non-terminal record per session
//! - Check funds before anything touches the network
//! - Submit the fee, wait for it, then (and only then) submit the primary
//! - Map every ledger answer onto a state-machine exit
//!
//! # Design Decisions
//! - Records live in a `DashMap`; entries are never held across an await
//! - The signature of a leg is persisted before its broadcast, so a lost
//!   acknowledgement resolves through confirmation or expiry instead of a
//!   second submission
//! - A confirmation timeout leaves the record where it is; `recheck` picks up
//!   from the same state

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::balance::BalanceTracker;
use crate::config::SettlementConfig;
use crate::keys::KeySlot;
use crate::ledger::{
    sign_prebuilt, sign_transfer, ConfirmationOutcome, LedgerClient, LedgerError, SignedTransaction,
};
use crate::observability::metrics;
use crate::quoting::{check_requote, check_slippage, ExchangeQuoter, QuoteError};
use crate::resilience::retry_delay;
use crate::settlement::fees;
use crate::settlement::types::{
    AbortReason, LegFailure, LegKind, LegStatus, PrimaryLeg, SettlementError, SettlementIntent,
    SettlementOutcome, SettlementRecord, SettlementResult, SettlementState,
};

/// What the drive loop does after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Advance,
    Rest,
}

/// Why building the primary transaction failed.
enum BuildFailure {
    Retry(String),
    Fatal(String),
}

pub struct SettlementOrchestrator {
    ledger: LedgerClient,
    tracker: Arc<BalanceTracker>,
    signer: KeySlot,
    quoter: Option<Arc<dyn ExchangeQuoter>>,
    settings: SettlementConfig,
    records: DashMap<Uuid, SettlementRecord>,
    /// Record occupying the settlement slot.
    active: Mutex<Option<Uuid>>,
    /// Held for as long as a record is being driven.
    driving: tokio::sync::Mutex<()>,
    abort_requested: Mutex<Option<Uuid>>,
    closed: AtomicBool,
}

impl SettlementOrchestrator {
    pub fn new(
        ledger: LedgerClient,
        tracker: Arc<BalanceTracker>,
        signer: KeySlot,
        quoter: Option<Arc<dyn ExchangeQuoter>>,
        settings: SettlementConfig,
    ) -> Self {
        Self {
            ledger,
            tracker,
            signer,
            quoter,
            settings,
            records: DashMap::new(),
            active: Mutex::new(None),
            driving: tokio::sync::Mutex::new(()),
            abort_requested: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Run `intent` until it reaches a terminal state or a confirmation wait
    /// runs out.
    ///
    /// Failure exits are reported through the returned record's outcome
    /// (see [`SettlementRecord::error`]). `Err` means no record was created.
    pub async fn execute(&self, intent: SettlementIntent) -> SettlementResult<SettlementRecord> {
        self.ensure_open()?;
        self.validate(&intent)?;

        let _driving = self.driving.try_lock().map_err(|_| SettlementError::Busy {
            active: self.active(),
        })?;
        self.ensure_open()?;

        let id = self.claim(intent)?;
        tracing::info!(settlement = %id, "Settlement started");
        self.drive(id).await
    }

    /// Continue a record left non-terminal, typically by a confirmation
    /// timeout. Never resubmits a leg that already has a signature.
    pub async fn recheck(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        self.ensure_open()?;
        let _driving = self.driving.try_lock().map_err(|_| SettlementError::Busy {
            active: self.active(),
        })?;

        let record = self.snapshot(id)?;
        if record.is_terminal() {
            return Ok(record);
        }

        tracing::info!(settlement = %id, state = %record.state, "Rechecking settlement");
        self.update(id, |r| r.outcome = SettlementOutcome::InProgress);
        self.drive(id).await
    }

    /// Request abort of a record that has not broadcast its fee yet.
    pub fn abort(&self, id: Uuid) -> SettlementResult<()> {
        let record = self.snapshot(id)?;
        if record.state != SettlementState::Building || record.fee.signature.is_some() {
            return Err(SettlementError::NotAbortable(id));
        }
        *self.abort_requested.lock().unwrap_or_else(|p| p.into_inner()) = Some(id);
        tracing::info!(settlement = %id, "Abort requested");
        Ok(())
    }

    /// Forget a finished record.
    pub fn dismiss(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        let record = self.snapshot(id)?;
        if !record.is_terminal() {
            return Err(SettlementError::NotTerminal(id));
        }
        self.records.remove(&id);
        Ok(record)
    }

    pub fn record(&self, id: Uuid) -> Option<SettlementRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// All retained records, oldest first.
    pub fn records(&self) -> Vec<SettlementRecord> {
        let mut records: Vec<SettlementRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Id of the record occupying the settlement slot, if any.
    pub fn active(&self) -> Option<Uuid> {
        *self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Reject further calls and wait for an in-flight drive to come to rest.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _driving = self.driving.lock().await;
        tracing::info!(records = self.records.len(), "Settlement orchestrator closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> SettlementResult<()> {
        if self.is_closed() {
            return Err(SettlementError::SessionClosed);
        }
        Ok(())
    }

    fn validate(&self, intent: &SettlementIntent) -> SettlementResult<()> {
        if intent.fee_amount == 0 {
            return Err(SettlementError::InvalidIntent("fee amount must be positive".into()));
        }
        match &intent.primary {
            PrimaryLeg::Transfer { amount, .. } => {
                if *amount == 0 {
                    return Err(SettlementError::InvalidIntent("transfer amount must be positive".into()));
                }
            }
            PrimaryLeg::Exchange(request) => {
                if self.quoter.is_none() {
                    return Err(QuoteError::Disabled.into());
                }
                if request.amount == 0 {
                    return Err(SettlementError::InvalidIntent("exchange amount must be positive".into()));
                }
                if request.input_mint == request.output_mint {
                    return Err(SettlementError::InvalidIntent(
                        "exchange input and output must differ".into(),
                    ));
                }
                if request.slippage_bps > self.settings.max_slippage_bps {
                    return Err(QuoteError::ToleranceTooHigh {
                        requested: request.slippage_bps,
                        max: self.settings.max_slippage_bps,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn claim(&self, intent: SettlementIntent) -> SettlementResult<Uuid> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(current) = *active {
            let occupied = self
                .records
                .get(&current)
                .map(|r| !r.is_terminal())
                .unwrap_or(false);
            if occupied {
                return Err(SettlementError::Busy {
                    active: Some(current),
                });
            }
        }

        let record = SettlementRecord::new(intent);
        let id = record.id;
        self.records.insert(id, record);
        *active = Some(id);
        Ok(id)
    }

    fn release(&self, id: Uuid) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if *active == Some(id) {
            *active = None;
        }
        let mut abort = self.abort_requested.lock().unwrap_or_else(|p| p.into_inner());
        if *abort == Some(id) {
            *abort = None;
        }
    }

    async fn drive(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        loop {
            let flow = match self.snapshot(id)?.state {
                SettlementState::Building => self.build_fee(id).await?,
                SettlementState::FeeSubmitted => self.await_fee(id).await?,
                SettlementState::FeeConfirmed => self.submit_primary(id).await?,
                SettlementState::PrimarySubmitted => self.await_primary(id).await?,
                _ => Flow::Rest,
            };
            if flow == Flow::Rest {
                break;
            }
        }

        let record = self.snapshot(id)?;
        if record.is_terminal() {
            self.release(id);
            metrics::record_settlement(record.outcome.label());
            tracing::info!(settlement = %id, state = %record.state, outcome = record.outcome.label(), "Settlement finished");
        }
        Ok(record)
    }

    /// Building: funds check, quote, fee transaction, fee broadcast.
    async fn build_fee(&self, id: Uuid) -> SettlementResult<Flow> {
        let record = self.snapshot(id)?;
        if record.fee.signature.is_some() {
            // A previous drive signed the fee and stopped before recording the
            // broadcast result.
            self.transition(id, SettlementState::FeeSubmitted, |r| {
                r.fee.status = LegStatus::Submitted;
            });
            return Ok(Flow::Advance);
        }
        let intent = &record.intent;

        if let Some(reason) = self.interrupted(id) {
            return Ok(self.abort_record(id, reason));
        }

        let available = self.tracker.current().lamports;
        let required = intent
            .primary
            .native_amount()
            .checked_add(intent.fee_amount)
            .and_then(|total| total.checked_add(self.network_cost()));
        match required {
            Some(required) if required <= available => {}
            required => {
                let required = required.unwrap_or(u64::MAX);
                return Ok(self.abort_record(id, AbortReason::InsufficientFunds { required, available }));
            }
        }

        if let PrimaryLeg::Exchange(request) = &intent.primary {
            let quote = match &self.quoter {
                Some(quoter) => quoter.quote(request).await,
                None => Err(QuoteError::Disabled),
            };
            match quote.and_then(|q| check_slippage(&q, request.slippage_bps).map(|_| q)) {
                Ok(quote) => {
                    tracing::debug!(
                        settlement = %id,
                        out_amount = quote.out_amount,
                        min_out_amount = quote.min_out_amount,
                        "Quote accepted"
                    );
                    self.update(id, |r| r.quote = Some(quote));
                }
                Err(e) => {
                    return Ok(self.abort_record(id, AbortReason::Quote { message: e.to_string() }));
                }
            }
        }

        let handle = match self.ledger.get_latest_blockhash().await {
            Ok(handle) => handle,
            Err(e) => {
                return Ok(self.abort_record(id, AbortReason::EndpointUnavailable { message: e.to_string() }));
            }
        };

        if let Some(reason) = self.interrupted(id) {
            return Ok(self.abort_record(id, reason));
        }

        let signed = match sign_transfer(&self.signer, &intent.fee_destination, intent.fee_amount, &handle.blockhash) {
            Ok(signed) => signed,
            Err(e) if self.signer.is_discarded() => {
                tracing::debug!(settlement = %id, error = %e, "Signing key gone");
                return Ok(self.abort_record(id, AbortReason::SessionClosed));
            }
            Err(e) => {
                self.transition(id, SettlementState::FeeFailed, |r| {
                    r.fee.status = LegStatus::Failed;
                    r.outcome = SettlementOutcome::FeeFailed {
                        reason: e.to_string(),
                        failure: LegFailure::Unbuildable,
                    };
                });
                return Ok(Flow::Advance);
            }
        };

        self.update(id, |r| {
            r.fee.signature = Some(signed.signature);
            r.fee.status = LegStatus::Signed;
            r.fee.last_valid_block_height = Some(handle.last_valid_block_height);
        });

        let submitted_at = SystemTime::now();
        match self.ledger.broadcast(&signed.bytes).await {
            Ok(_) => {
                metrics::record_broadcast("fee", true);
                self.transition(id, SettlementState::FeeSubmitted, |r| {
                    r.fee.status = LegStatus::Submitted;
                    r.fee.submitted_at = Some(submitted_at);
                });
            }
            Err(LedgerError::BroadcastRejected(reason)) => {
                metrics::record_broadcast("fee", false);
                tracing::warn!(settlement = %id, reason = %reason, "Fee transaction rejected");
                self.transition(id, SettlementState::FeeFailed, |r| {
                    r.fee.status = LegStatus::Failed;
                    r.fee.submitted_at = Some(submitted_at);
                    r.outcome = SettlementOutcome::FeeFailed {
                        reason,
                        failure: LegFailure::Rejected,
                    };
                });
            }
            Err(e) => {
                // No acknowledgement either way. The transaction may still
                // land; confirmation or blockhash expiry decides.
                tracing::warn!(settlement = %id, error = %e, "Fee broadcast unacknowledged");
                self.transition(id, SettlementState::FeeSubmitted, |r| {
                    r.fee.status = LegStatus::Submitted;
                    r.fee.submitted_at = Some(submitted_at);
                });
            }
        }
        Ok(Flow::Advance)
    }

    /// FeeSubmitted: wait for the fee, re-polling on timeout.
    async fn await_fee(&self, id: Uuid) -> SettlementResult<Flow> {
        let record = self.snapshot(id)?;
        let Some(signature) = record.fee.signature else {
            self.transition(id, SettlementState::FeeFailed, |r| {
                r.fee.status = LegStatus::Failed;
                r.outcome = SettlementOutcome::FeeFailed {
                    reason: "fee transaction was never signed".into(),
                    failure: LegFailure::Unbuildable,
                };
            });
            return Ok(Flow::Advance);
        };

        let mut attempt = 0;
        loop {
            let outcome = self
                .ledger
                .confirm_until(
                    &signature,
                    self.settings.confirmation_commitment,
                    self.settings.confirmation_timeout(),
                    record.fee.last_valid_block_height,
                )
                .await;

            match outcome {
                Ok(ConfirmationOutcome::Confirmed { slot, .. }) => {
                    tracing::info!(settlement = %id, signature = %signature, slot, "Fee confirmed");
                    self.transition(id, SettlementState::FeeConfirmed, |r| {
                        r.fee.status = LegStatus::Confirmed;
                        r.fee.confirmed_at = Some(SystemTime::now());
                    });
                    return Ok(Flow::Advance);
                }
                Ok(ConfirmationOutcome::FailedOnChain { reason }) => {
                    self.fail_fee(id, reason, LegFailure::FailedOnChain);
                    return Ok(Flow::Advance);
                }
                Ok(ConfirmationOutcome::Expired) => {
                    self.fail_fee(id, "fee transaction expired before landing".into(), LegFailure::Expired);
                    return Ok(Flow::Advance);
                }
                Ok(ConfirmationOutcome::TimedOut) => {}
                Err(e) => {
                    tracing::warn!(settlement = %id, error = %e, "Fee status check refused");
                }
            }

            if attempt >= self.settings.fee_confirmation_repolls || self.is_closed() {
                self.pending(id, LegKind::Fee);
                return Ok(Flow::Rest);
            }
            attempt += 1;
            tokio::time::sleep(self.retry_delay(attempt)).await;
        }
    }

    /// FeeConfirmed: build, sign and broadcast the primary.
    async fn submit_primary(&self, id: Uuid) -> SettlementResult<Flow> {
        let record = self.snapshot(id)?;
        if record.primary.signature.is_some() {
            self.transition(id, SettlementState::PrimarySubmitted, |r| {
                r.primary.status = LegStatus::Submitted;
            });
            return Ok(Flow::Advance);
        }

        let attempts = self.settings.primary_build_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay(attempt - 1)).await;
            }
            match self.build_primary(&record).await {
                Ok((signed, last_valid)) => return self.broadcast_primary(id, &record, signed, last_valid).await,
                Err(BuildFailure::Fatal(reason)) => {
                    self.fail_primary(id, reason, LegFailure::Unbuildable);
                    return Ok(Flow::Advance);
                }
                Err(BuildFailure::Retry(reason)) => {
                    tracing::warn!(settlement = %id, attempt, error = %reason, "Primary build failed");
                    last_error = reason;
                }
            }
        }

        self.fail_primary(
            id,
            format!("primary transaction could not be built: {}", last_error),
            LegFailure::Unbuildable,
        );
        Ok(Flow::Advance)
    }

    async fn build_primary(
        &self,
        record: &SettlementRecord,
    ) -> Result<(SignedTransaction, Option<u64>), BuildFailure> {
        match &record.intent.primary {
            PrimaryLeg::Transfer { destination, amount } => {
                let handle = self
                    .ledger
                    .get_latest_blockhash()
                    .await
                    .map_err(|e| BuildFailure::Retry(e.to_string()))?;
                let signed = sign_transfer(&self.signer, destination, *amount, &handle.blockhash)
                    .map_err(|e| BuildFailure::Fatal(e.to_string()))?;
                Ok((signed, Some(handle.last_valid_block_height)))
            }
            PrimaryLeg::Exchange(request) => {
                let quoter = self
                    .quoter
                    .as_ref()
                    .ok_or_else(|| BuildFailure::Fatal(QuoteError::Disabled.to_string()))?;
                let accepted = record
                    .quote
                    .as_ref()
                    .ok_or_else(|| BuildFailure::Fatal("no accepted quote".to_string()))?;

                let fresh = quoter.quote(request).await.map_err(quote_failure)?;
                check_requote(accepted, &fresh, request.slippage_bps)
                    .map_err(|e| BuildFailure::Fatal(e.to_string()))?;

                let prepared = quoter
                    .prepare(&fresh, &self.signer.address())
                    .await
                    .map_err(quote_failure)?;
                let signed = sign_prebuilt(&prepared.transaction, &self.signer)
                    .map_err(|e| BuildFailure::Fatal(e.to_string()))?;
                Ok((signed, prepared.last_valid_block_height))
            }
        }
    }

    async fn broadcast_primary(
        &self,
        id: Uuid,
        record: &SettlementRecord,
        signed: SignedTransaction,
        last_valid_block_height: Option<u64>,
    ) -> SettlementResult<Flow> {
        self.update(id, |r| {
            r.primary.signature = Some(signed.signature);
            r.primary.status = LegStatus::Signed;
            r.primary.last_valid_block_height = last_valid_block_height;
        });

        let submitted_at = strictly_after(record.fee.confirmed_at);
        match self.ledger.broadcast(&signed.bytes).await {
            Ok(_) => {
                metrics::record_broadcast("primary", true);
                self.transition(id, SettlementState::PrimarySubmitted, |r| {
                    r.primary.status = LegStatus::Submitted;
                    r.primary.submitted_at = Some(submitted_at);
                });
            }
            Err(LedgerError::BroadcastRejected(reason)) => {
                metrics::record_broadcast("primary", false);
                self.update(id, |r| r.primary.submitted_at = Some(submitted_at));
                self.fail_primary(id, reason, LegFailure::Rejected);
            }
            Err(e) => {
                tracing::warn!(settlement = %id, error = %e, "Primary broadcast unacknowledged");
                self.transition(id, SettlementState::PrimarySubmitted, |r| {
                    r.primary.status = LegStatus::Submitted;
                    r.primary.submitted_at = Some(submitted_at);
                });
            }
        }
        Ok(Flow::Advance)
    }

    /// PrimarySubmitted: wait for the primary.
    async fn await_primary(&self, id: Uuid) -> SettlementResult<Flow> {
        let record = self.snapshot(id)?;
        let Some(signature) = record.primary.signature else {
            self.fail_primary(id, "primary transaction was never signed".into(), LegFailure::Unbuildable);
            return Ok(Flow::Advance);
        };

        let outcome = self
            .ledger
            .confirm_until(
                &signature,
                self.settings.confirmation_commitment,
                self.settings.confirmation_timeout(),
                record.primary.last_valid_block_height,
            )
            .await;

        match outcome {
            Ok(ConfirmationOutcome::Confirmed { slot, .. }) => {
                tracing::info!(settlement = %id, signature = %signature, slot, "Primary confirmed");
                self.transition(id, SettlementState::PrimaryConfirmed, |r| {
                    r.primary.status = LegStatus::Confirmed;
                    r.primary.confirmed_at = Some(SystemTime::now());
                    r.outcome = SettlementOutcome::Completed;
                });
                self.tracker.force_refresh().await;
                Ok(Flow::Advance)
            }
            Ok(ConfirmationOutcome::FailedOnChain { reason }) => {
                self.fail_primary(id, reason, LegFailure::FailedOnChain);
                Ok(Flow::Advance)
            }
            Ok(ConfirmationOutcome::Expired) => {
                self.fail_primary(id, "primary transaction expired before landing".into(), LegFailure::Expired);
                Ok(Flow::Advance)
            }
            Ok(ConfirmationOutcome::TimedOut) => {
                self.pending(id, LegKind::Primary);
                Ok(Flow::Rest)
            }
            Err(e) => {
                tracing::warn!(settlement = %id, error = %e, "Primary status check refused");
                self.pending(id, LegKind::Primary);
                Ok(Flow::Rest)
            }
        }
    }

    fn fail_fee(&self, id: Uuid, reason: String, failure: LegFailure) {
        tracing::warn!(settlement = %id, reason = %reason, ?failure, "Fee leg failed");
        self.transition(id, SettlementState::FeeFailed, |r| {
            r.fee.status = LegStatus::Failed;
            r.outcome = SettlementOutcome::FeeFailed { reason, failure };
        });
    }

    fn fail_primary(&self, id: Uuid, reason: String, failure: LegFailure) {
        tracing::error!(settlement = %id, reason = %reason, ?failure, "Fee charged but primary leg failed");
        self.transition(id, SettlementState::PrimaryFailed, |r| {
            r.primary.status = LegStatus::Failed;
            r.outcome = SettlementOutcome::PartialFailure { reason, failure };
        });
    }

    fn abort_record(&self, id: Uuid, reason: AbortReason) -> Flow {
        tracing::warn!(settlement = %id, reason = %reason, "Settlement aborted before broadcast");
        self.transition(id, SettlementState::Aborted, |r| {
            r.outcome = SettlementOutcome::Aborted(reason);
        });
        Flow::Advance
    }

    fn pending(&self, id: Uuid, leg: LegKind) {
        tracing::warn!(settlement = %id, %leg, "Confirmation still pending; record kept for recheck");
        self.update(id, |r| r.outcome = SettlementOutcome::ConfirmationPending { leg });
    }

    fn interrupted(&self, id: Uuid) -> Option<AbortReason> {
        if self.is_closed() {
            return Some(AbortReason::SessionClosed);
        }
        let requested = *self.abort_requested.lock().unwrap_or_else(|p| p.into_inner());
        (requested == Some(id)).then_some(AbortReason::Requested)
    }

    fn transition(&self, id: Uuid, to: SettlementState, mutate: impl FnOnce(&mut SettlementRecord)) {
        if let Some(mut record) = self.records.get_mut(&id) {
            let from = record.state;
            record.state = to;
            mutate(&mut record);
            record.updated_at = SystemTime::now();
            tracing::info!(settlement = %id, from = %from, to = %to, "Settlement state changed");
        }
    }

    fn update(&self, id: Uuid, mutate: impl FnOnce(&mut SettlementRecord)) {
        if let Some(mut record) = self.records.get_mut(&id) {
            mutate(&mut record);
            record.updated_at = SystemTime::now();
        }
    }

    fn snapshot(&self, id: Uuid) -> SettlementResult<SettlementRecord> {
        self.record(id).ok_or(SettlementError::UnknownRecord(id))
    }

    fn network_cost(&self) -> u64 {
        fees::network_cost(self.settings.network_fee_per_signature_lamports)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        retry_delay(attempt, self.settings.retry_base_ms, self.settings.retry_max_ms)
    }
}

impl std::fmt::Debug for SettlementOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementOrchestrator")
            .field("signer", &self.signer)
            .field("records", &self.records.len())
            .field("active", &self.active())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn quote_failure(error: QuoteError) -> BuildFailure {
    match error {
        QuoteError::Http(_) | QuoteError::InvalidResponse(_) | QuoteError::Rejected(_) => {
            BuildFailure::Retry(error.to_string())
        }
        other => BuildFailure::Fatal(other.to_string()),
    }
}

/// Now, or just after `earlier` if the wall clock has not moved past it.
fn strictly_after(earlier: Option<SystemTime>) -> SystemTime {
    let now = SystemTime::now();
    match earlier {
        Some(earlier) if now <= earlier => earlier + Duration::from_micros(1),
        _ => now,
    }
}
