//! Ledger RPC client with bounded failover.
//!
//! # Responsibilities
//! - Route every call through the endpoint pool
//! - Report each call's outcome back to the pool
//! - Retry once against the next-best endpoint on endpoint failure
//! - Poll signature status until a terminal outcome or timeout

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::RpcConfig;
use crate::endpoints::{Endpoint, EndpointPool};
use crate::keys::Address;
use crate::ledger::types::{
    Blockhash, BlockhashHandle, Commitment, ConfirmationOutcome, LedgerError, LedgerResult,
    Signature, SignatureStatus,
};
use crate::observability::metrics;
use crate::rpc::{RpcError, RpcResult, RpcTransport};

/// Thin façade over the ledger's JSON-RPC interface.
#[derive(Clone)]
pub struct LedgerClient {
    pool: Arc<EndpointPool>,
    transport: Arc<dyn RpcTransport>,
    settings: RpcConfig,
}

impl LedgerClient {
    pub fn new(pool: Arc<EndpointPool>, transport: Arc<dyn RpcTransport>, settings: RpcConfig) -> Self {
        Self {
            pool,
            transport,
            settings,
        }
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<dyn RpcTransport> {
        &self.transport
    }

    /// Probe every endpoint once.
    pub async fn probe_all(&self, probe_timeout: Duration) {
        self.pool.probe_all(self.transport.as_ref(), probe_timeout).await;
    }

    /// Balance of `address` in lamports.
    pub async fn get_balance(&self, address: &Address) -> LedgerResult<u64> {
        let params = json!([address.to_string(), { "commitment": self.settings.read_commitment }]);
        self.request("getBalance", params, |result| {
            result
                .get("value")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("getBalance: missing numeric 'value'"))
        })
        .await
    }

    /// A fresh blockhash handle for building a transaction.
    pub async fn get_latest_blockhash(&self) -> LedgerResult<BlockhashHandle> {
        let params = json!([{ "commitment": self.settings.read_commitment }]);
        self.request("getLatestBlockhash", params, |result| {
            let value = result
                .get("value")
                .ok_or_else(|| invalid("getLatestBlockhash: missing 'value'"))?;
            let blockhash: Blockhash = value
                .get("blockhash")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("getLatestBlockhash: missing 'blockhash'"))?
                .parse()
                .map_err(|e: LedgerError| invalid(&e.to_string()))?;
            let last_valid_block_height = value
                .get("lastValidBlockHeight")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("getLatestBlockhash: missing 'lastValidBlockHeight'"))?;
            Ok(BlockhashHandle {
                blockhash,
                last_valid_block_height,
            })
        })
        .await
    }

    /// Current block height.
    pub async fn get_block_height(&self) -> LedgerResult<u64> {
        let params = json!([{ "commitment": self.settings.read_commitment }]);
        self.request("getBlockHeight", params, |result| {
            result
                .as_u64()
                .ok_or_else(|| invalid("getBlockHeight: expected a number"))
        })
        .await
    }

    /// Submit signed transaction bytes. A refusal from the ledger is
    /// [`LedgerError::BroadcastRejected`].
    pub async fn broadcast(&self, signed_tx: &[u8]) -> LedgerResult<Signature> {
        let params = json!([
            BASE64.encode(signed_tx),
            {
                "encoding": "base64",
                "skipPreflight": false,
                "preflightCommitment": self.settings.read_commitment,
            }
        ]);
        let result = self
            .request("sendTransaction", params, |result| {
                result
                    .as_str()
                    .ok_or_else(|| invalid("sendTransaction: expected a signature string"))?
                    .parse::<Signature>()
                    .map_err(|e| invalid(&e.to_string()))
            })
            .await;

        match result {
            Err(LedgerError::Rpc(RpcError::Server { message, .. })) => {
                Err(LedgerError::BroadcastRejected(message))
            }
            other => other,
        }
    }

    /// Status of `signature`, or `None` if the ledger has not seen it.
    pub async fn get_signature_status(&self, signature: &Signature) -> LedgerResult<Option<SignatureStatus>> {
        let params = json!([[signature.to_string()], { "searchTransactionHistory": true }]);
        self.request("getSignatureStatuses", params, |result| {
            let entry = result
                .get("value")
                .and_then(Value::as_array)
                .and_then(|values| values.first())
                .ok_or_else(|| invalid("getSignatureStatuses: missing 'value' array"))?;
            if entry.is_null() {
                return Ok(None);
            }
            let slot = entry
                .get("slot")
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid("getSignatureStatuses: missing 'slot'"))?;
            let commitment = entry
                .get("confirmationStatus")
                .and_then(Value::as_str)
                .and_then(Commitment::from_status);
            let err = entry.get("err").filter(|e| !e.is_null()).map(|e| match e.as_str() {
                Some(s) => s.to_string(),
                None => e.to_string(),
            });
            Ok(Some(SignatureStatus {
                slot,
                commitment,
                err,
            }))
        })
        .await
    }

    /// Wait for `signature` to reach `target`, polling at the configured interval.
    pub async fn confirm(
        &self,
        signature: &Signature,
        target: Commitment,
        wait: Duration,
    ) -> LedgerResult<ConfirmationOutcome> {
        self.confirm_until(signature, target, wait, None).await
    }

    /// As [`confirm`](Self::confirm). With `last_valid_block_height`, a signature
    /// still unknown once the chain has passed that height resolves to `Expired`.
    ///
    /// Endpoint failures while polling are logged and polling continues; a
    /// refused status request is returned as an error.
    pub async fn confirm_until(
        &self,
        signature: &Signature,
        target: Commitment,
        wait: Duration,
        last_valid_block_height: Option<u64>,
    ) -> LedgerResult<ConfirmationOutcome> {
        let poll = async {
            let mut ticker = interval(self.settings.confirm_poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.get_signature_status(signature).await {
                    Ok(Some(status)) => {
                        if let Some(reason) = status.err {
                            return Ok(ConfirmationOutcome::FailedOnChain { reason });
                        }
                        if status.reaches(target) {
                            return Ok(ConfirmationOutcome::Confirmed {
                                slot: status.slot,
                                commitment: status.commitment.unwrap_or(target),
                            });
                        }
                        tracing::debug!(signature = %signature, commitment = ?status.commitment, "Waiting for commitment");
                    }
                    Ok(None) => {
                        if let Some(last_valid) = last_valid_block_height {
                            if self.blockhash_expired(signature, last_valid).await? {
                                return Ok(ConfirmationOutcome::Expired);
                            }
                        }
                        tracing::debug!(signature = %signature, "Transaction not yet seen");
                    }
                    Err(LedgerError::EndpointUnavailable(e)) => {
                        tracing::warn!(signature = %signature, error = %e, "Status poll failed, continuing");
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match timeout(wait, poll).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(signature = %signature, wait_ms = wait.as_millis() as u64, "Confirmation timed out");
                Ok(ConfirmationOutcome::TimedOut)
            }
        }
    }

    /// True once the chain is past `last_valid` and the signature is still unknown.
    async fn blockhash_expired(&self, signature: &Signature, last_valid: u64) -> LedgerResult<bool> {
        let height = match self.get_block_height().await {
            Ok(height) => height,
            Err(LedgerError::EndpointUnavailable(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        if height <= last_valid {
            return Ok(false);
        }
        // It may have landed between the two queries.
        match self.get_signature_status(signature).await {
            Ok(status) => Ok(status.is_none()),
            Err(LedgerError::EndpointUnavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Call `method` on the best endpoint, failing over once.
    async fn request<T, F>(&self, method: &'static str, params: Value, parse: F) -> LedgerResult<T>
    where
        F: Fn(&Value) -> RpcResult<T>,
    {
        let first = self.pool.select_healthy();
        let error = match self.attempt(&first, method, params.clone(), &parse).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_endpoint_failure() => return Err(LedgerError::Rpc(e)),
            Err(e) => e,
        };

        let second = self.pool.select_excluding(Some(&first));
        tracing::warn!(
            method,
            failed = %first.name,
            next = %second.name,
            error = %error,
            "Endpoint failed, retrying once"
        );

        match self.attempt(&second, method, params, &parse).await {
            Ok(value) => Ok(value),
            Err(e) if !e.is_endpoint_failure() => Err(LedgerError::Rpc(e)),
            Err(e) => Err(LedgerError::EndpointUnavailable(e)),
        }
    }

    async fn attempt<T, F>(&self, endpoint: &Endpoint, method: &'static str, params: Value, parse: &F) -> RpcResult<T>
    where
        F: Fn(&Value) -> RpcResult<T>,
    {
        let limit = self.settings.request_timeout();
        let start = Instant::now();

        let result = match timeout(limit, self.transport.call(&endpoint.url, method, params, limit)).await {
            Ok(Ok(value)) => parse(&value),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RpcError::Timeout(limit)),
        };

        let elapsed = start.elapsed();
        metrics::record_rpc_latency(method, elapsed);
        let healthy = match &result {
            Ok(_) => true,
            Err(e) => !e.is_endpoint_failure(),
        };
        self.pool.report_outcome(endpoint, healthy, elapsed);

        result
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("endpoints", &self.pool.len())
            .field("timeout_ms", &self.settings.request_timeout_ms)
            .finish()
    }
}

fn invalid(message: &str) -> RpcError {
    RpcError::InvalidResponse(message.to_string())
}
