//! HTTP quoting client (`/quote` + `/swap`).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::QuotingConfig;
use crate::keys::Address;
use crate::quoting::types::{ExchangeRequest, PreparedExchange, QuoteError, QuoteResult, RouteQuote};
use crate::quoting::ExchangeQuoter;

/// Aggregator client speaking the `/quote` and `/swap` API.
#[derive(Debug, Clone)]
pub struct HttpQuoter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpQuoter {
    pub fn new(config: &QuotingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> QuoteResult<Value> {
        let response = self
            .authorize(builder)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| QuoteError::Http(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| QuoteError::InvalidResponse(e.to_string()))?;

        if !status.is_success() || body.get("error").is_some() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .or_else(|| body.get("message").and_then(Value::as_str))
                .unwrap_or("no route found");
            return Err(QuoteError::Rejected(format!("{} ({})", message, status)));
        }

        Ok(body)
    }
}

#[async_trait]
impl ExchangeQuoter for HttpQuoter {
    async fn quote(&self, request: &ExchangeRequest) -> QuoteResult<RouteQuote> {
        let url = format!("{}/quote", self.base_url);
        let amount = request.amount.to_string();
        let slippage = request.slippage_bps.to_string();
        let builder = self.client.get(&url).query(&[
            ("inputMint", request.input_mint.as_str()),
            ("outputMint", request.output_mint.as_str()),
            ("amount", amount.as_str()),
            ("slippageBps", slippage.as_str()),
            ("restrictIntermediateTokens", "true"),
        ]);

        tracing::debug!(
            input = %request.input_mint,
            output = %request.output_mint,
            amount = request.amount,
            "Requesting exchange quote"
        );

        let body = self.send(builder).await?;
        parse_quote(body)
    }

    async fn prepare(&self, quote: &RouteQuote, payer: &Address) -> QuoteResult<PreparedExchange> {
        let url = format!("{}/swap", self.base_url);
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": payer.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });

        let body = self.send(self.client.post(&url).json(&body)).await?;
        parse_swap(&body)
    }
}

fn amount_field(body: &Value, field: &str) -> QuoteResult<u64> {
    let raw = body
        .get(field)
        .ok_or_else(|| QuoteError::InvalidResponse(format!("missing '{}'", field)))?;
    // Amounts arrive as decimal strings; accept plain numbers too.
    raw.as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| raw.as_u64())
        .ok_or_else(|| QuoteError::InvalidResponse(format!("'{}' is not an amount", field)))
}

pub(crate) fn parse_quote(body: Value) -> QuoteResult<RouteQuote> {
    let text = |field: &str| {
        body.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| QuoteError::InvalidResponse(format!("missing '{}'", field)))
    };

    let route = body
        .get("routePlan")
        .and_then(Value::as_array)
        .map(|plan| {
            plan.iter()
                .filter_map(|step| step.pointer("/swapInfo/label").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let slippage_bps = body
        .get("slippageBps")
        .and_then(Value::as_u64)
        .and_then(|v| u16::try_from(v).ok())
        .unwrap_or(0);

    Ok(RouteQuote {
        input_mint: text("inputMint")?,
        output_mint: text("outputMint")?,
        in_amount: amount_field(&body, "inAmount")?,
        out_amount: amount_field(&body, "outAmount")?,
        min_out_amount: amount_field(&body, "otherAmountThreshold")?,
        slippage_bps,
        price_impact_pct: body.get("priceImpactPct").and_then(Value::as_str).map(str::to_string),
        route,
        raw: body,
    })
}

pub(crate) fn parse_swap(body: &Value) -> QuoteResult<PreparedExchange> {
    let encoded = body
        .get("swapTransaction")
        .and_then(Value::as_str)
        .ok_or_else(|| QuoteError::InvalidResponse("missing 'swapTransaction'".to_string()))?;
    let transaction = BASE64
        .decode(encoded)
        .map_err(|e| QuoteError::InvalidResponse(format!("swapTransaction: {}", e)))?;

    Ok(PreparedExchange {
        transaction,
        last_valid_block_height: body.get("lastValidBlockHeight").and_then(Value::as_u64),
    })
}
