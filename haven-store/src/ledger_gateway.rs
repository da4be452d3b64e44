use async_trait::async_trait;
use haven_core::ledger::{Block, LedgerClient, LedgerError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// REST client for the external ledger gateway. Every call is remote and
/// surfaces failure as a typed `LedgerError`.
#[derive(Clone)]
pub struct LedgerGatewayClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    to: &'a str,
    amount: u64,
    fee: u64,
    memo: u64,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    block_index: u64,
}

#[derive(Debug, Deserialize)]
struct BlocksResponse {
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct FeeResponse {
    fee: u64,
}

impl LedgerGatewayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn rejection(resp: reqwest::Response) -> LedgerError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        LedgerError::Rejected(format!("{status}: {body}"))
    }
}

#[async_trait]
impl LedgerClient for LedgerGatewayClient {
    async fn transfer(
        &self,
        to: &str,
        amount: u64,
        fee: u64,
        memo: u64,
    ) -> Result<u64, LedgerError> {
        let resp = self
            .http
            .post(format!("{}/v1/transfers", self.base_url))
            .json(&TransferRequest {
                to,
                amount,
                fee,
                memo,
            })
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::rejection(resp).await);
        }
        let body: TransferResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        debug!(block = body.block_index, to, amount, "Ledger transfer accepted");
        Ok(body.block_index)
    }

    async fn query_blocks(&self, start: u64, length: u64) -> Result<Vec<Block>, LedgerError> {
        let resp = self
            .http
            .get(format!("{}/v1/blocks", self.base_url))
            .query(&[("start", start), ("length", length)])
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::rejection(resp).await);
        }
        let body: BlocksResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(body.blocks)
    }

    async fn transfer_fee(&self) -> Result<u64, LedgerError> {
        let resp = self
            .http
            .get(format!("{}/v1/transfer-fee", self.base_url))
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Self::rejection(resp).await);
        }
        let body: FeeResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(body.fee)
    }
}
