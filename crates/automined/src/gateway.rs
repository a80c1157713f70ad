//! HTTP chain gateway client.
//!
//! The gateway owns keys, ABI encoding and RPC failover. We speak a small
//! JSON protocol to it:
//!
//! - `GET  /targets/{addr}/availability` -> `{"available": bool}`
//! - `GET  /current-target`              -> `{"address": "0x.."}`
//! - `GET  /deposits`                    -> `{"count": n}`
//! - `GET  /permissions`                 -> `{"can_switch": bool}`
//! - `POST /switch` `{"target": "0x.."}` -> `{"tx": "0x.."}`
//! - `GET  /tx/{handle}`                 -> `{"status": "pending" | "success" | "reverted"}`

use async_trait::async_trait;
use automine_shared::Address;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::chain::{ChainClient, Confirmation, TxHandle};
use crate::error::ChainError;

/// Receipt poll interval while waiting for confirmation
const RECEIPT_POLL: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct AvailabilityResponse {
    available: bool,
}

#[derive(Deserialize)]
struct CurrentTargetResponse {
    address: String,
}

#[derive(Deserialize)]
struct DepositsResponse {
    count: u64,
}

#[derive(Deserialize)]
struct PermissionsResponse {
    can_switch: bool,
}

#[derive(Serialize)]
struct SwitchRequest<'a> {
    target: &'a str,
}

#[derive(Deserialize)]
struct SwitchResponse {
    tx: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TxState {
    Pending,
    Success,
    Reverted,
}

#[derive(Deserialize)]
struct TxResponse {
    status: TxState,
}

pub struct HttpChainClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpChainClient {
    /// `request_timeout` bounds every single HTTP request
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ChainError::Read(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, reqwest::Error> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await
    }

    async fn read<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChainError> {
        self.get(path)
            .await
            .map_err(|e| ChainError::Read(format!("GET {}: {}", path, e)))
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn read_availability(&self, target: &Address) -> Result<bool, ChainError> {
        let resp: AvailabilityResponse = self
            .read(&format!("/targets/{}/availability", target))
            .await?;
        Ok(resp.available)
    }

    async fn read_current_target(&self) -> Result<Address, ChainError> {
        let resp: CurrentTargetResponse = self.read("/current-target").await?;
        Address::parse(&resp.address)
            .map_err(|e| ChainError::Read(format!("gateway returned a bad address: {}", e)))
    }

    async fn read_deposit_count(&self) -> Result<u64, ChainError> {
        let resp: DepositsResponse = self.read("/deposits").await?;
        Ok(resp.count)
    }

    async fn can_switch(&self) -> Result<bool, ChainError> {
        let resp: PermissionsResponse = self.read("/permissions").await?;
        Ok(resp.can_switch)
    }

    async fn submit_switch(&self, target: &Address) -> Result<TxHandle, ChainError> {
        let resp = self
            .client
            .post(format!("{}/switch", self.base_url))
            .json(&SwitchRequest {
                target: target.as_str(),
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChainError::Submit(e.to_string()))?;

        let body: SwitchResponse = resp
            .json()
            .await
            .map_err(|e| ChainError::Submit(format!("bad response: {}", e)))?;

        debug!("Gateway accepted switch to {} as {}", target, body.tx);
        Ok(TxHandle(body.tx))
    }

    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        timeout: Duration,
    ) -> Result<Confirmation, ChainError> {
        let deadline = Instant::now() + timeout;
        let path = format!("/tx/{}", handle);

        loop {
            let resp: TxResponse = self
                .get(&path)
                .await
                .map_err(|e| ChainError::Confirmation(format!("GET {}: {}", path, e)))?;

            match resp.status {
                TxState::Success => return Ok(Confirmation { success: true }),
                TxState::Reverted => return Ok(Confirmation { success: false }),
                TxState::Pending => {}
            }

            if Instant::now() + RECEIPT_POLL > deadline {
                return Err(ChainError::Timeout(timeout));
            }
            tokio::time::sleep(RECEIPT_POLL).await;
        }
    }
}
