//! On-chain score engine for custom governances.
//!
//! A delegate's voting power is its own native balance, if the registry shows
//! it has not delegated further, plus the balance of every delegator pointing
//! at it. Registry lookups and balances are fetched in one Multicall3
//! `aggregate3` call and combined in exact integer arithmetic.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{DelegatesError, Result};
use crate::types::{CustomGovernance, Delegation};

/// Multicall3, deployed at the same address on every supported chain.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

pub mod abi {
    use alloy_sol_types::sol;

    sol! {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Call3Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calls) external payable returns (Call3Result[] returnData);
        function getEthBalance(address addr) external view returns (uint256 balance);
    }
}

sol! {
    function delegation(address delegator, bytes32 id) external view returns (address delegate);
}

pub use abi::{Call3, Call3Result};

/// Executes a batch of calls through Multicall3 on `network`.
#[async_trait]
pub trait Multicall: Send + Sync {
    async fn aggregate3(&self, network: &str, calls: Vec<Call3>) -> Result<Vec<Call3Result>>;
}

/// Registry view id as bytes32.
///
/// A `0x`-prefixed id must be exactly 32 bytes of hex. Any other id is taken
/// as UTF-8 text, right-padded with zeros.
pub fn view_id_bytes32(view_id: &str) -> Result<B256> {
    if view_id.starts_with("0x") {
        return B256::from_str(view_id).map_err(|_| {
            DelegatesError::Config(format!("view id {view_id} is not 32 bytes of hex"))
        });
    }
    let bytes = view_id.as_bytes();
    if bytes.len() > 32 {
        return Err(DelegatesError::Config(format!(
            "view id {view_id} does not fit in bytes32"
        )));
    }
    Ok(B256::right_padding_from(bytes))
}

/// Combine registry results and balances into per-delegate scores.
///
/// The first edge seen for a delegate seeds its score with its own balance when
/// `registry_targets` maps it to the zero address; every edge then adds the
/// delegator's balance.
pub fn combine_onchain_scores(
    delegations: &[Delegation],
    registry_targets: &HashMap<Address, Address>,
    balances: &HashMap<Address, U256>,
) -> HashMap<Address, U256> {
    let mut scores: HashMap<Address, U256> = HashMap::new();

    for delegation in delegations {
        let score = scores.entry(delegation.delegate).or_insert_with(|| {
            match registry_targets.get(&delegation.delegate) {
                Some(target) if target.is_zero() => {
                    balances.get(&delegation.delegate).copied().unwrap_or_default()
                }
                _ => U256::ZERO,
            }
        });
        *score += balances.get(&delegation.delegator).copied().unwrap_or_default();
    }

    scores
}

fn unique_in_order(addresses: impl IntoIterator<Item = Address>) -> Vec<Address> {
    let mut seen = HashSet::new();
    addresses.into_iter().filter(|a| seen.insert(*a)).collect()
}

/// Voting power of every delegate in `delegations`.
pub async fn compute_onchain_scores(
    multicall: &dyn Multicall,
    governance: &CustomGovernance,
    delegations: &[Delegation],
) -> Result<HashMap<Address, U256>> {
    if delegations.is_empty() {
        return Ok(HashMap::new());
    }

    let view_id = view_id_bytes32(&governance.view_id)?;
    let delegatees = unique_in_order(delegations.iter().map(|d| d.delegate));
    let all_addresses = unique_in_order(delegations.iter().flat_map(|d| [d.delegator, d.delegate]));

    let calls: Vec<Call3> = delegatees
        .iter()
        .map(|delegatee| Call3 {
            target: governance.delegation_registry,
            allowFailure: false,
            callData: delegationCall {
                delegator: *delegatee,
                id: view_id,
            }
            .abi_encode()
            .into(),
        })
        .chain(all_addresses.iter().map(|address| Call3 {
            target: MULTICALL3_ADDRESS,
            allowFailure: false,
            callData: abi::getEthBalanceCall { addr: *address }.abi_encode().into(),
        }))
        .collect();

    let expected = calls.len();
    let results = multicall.aggregate3(&governance.network, calls).await?;
    if results.len() != expected {
        return Err(DelegatesError::Rpc(format!(
            "multicall returned {} results for {} calls",
            results.len(),
            expected
        )));
    }

    let (registry_results, balance_results) = results.split_at(delegatees.len());

    let registry_targets = delegatees
        .iter()
        .zip(registry_results)
        .map(|(delegatee, result)| {
            let decoded = delegationCall::abi_decode_returns(&result.returnData, true)?;
            Ok((*delegatee, decoded.delegate))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    let balances = all_addresses
        .iter()
        .zip(balance_results)
        .map(|(address, result)| {
            let decoded = abi::getEthBalanceCall::abi_decode_returns(&result.returnData, true)?;
            Ok((*address, decoded.balance))
        })
        .collect::<Result<HashMap<_, _>>>()?;

    debug!(
        governance = %governance.id,
        delegates = delegatees.len(),
        addresses = all_addresses.len(),
        "Resolved on-chain balances"
    );

    Ok(combine_onchain_scores(delegations, &registry_targets, &balances))
}

/// Multicall over plain JSON-RPC `eth_call`.
pub struct JsonRpcMulticall {
    client: Client,
    url_template: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Bytes>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl JsonRpcMulticall {
    /// `url_template` contains `{network}`, replaced by the chain id.
    pub fn new(client: Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Multicall for JsonRpcMulticall {
    async fn aggregate3(&self, network: &str, calls: Vec<Call3>) -> Result<Vec<Call3Result>> {
        let url = self.url_template.replace("{network}", network);
        let data = Bytes::from(abi::aggregate3Call { calls }.abi_encode());

        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "eth_call",
            "params": [{ "to": MULTICALL3_ADDRESS, "data": data }, "latest"],
        });

        let response: RpcResponse = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(DelegatesError::Rpc(format!("{} ({})", error.message, error.code)));
        }

        let output = response
            .result
            .ok_or_else(|| DelegatesError::Rpc("eth_call returned no result".to_string()))?;

        Ok(abi::aggregate3Call::abi_decode_returns(&output, true)?.returnData)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolValue;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> Client {
        crate::http::json_client(Duration::from_secs(5)).unwrap()
    }

    fn edge(delegator: Address, delegate: Address) -> Delegation {
        Delegation {
            delegator,
            delegate,
            space: String::new(),
            timestamp: 0,
        }
    }

    /// Answers registry and balance calls from fixed tables.
    struct FakeChain {
        registry: Address,
        targets: HashMap<Address, Address>,
        balances: HashMap<Address, U256>,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl Multicall for FakeChain {
        async fn aggregate3(&self, _network: &str, calls: Vec<Call3>) -> Result<Vec<Call3Result>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            calls
                .into_iter()
                .map(|call| {
                    let return_data = if call.target == self.registry {
                        let decoded = delegationCall::abi_decode(&call.callData, true)?;
                        let target = self.targets.get(&decoded.delegator).copied().unwrap_or_default();
                        target.abi_encode()
                    } else {
                        let decoded = abi::getEthBalanceCall::abi_decode(&call.callData, true)?;
                        self.balances.get(&decoded.addr).copied().unwrap_or_default().abi_encode()
                    };
                    Ok(Call3Result {
                        success: true,
                        returnData: return_data.into(),
                    })
                })
                .collect()
        }
    }

    fn governance(registry: Address) -> CustomGovernance {
        CustomGovernance {
            id: "s-tn:test".to_string(),
            network: "11155111".to_string(),
            view_id: "test".to_string(),
            delegation_registry: registry,
            subgraph_url: "http://subgraph".to_string(),
        }
    }

    #[tokio::test]
    async fn test_three_node_graph() {
        // A -> B, C -> B, B has not delegated
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        let c = Address::repeat_byte(0xcc);
        let registry = Address::repeat_byte(0x01);

        let chain = FakeChain {
            registry,
            targets: HashMap::new(),
            balances: HashMap::from([(a, U256::from(10u64)), (b, U256::from(5u64)), (c, U256::from(7u64))]),
            batches: AtomicUsize::new(0),
        };

        let scores = compute_onchain_scores(&chain, &governance(registry), &[edge(a, b), edge(c, b)])
            .await
            .unwrap();

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&b], U256::from(22u64));
        assert_eq!(chain.batches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redelegating_delegate_loses_own_balance() {
        // A -> B, B -> D on the registry
        let a = Address::repeat_byte(0xaa);
        let b = Address::repeat_byte(0xbb);
        let d = Address::repeat_byte(0xdd);
        let registry = Address::repeat_byte(0x01);

        let chain = FakeChain {
            registry,
            targets: HashMap::from([(b, d)]),
            balances: HashMap::from([(a, U256::from(10u64)), (b, U256::from(5u64)), (d, U256::from(1u64))]),
            batches: AtomicUsize::new(0),
        };

        let scores = compute_onchain_scores(&chain, &governance(registry), &[edge(a, b), edge(b, d)])
            .await
            .unwrap();

        assert_eq!(scores[&b], U256::from(10u64));
        // D keeps its own balance and receives B's
        assert_eq!(scores[&d], U256::from(6u64));
    }

    #[tokio::test]
    async fn test_empty_delegations_skip_rpc() {
        let chain = FakeChain {
            registry: Address::ZERO,
            targets: HashMap::new(),
            balances: HashMap::new(),
            batches: AtomicUsize::new(0),
        };
        let scores = compute_onchain_scores(&chain, &governance(Address::ZERO), &[]).await.unwrap();
        assert!(scores.is_empty());
        assert_eq!(chain.batches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_view_id_encoding() {
        let raw = format!("0x{}", "ab".repeat(32));
        assert_eq!(view_id_bytes32(&raw).unwrap(), B256::repeat_byte(0xab));

        let text = view_id_bytes32("snapshot.dcl.eth").unwrap();
        assert_eq!(&text[..16], b"snapshot.dcl.eth");
        assert!(text[16..].iter().all(|b| *b == 0));

        assert!(view_id_bytes32(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_short_hex_view_id_is_rejected() {
        let view_ids = [
            "0x01".to_string(),
            "0x".to_string(),
            format!("0x{}", "ab".repeat(31)),
            format!("0x{}", "zz".repeat(32)),
        ];
        for view_id in &view_ids {
            let err = view_id_bytes32(view_id).unwrap_err();
            assert!(matches!(err, DelegatesError::Config(_)), "{view_id}");
        }
    }

    #[tokio::test]
    async fn test_json_rpc_multicall() {
        let balance = U256::from(1_000u64);
        let encoded_results = vec![Call3Result {
            success: true,
            returnData: balance.abi_encode().into(),
        }];
        let output = Bytes::from(abi::aggregate3Call::abi_encode_returns(&(encoded_results,)));

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "eth_call" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": output
            })))
            .mount(&server)
            .await;

        let multicall = JsonRpcMulticall::new(test_client(), format!("{}/{{network}}", server.uri()));
        let results = multicall
            .aggregate3(
                "1",
                vec![Call3 {
                    target: MULTICALL3_ADDRESS,
                    allowFailure: false,
                    callData: abi::getEthBalanceCall { addr: Address::ZERO }.abi_encode().into(),
                }],
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let decoded = abi::getEthBalanceCall::abi_decode_returns(&results[0].returnData, true).unwrap();
        assert_eq!(decoded.balance, balance);
    }

    #[tokio::test]
    async fn test_json_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": { "code": -32000, "message": "execution reverted" }
            })))
            .mount(&server)
            .await;

        let multicall = JsonRpcMulticall::new(test_client(), server.uri());
        match multicall.aggregate3("1", vec![]).await {
            Err(DelegatesError::Rpc(message)) => assert!(message.contains("execution reverted")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(results) => panic!("expected an error, got {} results", results.len()),
        }
    }
}
