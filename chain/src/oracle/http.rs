//! HTTP client for the agent service.
//!
//! The service hosts one or more agents and exposes per-agent vote
//! endpoints:
//!
//! ```json
//! POST /{agent}/votegrant
//! { "grantId": "65537", "validatorAddress": "AB12...", "text": "statement" }
//!
//! POST /{agent}/voteproposal
//! { "proposalId": "3", "validatorAddress": "AB12...", "text": "analyze proposal" }
//!
//! Response:
//! { "vote": "yes", "reason": "..." }
//! ```
//!
//! Any vote other than `"yes"` counts as no. The agent id is either
//! configured or discovered from `GET /agents`, taking the first entry.

use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{info, warn};

use super::{Oracle, OracleError};
use crate::metrics::MetricsRegistry;
use crate::types::Proposal;

const PROPOSAL_PROMPT: &str = "analyze proposal";

/// Blocking HTTP oracle.
///
/// `Send + Sync`, so one instance can be shared by the mempool and block
/// paths.
pub struct HttpOracle {
    base_url: String,
    agent_id: String,
    client: Client,
    metrics: Option<MetricsRegistry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteGrantRequest<'a> {
    grant_id: String,
    validator_address: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoteProposalRequest<'a> {
    proposal_id: String,
    validator_address: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct VoteResponse {
    vote: String,
    #[serde(default)]
    reason: String,
}

impl VoteResponse {
    fn approved(&self) -> bool {
        self.vote == "yes"
    }
}

#[derive(Debug, Deserialize)]
struct AgentList {
    agents: Vec<AgentEntry>,
}

#[derive(Debug, Deserialize)]
struct AgentEntry {
    id: String,
}

fn build_client(timeout: Duration) -> Result<Client, OracleError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {e}")))
}

fn join(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl HttpOracle {
    /// Oracle bound to a known agent.
    pub fn new(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            base_url: base_url.into(),
            agent_id: agent_id.into(),
            client: build_client(timeout)?,
            metrics: None,
        })
    }

    /// Oracle bound to the first agent the service lists.
    pub fn discover(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let base_url = base_url.into();
        let client = build_client(timeout)?;
        let url = join(&base_url, "agents");
        let resp = client
            .get(&url)
            .send()
            .map_err(|e| OracleError::Transport(format!("HTTP GET {url} failed: {e}")))?;
        let list: AgentList = read_json(resp)?;
        let agent_id = list
            .agents
            .into_iter()
            .next()
            .map(|a| a.id)
            .ok_or_else(|| OracleError::Protocol("no agent id".to_string()))?;
        info!(%base_url, %agent_id, "oracle agent discovered");
        Ok(Self {
            base_url,
            agent_id,
            client,
            metrics: None,
        })
    }

    /// Records request latency into `metrics`.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    fn endpoint(&self, path: &str) -> String {
        join(&self.base_url, &format!("{}/{}", self.agent_id, path))
    }

    fn post_vote<T: Serialize>(&self, path: &str, body: &T) -> Result<VoteResponse, OracleError> {
        let url = self.endpoint(path);
        let start = Instant::now();
        let result = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|e| OracleError::Transport(format!("HTTP POST {url} failed: {e}")))
            .and_then(read_json::<VoteResponse>);
        if let Some(m) = &self.metrics {
            m.app.oracle_seconds.observe(start.elapsed().as_secs_f64());
        }
        result.inspect_err(|e| warn!(%url, error = %e, "oracle request failed"))
    }
}

fn read_json<T: DeserializeOwned>(resp: reqwest::blocking::Response) -> Result<T, OracleError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(OracleError::Service(format!(
            "agent service returned HTTP status {status}"
        )));
    }
    resp.json::<T>()
        .map_err(|e| OracleError::Protocol(format!("failed to parse JSON response: {e}")))
}

impl Oracle for HttpOracle {
    // The agent service has no admission endpoint; every proposal is
    // processed.
    fn if_process_proposal(&self, _proposer: u64, _data: &[u8]) -> Result<bool, OracleError> {
        Ok(true)
    }

    fn if_accept_proposal(&self, proposal: &Proposal, voter: &str) -> Result<bool, OracleError> {
        let body = VoteProposalRequest {
            proposal_id: proposal.index.to_string(),
            validator_address: voter,
            text: PROPOSAL_PROMPT,
        };
        let vote = self.post_vote("voteproposal", &body)?;
        info!(
            proposal = proposal.index,
            voter,
            vote = %vote.vote,
            reason = %vote.reason,
            "vote proposal"
        );
        Ok(vote.approved())
    }

    fn if_grant_new_member(
        &self,
        grant_id: u64,
        proposer: &str,
        amount: u64,
        statement: &str,
    ) -> Result<bool, OracleError> {
        let body = VoteGrantRequest {
            grant_id: grant_id.to_string(),
            validator_address: proposer,
            text: statement,
        };
        let vote = self.post_vote("votegrant", &body)?;
        info!(
            grant_id,
            proposer,
            amount,
            vote = %vote.vote,
            reason = %vote.reason,
            "vote grant"
        );
        Ok(vote.approved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_request_uses_string_ids() {
        let body = VoteGrantRequest {
            grant_id: 65537u64.to_string(),
            validator_address: "ABCD",
            text: "let me in",
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(
            json,
            r#"{"grantId":"65537","validatorAddress":"ABCD","text":"let me in"}"#
        );
    }

    #[test]
    fn vote_response_can_be_deserialized() {
        let yes: VoteResponse =
            serde_json::from_str(r#"{"vote":"yes","reason":"aligned"}"#).unwrap();
        assert!(yes.approved());
        assert_eq!(yes.reason, "aligned");

        let no: VoteResponse = serde_json::from_str(r#"{"vote":"Yes"}"#).unwrap();
        assert!(!no.approved());
    }

    #[test]
    fn endpoint_avoids_double_slashes() {
        let oracle =
            HttpOracle::new("http://127.0.0.1:3000/", "agent-1", Duration::from_secs(1)).unwrap();
        assert_eq!(
            oracle.endpoint("votegrant"),
            "http://127.0.0.1:3000/agent-1/votegrant"
        );
    }

    #[test]
    fn unreachable_service_is_a_transport_error() {
        // Port 9 (discard) is almost never served.
        let oracle =
            HttpOracle::new("http://127.0.0.1:9", "a", Duration::from_millis(200)).unwrap();
        let err = oracle.if_grant_new_member(1, "A", 1, "s").unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
        assert!(oracle.if_process_proposal(1, b"").unwrap());
    }
}
