//! Session proposals exchanged during the peering handshake.

use serde::{Deserialize, Serialize};
use url::Url;

/// What one party offers when peering.
///
/// Acceptance is decided by `topic` equality alone; `advertise` lists the
/// protocols the party can speak and is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringSessionProposal {
    pub topic: String,
    pub url: Url,
    pub advertise: Vec<String>,
}

impl PeeringSessionProposal {
    /// True when both proposals name the same topic.
    pub fn is_compatible_with(&self, other: &PeeringSessionProposal) -> bool {
        self.topic == other.topic
    }
}

/// Outcome of a `peer` call.
///
/// Wire form: `{"accepted": true, "proposal": {...}}` or
/// `{"accepted": false}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireResult", try_from = "WireResult")]
pub enum PeeringProposalResult {
    Accepted { proposal: PeeringSessionProposal },
    Rejected,
}

#[derive(Serialize, Deserialize)]
struct WireResult {
    accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    proposal: Option<PeeringSessionProposal>,
}

impl From<PeeringProposalResult> for WireResult {
    fn from(result: PeeringProposalResult) -> Self {
        match result {
            PeeringProposalResult::Accepted { proposal } => Self {
                accepted: true,
                proposal: Some(proposal),
            },
            PeeringProposalResult::Rejected => Self {
                accepted: false,
                proposal: None,
            },
        }
    }
}

impl TryFrom<WireResult> for PeeringProposalResult {
    type Error = String;

    fn try_from(wire: WireResult) -> Result<Self, Self::Error> {
        match (wire.accepted, wire.proposal) {
            (true, Some(proposal)) => Ok(Self::Accepted { proposal }),
            (true, None) => Err("accepted result is missing its proposal".to_string()),
            (false, _) => Ok(Self::Rejected),
        }
    }
}
