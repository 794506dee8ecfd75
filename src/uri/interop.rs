//! Embedding peering proposals into third-party connection URIs.
//!
//! A proposal rides along in any URI (for example a WalletConnect `wc:`
//! pairing URI) as the query parameter [`PROPOSAL_PARAM`], whose value is
//! the unpadded base64url encoding of the proposal's JSON. Wallets that
//! understand the parameter can peer directly; others ignore it. Padded
//! values are accepted on decode.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use super::{UriError, parse_url};
use crate::peering::PeeringSessionProposal;

/// Query parameter carrying the encoded proposal.
pub const PROPOSAL_PARAM: &str = "org.rpcpeering.proposal";

// base64url, unpadded on encode, padding optional on decode.
const PROPOSAL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// True iff `uri` carries a decodable proposal.
pub fn includes_proposal(uri: &str) -> bool {
    matches!(parse_proposal(uri), Ok(Some(_)))
}

/// Set the proposal parameter on `uri`, replacing any previous value.
///
/// Other query parameters keep their order.
///
/// # Errors
///
/// - `InvalidUrl` if `uri` is not an absolute URI
/// - `InvalidProposal` if the proposal cannot be serialized
pub fn upgrade_uri(uri: &str, proposal: &PeeringSessionProposal) -> Result<String, UriError> {
    let mut url = parse_url(uri)?;
    let json = serde_json::to_vec(proposal).map_err(|e| UriError::InvalidProposal {
        reason: e.to_string(),
    })?;
    let encoded = PROPOSAL_ENGINE.encode(json);

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != PROPOSAL_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(PROPOSAL_PARAM, &encoded);

    Ok(url.into())
}

/// Extract the embedded proposal.
///
/// # Returns
///
/// * `Ok(None)` - the parameter is absent
/// * `Ok(Some(proposal))` - the parameter decoded cleanly
///
/// # Errors
///
/// - `InvalidUrl` if `uri` is not an absolute URI
/// - `InvalidProposal` if the parameter is present but undecodable
pub fn parse_proposal(uri: &str) -> Result<Option<PeeringSessionProposal>, UriError> {
    let url = parse_url(uri)?;
    let Some((_, encoded)) = url.query_pairs().find(|(key, _)| key == PROPOSAL_PARAM) else {
        return Ok(None);
    };

    let json = PROPOSAL_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|e| UriError::InvalidProposal {
            reason: e.to_string(),
        })?;
    let proposal = serde_json::from_slice(&json).map_err(|e| UriError::InvalidProposal {
        reason: e.to_string(),
    })?;
    Ok(Some(proposal))
}
