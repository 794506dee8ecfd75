#![no_main]

//! Fuzz target for the connection, peering, and proposal URI codecs.
//!
//! # Goal
//! Malformed URIs must never panic, and anything that parses must encode
//! back to an equal value.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use rpcpeering::uri::{ConnectionUri, PeeringUri, interop};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    raw: Vec<u8>,
    /// Prefix the raw bytes with a valid scheme to get past the first check.
    scheme: FuzzScheme,
}

#[derive(Arbitrary, Debug)]
enum FuzzScheme {
    None,
    Connection,
    Peering(Vec<u8>),
}

fuzz_target!(|input: FuzzInput| {
    let body = String::from_utf8_lossy(&input.raw);
    let candidate = match input.scheme {
        FuzzScheme::None => body.into_owned(),
        FuzzScheme::Connection => format!("rpcpeering-v1:{body}"),
        FuzzScheme::Peering(topic) => {
            format!("rpcpeering+{}:{body}", String::from_utf8_lossy(&topic))
        }
    };

    if let Ok(uri) = candidate.parse::<ConnectionUri>() {
        let again: ConnectionUri = uri
            .to_string()
            .parse()
            .expect("encoded connection URI must decode");
        assert_eq!(again, uri);
    }

    if let Ok(uri) = candidate.parse::<PeeringUri>() {
        let again: PeeringUri = uri
            .to_string()
            .parse()
            .expect("encoded peering URI must decode");
        assert_eq!(again, uri);
    }

    if let Ok(Some(proposal)) = interop::parse_proposal(&candidate) {
        let upgraded = interop::upgrade_uri(&candidate, &proposal)
            .expect("a URI carrying a proposal can be upgraded");
        assert_eq!(interop::parse_proposal(&upgraded).ok().flatten(), Some(proposal));
    }
});
