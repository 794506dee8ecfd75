//! Property tests for the URI codecs.

use proptest::prelude::*;
use rpcpeering::peering::PeeringSessionProposal;
use rpcpeering::uri::{ConnectionUri, PeeringUri, interop};
use url::Url;

fn url_strategy() -> impl Strategy<Value = Url> {
    (
        prop_oneof![Just("http"), Just("https")],
        "[a-z][a-z0-9-]{0,10}\\.example",
        proptest::option::of(1024u16..65535),
        "(/[a-zA-Z0-9_.~-]{1,8}){0,4}",
        proptest::option::of("[a-z]{1,6}=[a-zA-Z0-9%+]{0,8}"),
    )
        .prop_map(|(scheme, host, port, path, query)| {
            let mut raw = format!("{scheme}://{host}");
            if let Some(port) = port {
                raw.push_str(&format!(":{port}"));
            }
            raw.push_str(&path);
            if let Some(query) = query {
                raw.push('?');
                raw.push_str(&query);
            }
            Url::parse(&raw).unwrap()
        })
}

fn protocol_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9:/._+-]{1,16}"
}

proptest! {
    #[test]
    fn connection_uri_round_trips(
        url in url_strategy(),
        protocols in proptest::collection::vec(protocol_strategy(), 1..5),
    ) {
        let uri = ConnectionUri::new(url, protocols).unwrap();
        let decoded: ConnectionUri = uri.to_string().parse().unwrap();
        prop_assert_eq!(decoded, uri);
    }

    #[test]
    fn peering_uri_round_trips(
        topic in "[a-zA-Z0-9+._-]{1,24}",
        url in url_strategy(),
    ) {
        let uri = PeeringUri::new(topic, url).unwrap();
        let encoded = uri.to_string();
        prop_assert!(encoded.starts_with("rpcpeering+"));

        let decoded: PeeringUri = encoded.parse().unwrap();
        prop_assert_eq!(decoded, uri);
    }

    #[test]
    fn embedded_proposal_survives_upgrade(
        topic in "[a-z0-9-]{1,16}",
        url in url_strategy(),
        advertise in proptest::collection::vec(protocol_strategy(), 0..4),
        base in url_strategy(),
    ) {
        let proposal = PeeringSessionProposal { topic, url, advertise };
        let upgraded = interop::upgrade_uri(base.as_str(), &proposal).unwrap();

        prop_assert!(interop::includes_proposal(&upgraded));
        prop_assert_eq!(interop::parse_proposal(&upgraded).unwrap(), Some(proposal.clone()));

        // Upgrading twice replaces rather than duplicates the parameter.
        let twice = interop::upgrade_uri(&upgraded, &proposal).unwrap();
        prop_assert_eq!(twice.matches(interop::PROPOSAL_PARAM).count(), 1);
    }

    #[test]
    fn parsers_never_panic(input in "\\PC{0,64}") {
        let _ = input.parse::<ConnectionUri>();
        let _ = input.parse::<PeeringUri>();
        let _ = interop::parse_proposal(&input);
    }
}
