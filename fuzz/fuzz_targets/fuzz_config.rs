#![no_main]

//! Fuzz target for configuration parsing and validation.
//!
//! # Goal
//! Malformed YAML, odd env references, and bogus route templates must
//! surface as `ConfigError`s, never panics. A config that validates must
//! yield a working session router.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use rpcpeering::config::{RelayConfig, substitute_env_vars, validate};
use rpcpeering::relay::SessionRouter;

#[derive(Arbitrary, Debug)]
struct FuzzConfigInput {
    raw_yaml: Vec<u8>,
    routes: Option<FuzzRoutes>,
}

#[derive(Arbitrary, Debug)]
struct FuzzRoutes {
    create_session: String,
    relay_responder_request: String,
    get_responder: String,
}

fuzz_target!(|input: FuzzConfigInput| {
    if let Ok(text) = std::str::from_utf8(&input.raw_yaml) {
        if let Ok(substituted) = substitute_env_vars(text) {
            if let Ok(config) = serde_saphyr::from_str::<RelayConfig>(&substituted) {
                check(&config);
            }
        }
    }

    if let Some(routes) = input.routes {
        let mut config = RelayConfig::default();
        config.routes.create_session = routes.create_session;
        config.routes.relay_responder_request = routes.relay_responder_request;
        config.routes.get_responder = routes.get_responder;
        check(&config);
    }
});

fn check(config: &RelayConfig) {
    if validate(config).is_ok() {
        SessionRouter::new(&config.routes).expect("validated routes must compile");
    }
}
