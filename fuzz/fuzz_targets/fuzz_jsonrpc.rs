#![no_main]

//! Fuzz target for JSON-RPC 2.0 dispatch.
//!
//! # Goal
//! Arbitrary bodies must never panic the engine, and every response must
//! be a well-formed JSON-RPC 2.0 response.

use std::sync::LazyLock;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Value, json};

use rpcpeering::jsonrpc::{Method, MethodTable, RpcOutput, RpcServer};

#[derive(Arbitrary, Debug)]
struct FuzzJsonRpcInput {
    raw_bytes: Vec<u8>,
    structured: Option<Vec<StructuredRequest>>,
}

#[derive(Arbitrary, Debug)]
struct StructuredRequest {
    id: IdType,
    method: FuzzMethod,
    params: ParamsType,
    correct_version: bool,
}

#[derive(Arbitrary, Debug)]
enum IdType {
    Integer(i64),
    String(String),
    Null,
    Missing,
    Float(f64),
    Object,
}

#[derive(Arbitrary, Debug)]
enum FuzzMethod {
    Echo,
    Fail,
    Log,
    Other(String),
}

#[derive(Arbitrary, Debug)]
enum ParamsType {
    Missing,
    Array(Vec<i32>),
    Object(Vec<(String, i32)>),
    Scalar(i64),
}

static RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
});

static SERVER: LazyLock<RpcServer> = LazyLock::new(|| {
    RpcServer::new(
        MethodTable::new()
            .with("echo", Method::call(|p: Value| async move { Ok(p) }))
            .with(
                "fail",
                Method::call(|_: Value| async { Err::<Value, _>(anyhow::anyhow!("boom")) }),
            )
            .with("log", Method::notification(|_: Value| async { Ok(()) })),
    )
});

impl StructuredRequest {
    fn to_json(&self) -> Value {
        let mut request = serde_json::Map::new();
        request.insert(
            "jsonrpc".into(),
            json!(if self.correct_version { "2.0" } else { "1.0" }),
        );
        let method = match &self.method {
            FuzzMethod::Echo => "echo",
            FuzzMethod::Fail => "fail",
            FuzzMethod::Log => "log",
            FuzzMethod::Other(name) => name.as_str(),
        };
        request.insert("method".into(), json!(method));
        match &self.id {
            IdType::Integer(n) => {
                request.insert("id".into(), json!(n));
            }
            IdType::String(s) => {
                request.insert("id".into(), json!(s));
            }
            IdType::Null => {
                request.insert("id".into(), Value::Null);
            }
            IdType::Missing => {}
            IdType::Float(f) => {
                request.insert("id".into(), json!(f));
            }
            IdType::Object => {
                request.insert("id".into(), json!({"nested": true}));
            }
        }
        match &self.params {
            ParamsType::Missing => {}
            ParamsType::Array(items) => {
                request.insert("params".into(), json!(items));
            }
            ParamsType::Object(pairs) => {
                let map: serde_json::Map<String, Value> =
                    pairs.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
                request.insert("params".into(), Value::Object(map));
            }
            ParamsType::Scalar(n) => {
                request.insert("params".into(), json!(n));
            }
        }
        Value::Object(request)
    }
}

fn check_output(output: Option<RpcOutput>) {
    let Some(output) = output else { return };
    let value = serde_json::to_value(&output).expect("responses serialize");
    let responses = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    for response in responses {
        assert_eq!(response["jsonrpc"], "2.0");
        assert!(response.get("result").is_some() != response.get("error").is_some());
    }
}

fuzz_target!(|input: FuzzJsonRpcInput| {
    RUNTIME.block_on(async {
        check_output(SERVER.handle_bytes(&input.raw_bytes).await);

        if let Some(requests) = input.structured {
            let body = match requests.as_slice() {
                [single] => single.to_json(),
                many => Value::Array(many.iter().map(StructuredRequest::to_json).collect()),
            };
            check_output(SERVER.handle(body).await);
        }
    });
});
