//! JSON-RPC dispatch engine.
//!
//! [`RpcServer`] validates an input as a single request or a batch, looks up
//! each method in its [`MethodTable`] and produces the matching responses.
//!
//! # Dispatch Rules
//!
//! - A batch runs all of its elements concurrently; the output keeps input
//!   order and omits notifications.
//! - A request without `id` never produces a response, whatever happens.
//! - A `Method::Notification` never produces a response either, even when
//!   the caller sent an id.
//! - Handler failures become `InternalError` unless the failure already is
//!   an [`RpcError`], which is forwarded verbatim.
//! - A handler panic is contained to its own element.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use super::method::{Method, MethodTable};
use super::types::{JsonRpcId, JsonRpcRequest, JsonRpcResponse, ParsedRequests, RpcOutput};
use crate::error::RpcError;

/// Immutable, cheaply clonable JSON-RPC engine.
#[derive(Clone, Debug)]
pub struct RpcServer {
    methods: Arc<MethodTable>,
}

impl RpcServer {
    pub fn new(methods: MethodTable) -> Self {
        Self {
            methods: Arc::new(methods),
        }
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Handle a raw HTTP body.
    ///
    /// Malformed JSON yields a `ParseError` response with a null id.
    pub async fn handle_bytes(&self, body: &[u8]) -> Option<RpcOutput> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value) => self.handle(value).await,
            Err(e) => {
                debug!(error = %e, "Rejecting malformed JSON-RPC body");
                let error = RpcError::ParseError {
                    details: e.to_string(),
                };
                Some(RpcOutput::Single(JsonRpcResponse::error(
                    Some(JsonRpcId::Null),
                    error.to_jsonrpc_error(),
                )))
            }
        }
    }

    /// Handle a decoded request or batch.
    ///
    /// # Returns
    ///
    /// * `Some(RpcOutput::Single)` - response to a single request
    /// * `Some(RpcOutput::Batch)` - responses to the non-notification
    ///   elements of a batch, in input order (possibly empty)
    /// * `None` - the single request produced no response
    pub async fn handle(&self, input: Value) -> Option<RpcOutput> {
        match super::types::parse_requests(&input) {
            Ok(ParsedRequests::Single(request)) => {
                self.dispatch(request).await.map(RpcOutput::Single)
            }
            Ok(ParsedRequests::Batch(requests)) => {
                let responses = join_all(requests.into_iter().map(|r| self.dispatch(r))).await;
                Some(RpcOutput::Batch(responses.into_iter().flatten().collect()))
            }
            Err(error) => {
                let id = JsonRpcId::salvage(&input);
                debug!(
                    id = ?id,
                    error_type = error.error_type_name(),
                    error = %error,
                    "Rejecting invalid JSON-RPC request"
                );
                Some(RpcOutput::Single(JsonRpcResponse::error(
                    Some(id),
                    error.to_jsonrpc_error(),
                )))
            }
        }
    }

    /// Dispatch a single validated request.
    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        let Some(registered) = self.methods.get(&method) else {
            debug!(method = %method, "Method not found");
            let error = RpcError::MethodNotFound { method };
            return id.map(|id| JsonRpcResponse::error(Some(id), error.to_jsonrpc_error()));
        };

        let outcome = match registered.handler().invoke(params.unwrap_or(Value::Null)) {
            Ok(future) => run_contained(future).await,
            Err(error) => Err(error),
        };

        if let Method::Notification(_) = registered {
            if let Err(error) = outcome {
                debug!(method = %method, error = %error, "Notification handler failed");
            }
            return None;
        }

        let id = id?;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(error) => {
                debug!(
                    method = %method,
                    error_type = error.error_type_name(),
                    "Method call failed"
                );
                JsonRpcResponse::error(Some(id), error.to_jsonrpc_error())
            }
        })
    }
}

/// Run a handler future, converting failures and panics into [`RpcError`].
async fn run_contained(future: super::method::HandlerFuture) -> Result<Value, RpcError> {
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(match err.downcast::<RpcError>() {
            Ok(rpc) => rpc,
            Err(other) => RpcError::InternalError {
                details: format!("{other:#}"),
            },
        }),
        Err(panic_payload) => {
            let panic_msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            warn!(panic = %panic_msg, "JSON-RPC handler panicked");
            Err(RpcError::InternalError {
                details: "handler panicked".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::method::NoParams;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn greeter() -> RpcServer {
        RpcServer::new(
            MethodTable::new()
                .with(
                    "greet",
                    Method::call(|(name,): (String,)| async move { Ok(format!("Hello, {name}!")) }),
                )
                .with(
                    "fail",
                    Method::call(|_: NoParams| async {
                        Err::<(), _>(anyhow::anyhow!("disk on fire"))
                    }),
                )
                .with(
                    "reject",
                    Method::call(|_: NoParams| async {
                        Err::<(), _>(anyhow::Error::new(RpcError::Application {
                            code: 4001,
                            message: "User rejected".to_string(),
                            data: None,
                        }))
                    }),
                )
                .with(
                    "explode",
                    Method::call(|_: NoParams| async {
                        if true {
                            panic!("boom");
                        }
                        Ok(())
                    }),
                )
                .with("log", Method::notification(|_: (String,)| async { Ok(()) })),
        )
    }

    fn single(output: Option<RpcOutput>) -> JsonRpcResponse {
        match output {
            Some(RpcOutput::Single(response)) => response,
            other => panic!("Expected single response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greet_batch() {
        let output = greeter()
            .handle(json!([
                {"jsonrpc":"2.0","id":1,"method":"greet","params":["A"]},
                {"jsonrpc":"2.0","id":2,"method":"greet","params":["B"]}
            ]))
            .await;

        assert_eq!(
            serde_json::to_value(output.unwrap()).unwrap(),
            json!([
                {"jsonrpc":"2.0","id":1,"result":"Hello, A!"},
                {"jsonrpc":"2.0","id":2,"result":"Hello, B!"}
            ])
        );
    }

    #[tokio::test]
    async fn test_batch_omits_notifications_and_keeps_order() {
        let output = greeter()
            .handle(json!([
                {"jsonrpc":"2.0","id":"x","method":"greet","params":["A"]},
                {"jsonrpc":"2.0","method":"greet","params":["skip"]},
                {"jsonrpc":"2.0","id":3,"method":"log","params":["ignored"]},
                {"jsonrpc":"2.0","id":4,"method":"missing"}
            ]))
            .await;

        let Some(RpcOutput::Batch(responses)) = output else {
            panic!("Expected batch");
        };
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].id, Some(JsonRpcId::String("x".to_string())));
        assert_eq!(responses[1].id, Some(JsonRpcId::Number(4)));
        assert_eq!(responses[1].error.as_ref().unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_all_notification_batch_is_empty() {
        let output = greeter()
            .handle(json!([{"jsonrpc":"2.0","method":"greet","params":["A"]}]))
            .await;
        assert_eq!(output, Some(RpcOutput::Batch(vec![])));
    }

    #[tokio::test]
    async fn test_unknown_method_carries_name() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":9,"method":"nope"}))
                .await,
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.data, Some(json!({"method": "nope"})));
    }

    #[tokio::test]
    async fn test_notification_to_unknown_method_is_silent() {
        let output = greeter()
            .handle(json!({"jsonrpc":"2.0","method":"nope"}))
            .await;
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":1,"method":"greet","params":[42]}))
                .await,
        );
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_handler_failure_is_internal_error_with_details() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":1,"method":"fail"}))
                .await,
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, -32603);
        assert_eq!(error.data, Some(json!({"details": "disk on fire"})));
    }

    #[tokio::test]
    async fn test_typed_error_forwarded_verbatim() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":1,"method":"reject"}))
                .await,
        );
        let error = response.error.unwrap();
        assert_eq!(error.code, 4001);
        assert_eq!(error.message, "User rejected");
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_its_element() {
        let output = greeter()
            .handle(json!([
                {"jsonrpc":"2.0","id":1,"method":"explode"},
                {"jsonrpc":"2.0","id":2,"method":"greet","params":["B"]}
            ]))
            .await;

        let Some(RpcOutput::Batch(responses)) = output else {
            panic!("Expected batch");
        };
        assert_eq!(responses[0].error.as_ref().unwrap().code, -32603);
        assert_eq!(responses[1].result, Some(json!("Hello, B!")));
    }

    #[tokio::test]
    async fn test_notification_method_with_id_is_silent() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let server = RpcServer::new(MethodTable::new().with(
            "ping",
            Method::notification(move |_: NoParams| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        ));

        let output = server
            .handle(json!({"jsonrpc":"2.0","id":1,"method":"ping"}))
            .await;
        assert!(output.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_echoes_id() {
        let response = single(greeter().handle(json!({"id":"abc","method":"greet"})).await);
        assert_eq!(response.id, Some(JsonRpcId::String("abc".to_string())));
        assert_eq!(response.error.unwrap().code, -32600);

        let response = single(greeter().handle(json!({"id":{"x":1}})).await);
        assert_eq!(response.id, Some(JsonRpcId::Null));
    }

    #[tokio::test]
    async fn test_invalid_request_echoes_float_id() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":2.5,"method":"greet"}))
                .await,
        );
        assert_eq!(response.error.as_ref().unwrap().code, -32600);
        assert_eq!(serde_json::to_value(&response).unwrap()["id"], json!(2.5));
    }

    #[tokio::test]
    async fn test_mixed_batch_is_single_invalid_request() {
        let response = single(
            greeter()
                .handle(json!([
                    {"jsonrpc":"2.0","id":1,"method":"greet","params":["A"]},
                    "garbage"
                ]))
                .await,
        );
        assert_eq!(response.id, Some(JsonRpcId::Null));
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_null_id_gets_a_response() {
        let response = single(
            greeter()
                .handle(json!({"jsonrpc":"2.0","id":null,"method":"greet","params":["N"]}))
                .await,
        );
        assert_eq!(response.id, Some(JsonRpcId::Null));
        assert_eq!(response.result, Some(json!("Hello, N!")));
    }

    #[tokio::test]
    async fn test_handle_bytes_parse_error() {
        let response = single(greeter().handle_bytes(b"{not json").await);
        assert_eq!(response.id, Some(JsonRpcId::Null));
        assert_eq!(response.error.unwrap().code, -32700);
    }
}
