//! Typed method registration.
//!
//! A [`Method`] pairs a handler with its dispatch kind. Handlers take typed
//! parameters (`DeserializeOwned`) and return typed results (`Serialize`);
//! the erasure to `serde_json::Value` happens once, here, so the engine only
//! ever sees JSON.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;

/// Future produced by an erased handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Value>>;

type ErasedHandler = dyn Fn(Value) -> Result<HandlerFuture, RpcError> + Send + Sync;

/// Type-erased method handler.
///
/// Invoking validates the params synchronously; a validation failure never
/// reaches the user handler.
#[derive(Clone)]
pub struct MethodHandler {
    inner: Arc<ErasedHandler>,
}

impl MethodHandler {
    fn new<P, R, F, Fut>(handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let inner = move |params: Value| -> Result<HandlerFuture, RpcError> {
            let params: P =
                serde_json::from_value(params).map_err(|e| RpcError::InvalidParams {
                    details: e.to_string(),
                })?;
            Ok(handler(params)
                .map(|result| result.and_then(|r| Ok(serde_json::to_value(r)?)))
                .boxed())
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Validate `params` and start the handler.
    ///
    /// Absent params are passed as `null`.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::InvalidParams` when `params` does not fit the
    /// handler's parameter type.
    pub fn invoke(&self, params: Value) -> Result<HandlerFuture, RpcError> {
        (self.inner)(params)
    }
}

impl std::fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MethodHandler")
    }
}

/// A registered method.
///
/// `Call` results are wrapped into responses. `Notification` handlers run
/// for their effect only: their results are discarded and their failures
/// swallowed, even when the caller supplied an id.
#[derive(Clone, Debug)]
pub enum Method {
    Call(MethodHandler),
    Notification(MethodHandler),
}

impl Method {
    /// Register a request/response method.
    pub fn call<P, R, F, Fut>(handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        Method::Call(MethodHandler::new(handler))
    }

    /// Register a fire-and-forget method.
    pub fn notification<P, F, Fut>(handler: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Method::Notification(MethodHandler::new(handler))
    }

    pub fn handler(&self) -> &MethodHandler {
        match self {
            Method::Call(h) | Method::Notification(h) => h,
        }
    }

    pub fn is_notification(&self) -> bool {
        matches!(self, Method::Notification(_))
    }
}

/// Method name to [`Method`] table.
///
/// Tables merge with [`MethodTable::merge`], so protocol method sets (such as
/// the peering methods) can be mounted next to application methods.
#[derive(Clone, Debug, Default)]
pub struct MethodTable {
    methods: HashMap<String, Method>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under `name`, replacing any previous entry.
    pub fn with(mut self, name: impl Into<String>, method: Method) -> Self {
        self.insert(name, method);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, method: Method) {
        self.methods.insert(name.into(), method);
    }

    /// Add every method from `other`; entries in `other` win on conflict.
    pub fn merge(mut self, other: MethodTable) -> Self {
        self.methods.extend(other.methods);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Parameter type for methods that take nothing.
///
/// Accepts absent params (`null`), `[]`, and `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoParams;

impl<'de> Deserialize<'de> for NoParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(NoParams),
            Value::Array(items) if items.is_empty() => Ok(NoParams),
            Value::Object(map) if map.is_empty() => Ok(NoParams),
            other => Err(de::Error::custom(format!(
                "method takes no parameters, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_typed_params_and_result() {
        let method = Method::call(|(name,): (String,)| async move {
            Ok(format!("Hello, {name}!"))
        });

        let result = method
            .handler()
            .invoke(json!(["A"]))
            .expect("params should validate")
            .await
            .expect("handler should succeed");
        assert_eq!(result, json!("Hello, A!"));
    }

    #[test]
    fn test_invalid_params_never_reach_handler() {
        let method = Method::call(|(name,): (String,)| async move { Ok(name) });

        let err = method.handler().invoke(json!([1])).err().expect("should fail");
        assert!(matches!(err, RpcError::InvalidParams { .. }));
    }

    #[test]
    fn test_no_params_accepts_empty_shapes() {
        for value in [json!(null), json!([]), json!({})] {
            assert_eq!(serde_json::from_value::<NoParams>(value).unwrap(), NoParams);
        }
        assert!(serde_json::from_value::<NoParams>(json!([1])).is_err());
    }

    #[test]
    fn test_table_merge_prefers_other() {
        let base = MethodTable::new()
            .with("a", Method::call(|_: NoParams| async { Ok(1) }))
            .with("b", Method::call(|_: NoParams| async { Ok(2) }));
        let other = MethodTable::new().with("b", Method::notification(|_: NoParams| async { Ok(()) }));

        let merged = base.merge(other);
        assert_eq!(merged.len(), 2);
        assert!(merged.get("b").is_some_and(Method::is_notification));
        assert!(merged.get("a").is_some_and(|m| !m.is_notification()));
    }
}
