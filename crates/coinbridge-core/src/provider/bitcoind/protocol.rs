use crate::error::{CoreError, RpcError};

#[derive(serde::Serialize)]
pub(super) struct JsonRpcRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: Vec<serde_json::Value>,
}

#[derive(serde::Deserialize)]
pub(super) struct JsonRpcResponse {
    pub(super) result: Option<serde_json::Value>,
    pub(super) error: Option<serde_json::Value>,
}

/// Turn a JSON-RPC error object into a `CoreError`.
///
/// `{"code": <int>, "message": <string>}` becomes `ServerError`; any other
/// shape is kept verbatim as `InvalidResponse`.
pub(super) fn parse_jsonrpc_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
    }

    if let Ok(parsed) = serde_json::from_value::<JsonRpcError>(err.clone()) {
        CoreError::Rpc(RpcError::ServerError {
            code: parsed.code,
            message: parsed.message,
        })
    } else {
        CoreError::Rpc(RpcError::InvalidResponse(format!(
            "non-standard JSON-RPC error: {err}"
        )))
    }
}

/// Bitcoin Core's "method not found" code, returned e.g. when the wallet
/// component is disabled.
pub(super) const RPC_METHOD_NOT_FOUND: i64 = -32601;

pub(super) fn is_method_not_found(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::Rpc(RpcError::ServerError { code, .. }) if *code == RPC_METHOD_NOT_FOUND
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_error_becomes_server_error() {
        let err = parse_jsonrpc_error(serde_json::json!({
            "code": -5,
            "message": "Invalid address"
        }));
        assert!(matches!(
            err,
            CoreError::Rpc(RpcError::ServerError { code: -5, ref message }) if message == "Invalid address"
        ));
    }

    #[test]
    fn odd_error_shape_is_kept_verbatim() {
        let err = parse_jsonrpc_error(serde_json::json!("boom"));
        assert!(matches!(err, CoreError::Rpc(RpcError::InvalidResponse(_))));
        assert!(!is_method_not_found(&err));
    }

    #[test]
    fn method_not_found_is_detected() {
        let err = parse_jsonrpc_error(serde_json::json!({
            "code": RPC_METHOD_NOT_FOUND,
            "message": "Method not found"
        }));
        assert!(is_method_not_found(&err));
    }
}
