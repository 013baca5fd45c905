use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::Value;

/// 在响应体中插入 `"success": true`
fn with_success(mut body: Value) -> Value {
    if let Some(map) = body.as_object_mut() {
        map.insert("success".to_string(), Value::Bool(true));
    }
    body
}

pub fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(with_success(body))).into_response()
}

pub fn created(body: Value) -> Response {
    (StatusCode::CREATED, Json(with_success(body))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_flag_is_inserted() {
        let body = with_success(json!({"task_id": "task_1"}));
        assert_eq!(body["success"], true);
        assert_eq!(body["task_id"], "task_1");
    }
}
