//! 配置模板

use axum::{extract::State, response::Response};
use chrono::Utc;
use mlqueue_domain::entities::{short_id, ConfigTemplate};
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::CurrentUser,
    error::{ApiError, ApiJson, ApiResult},
    response::{created, ok},
    routes::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    pub description: Option<String>,
}

pub async fn list_templates(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Response> {
    let templates = state.templates.list(&user.user_id).await?;
    let template_list: Vec<serde_json::Value> = templates
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "config": t.config,
            })
        })
        .collect();

    Ok(ok(json!({ "templates": template_list })))
}

pub async fn create_template(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateTemplateRequest>,
) -> ApiResult<Response> {
    let (Some(name), Some(config)) = (req.name.filter(|n| !n.is_empty()), req.config) else {
        return Err(ApiError::invalid_config("name 与 config 为必填字段"));
    };

    let template = ConfigTemplate {
        id: short_id("template"),
        name,
        config,
        description: req.description,
        created_at: Utc::now(),
        user_id: user.user_id,
    };
    state.templates.create(&template).await?;

    Ok(created(json!({
        "template_id": template.id,
        "name": template.name,
    })))
}
