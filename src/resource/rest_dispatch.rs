//! REST Dispatch
//!
//! Maps `(resource kind, operation)` pairs to concrete Forge REST calls.
//! Every operation is exactly one outbound request.

use super::registry::ResourceKind;
use crate::forge::ForgeClient;
use anyhow::{Context, Result};
use serde_json::{Map, Value};

/// Path and body fields consumed by URL building
const PATH_PARAMS: &[&str] = &["server_id", "site_id", "id"];

/// Invoke one operation against the Forge API
pub async fn invoke(
    kind: ResourceKind,
    operation: &str,
    client: &ForgeClient,
    params: &Map<String, Value>,
) -> Result<Value> {
    tracing::debug!("invoke: resource={}, operation={}", kind.name(), operation);

    match kind {
        ResourceKind::Servers => invoke_servers(operation, client, params).await,
        ResourceKind::Sites => invoke_sites(operation, client, params).await,
        ResourceKind::Deployments => invoke_deployments(operation, client, params).await,
        ResourceKind::Env => invoke_site_file("env", operation, client, params).await,
        ResourceKind::Nginx => invoke_site_file("nginx", operation, client, params).await,
        ResourceKind::Certificates => invoke_certificates(operation, client, params).await,
        ResourceKind::Databases => invoke_server_crud("databases", operation, client, params).await,
        ResourceKind::DatabaseUsers => {
            invoke_server_crud("database-users", operation, client, params).await
        }
        ResourceKind::Daemons => match operation {
            "restart" => {
                let server = get_param_str(params, "server_id")?;
                let id = get_param_str(params, "id")?;
                let url = client.server_url(&server, &format!("daemons/{}/restart", id));
                client.post(&url, None).await
            }
            _ => invoke_server_crud("daemons", operation, client, params).await,
        },
        ResourceKind::FirewallRules => {
            invoke_server_crud("firewall-rules", operation, client, params).await
        }
        ResourceKind::ScheduledJobs => invoke_server_crud("jobs", operation, client, params).await,
        ResourceKind::SshKeys => invoke_server_crud("keys", operation, client, params).await,
        ResourceKind::Recipes => invoke_recipes(operation, client, params).await,
        ResourceKind::User => match operation {
            "get" => client.get(&client.url("user")).await,
            _ => Err(unknown(kind, operation)),
        },
    }
}

fn unknown(kind: ResourceKind, operation: &str) -> anyhow::Error {
    anyhow::anyhow!("Unknown {} operation: {}", kind.name(), operation)
}

// =============================================================================
// Servers
// =============================================================================

async fn invoke_servers(operation: &str, client: &ForgeClient, params: &Map<String, Value>) -> Result<Value> {
    match operation {
        "list" => client.get(&client.url("servers")).await,
        "get" => {
            let id = get_param_str(params, "id")?;
            client.get(&client.server_url(&id, "")).await
        }
        "create" => client.post(&client.url("servers"), Some(&body(params))).await,
        "update" => {
            let id = get_param_str(params, "id")?;
            client.put(&client.server_url(&id, ""), &body(params)).await
        }
        "delete" => {
            let id = get_param_str(params, "id")?;
            client.delete(&client.server_url(&id, "")).await
        }
        "reboot" => {
            let id = get_param_str(params, "id")?;
            client.post(&client.server_url(&id, "reboot"), None).await
        }
        _ => Err(unknown(ResourceKind::Servers, operation)),
    }
}

// =============================================================================
// Sites
// =============================================================================

async fn invoke_sites(operation: &str, client: &ForgeClient, params: &Map<String, Value>) -> Result<Value> {
    let server = get_param_str(params, "server_id")?;
    match operation {
        "list" => client.get(&client.server_url(&server, "sites")).await,
        "create" => {
            client
                .post(&client.server_url(&server, "sites"), Some(&body(params)))
                .await
        }
        "get" => {
            let id = get_param_str(params, "id")?;
            client.get(&client.site_url(&server, &id, "")).await
        }
        "update" => {
            let id = get_param_str(params, "id")?;
            client.put(&client.site_url(&server, &id, ""), &body(params)).await
        }
        "delete" => {
            let id = get_param_str(params, "id")?;
            client.delete(&client.site_url(&server, &id, "")).await
        }
        _ => Err(unknown(ResourceKind::Sites, operation)),
    }
}

// =============================================================================
// Deployments
// =============================================================================

async fn invoke_deployments(
    operation: &str,
    client: &ForgeClient,
    params: &Map<String, Value>,
) -> Result<Value> {
    let server = get_param_str(params, "server_id")?;
    let site = get_param_str(params, "site_id")?;
    match operation {
        "list" => {
            client
                .get(&client.site_url(&server, &site, "deployment-history"))
                .await
        }
        "get" => {
            let id = get_param_str(params, "id")?;
            client
                .get(&client.site_url(&server, &site, &format!("deployment-history/{}", id)))
                .await
        }
        "output" => {
            let id = get_param_str(params, "id")?;
            client
                .get(&client.site_url(&server, &site, &format!("deployment-history/{}/output", id)))
                .await
        }
        "deploy" => {
            client
                .post(&client.site_url(&server, &site, "deployment/deploy"), None)
                .await
        }
        "log" => {
            let text = client
                .get_text(&client.site_url(&server, &site, "deployment/log"))
                .await?;
            Ok(Value::String(text))
        }
        "script" => {
            let text = client
                .get_text(&client.site_url(&server, &site, "deployment/script"))
                .await?;
            Ok(Value::String(text))
        }
        "update_script" => {
            client
                .put(&client.site_url(&server, &site, "deployment/script"), &body(params))
                .await
        }
        _ => Err(unknown(ResourceKind::Deployments, operation)),
    }
}

// =============================================================================
// Site files (env, nginx)
// =============================================================================

async fn invoke_site_file(
    file: &str,
    operation: &str,
    client: &ForgeClient,
    params: &Map<String, Value>,
) -> Result<Value> {
    let server = get_param_str(params, "server_id")?;
    let site = get_param_str(params, "site_id")?;
    let url = client.site_url(&server, &site, file);
    match operation {
        "get" => Ok(Value::String(client.get_text(&url).await?)),
        "update" => client.put(&url, &body(params)).await,
        _ => Err(anyhow::anyhow!("Unknown {} operation: {}", file, operation)),
    }
}

// =============================================================================
// Certificates
// =============================================================================

async fn invoke_certificates(
    operation: &str,
    client: &ForgeClient,
    params: &Map<String, Value>,
) -> Result<Value> {
    let server = get_param_str(params, "server_id")?;
    let site = get_param_str(params, "site_id")?;
    match operation {
        "list" => client.get(&client.site_url(&server, &site, "certificates")).await,
        "letsencrypt" => {
            client
                .post(
                    &client.site_url(&server, &site, "certificates/letsencrypt"),
                    Some(&body(params)),
                )
                .await
        }
        "get" | "activate" | "delete" => {
            let id = get_param_str(params, "id")?;
            let path = format!("certificates/{}", id);
            match operation {
                "get" => client.get(&client.site_url(&server, &site, &path)).await,
                "activate" => {
                    client
                        .post(&client.site_url(&server, &site, &format!("{}/activate", path)), None)
                        .await
                }
                _ => client.delete(&client.site_url(&server, &site, &path)).await,
            }
        }
        _ => Err(unknown(ResourceKind::Certificates, operation)),
    }
}

// =============================================================================
// Generic server-scoped collections
// =============================================================================

async fn invoke_server_crud(
    collection: &str,
    operation: &str,
    client: &ForgeClient,
    params: &Map<String, Value>,
) -> Result<Value> {
    let server = get_param_str(params, "server_id")?;
    match operation {
        "list" => client.get(&client.server_url(&server, collection)).await,
        "create" => {
            client
                .post(&client.server_url(&server, collection), Some(&body(params)))
                .await
        }
        "get" => {
            let id = get_param_str(params, "id")?;
            client
                .get(&client.server_url(&server, &format!("{}/{}", collection, id)))
                .await
        }
        "delete" => {
            let id = get_param_str(params, "id")?;
            client
                .delete(&client.server_url(&server, &format!("{}/{}", collection, id)))
                .await
        }
        _ => Err(anyhow::anyhow!("Unknown {} operation: {}", collection, operation)),
    }
}

// =============================================================================
// Recipes
// =============================================================================

async fn invoke_recipes(operation: &str, client: &ForgeClient, params: &Map<String, Value>) -> Result<Value> {
    match operation {
        "list" => client.get(&client.url("recipes")).await,
        "create" => client.post(&client.url("recipes"), Some(&body(params))).await,
        "get" => {
            let id = get_param_str(params, "id")?;
            client.get(&client.url(&format!("recipes/{}", id))).await
        }
        "delete" => {
            let id = get_param_str(params, "id")?;
            client.delete(&client.url(&format!("recipes/{}", id))).await
        }
        "run" => {
            let id = get_param_str(params, "id")?;
            client
                .post(&client.url(&format!("recipes/{}/run", id)), Some(&body(params)))
                .await
        }
        _ => Err(unknown(ResourceKind::Recipes, operation)),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Read a path parameter; numeric values are accepted as-is
fn get_param_str(params: &Map<String, Value>, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .context(format!("Missing required parameter: {}", key))
}

/// Request body: every parameter that is not part of the URL
fn body(params: &Map<String, Value>) -> Value {
    Value::Object(
        params
            .iter()
            .filter(|(k, _)| !PATH_PARAMS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_param_str_accepts_numbers() {
        let params = json!({"server_id": 12, "site_id": "34"});
        let map = params.as_object().unwrap();
        assert_eq!(get_param_str(map, "server_id").unwrap(), "12");
        assert_eq!(get_param_str(map, "site_id").unwrap(), "34");
        assert!(get_param_str(map, "id").is_err());
    }

    #[test]
    fn test_body_strips_path_params() {
        let params = json!({"server_id": 1, "site_id": 2, "id": 3, "content": "APP_ENV=prod"});
        let out = body(params.as_object().unwrap());
        assert_eq!(out, json!({"content": "APP_ENV=prod"}));
    }
}
