//! Integration tests for the Forge HTTP client using wiremock
//!
//! These tests verify the REST executor and HTTP client against mocked
//! endpoints: URL building, envelope unwrapping, error classification
//! and the full deploy-and-wait flow.

use std::sync::Arc;
use std::time::Duration;

use forge_mcp::forge::{format_forge_error, ApiError, ErrorClass, ForgeHttpClient};
use forge_mcp::resource::{Credentials, ResourceExecutor, ResourceKind, RestExecutor};
use forge_mcp::{Gateway, GatewaySettings};
use serde_json::{json, Map, Value};
use wiremock::matchers::{bearer_token, body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn executor(server: &MockServer) -> RestExecutor {
    RestExecutor::new(ForgeHttpClient::new().unwrap(), &server.uri())
}

fn creds() -> Credentials {
    Credentials::new("test-token")
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Test module for REST executor integration tests
mod rest_executor_tests {
    use super::*;

    /// Collection responses are unwrapped to the array
    #[tokio::test]
    async fn test_list_servers_unwraps_collection() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": 1, "name": "production", "ip_address": "10.0.0.1"},
                    {"id": 2, "name": "staging", "ip_address": "10.0.0.2"}
                ]
            })))
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute(ResourceKind::Servers, "list", &Map::new(), &creds())
            .await
            .expect("list should succeed")
            .expect("list returns a payload");

        assert_eq!(result.as_array().unwrap().len(), 2);
        assert_eq!(result[1]["name"], "staging");
    }

    /// Site-scoped item responses are unwrapped to the object
    #[tokio::test]
    async fn test_get_site_unwraps_item() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers/1/sites/7"))
            .and(bearer_token("test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "site": {"id": 7, "name": "example.com", "deployment_status": null}
            })))
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute(ResourceKind::Sites, "get", &args(json!({"server_id": 1, "id": "7"})), &creds())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["name"], "example.com");
    }

    /// Empty responses are void results
    #[tokio::test]
    async fn test_reboot_empty_body_is_void() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/servers/3/reboot"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute(ResourceKind::Servers, "reboot", &args(json!({"id": 3})), &creds())
            .await
            .unwrap();

        assert!(result.is_none());
    }

    /// Path parameters never leak into the request body
    #[tokio::test]
    async fn test_create_body_excludes_path_params() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/servers/1/keys"))
            .and(body_json(json!({"name": "laptop", "key": "ssh-ed25519 AAAA"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "key": {"id": 11, "name": "laptop", "status": "installing"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute(
                ResourceKind::SshKeys,
                "create",
                &args(json!({"server_id": 1, "name": "laptop", "key": "ssh-ed25519 AAAA"})),
                &creds(),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result["id"], 11);
    }

    /// Deployment logs are plain text
    #[tokio::test]
    async fn test_deployment_log_is_text() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers/1/sites/2/deployment/log"))
            .respond_with(ResponseTemplate::new(200).set_body_string("git pull\ncomposer install\n"))
            .mount(&server)
            .await;

        let result = executor(&server)
            .execute(
                ResourceKind::Deployments,
                "log",
                &args(json!({"server_id": "1", "site_id": "2"})),
                &creds(),
            )
            .await
            .unwrap();

        assert_eq!(result, Some(json!("git pull\ncomposer install\n")));
    }
}

/// Test module for error classification
mod error_tests {
    use super::*;

    /// 404 carries the status and a lookup hint
    #[tokio::test]
    async fn test_404_is_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers/999"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found."})))
            .mount(&server)
            .await;

        let err = executor(&server)
            .execute(ResourceKind::Servers, "get", &args(json!({"id": 999})), &creds())
            .await
            .unwrap_err();

        let api = err.downcast_ref::<ApiError>().expect("ApiError inside anyhow");
        assert_eq!(api.status, 404);
        assert_eq!(api.class(), ErrorClass::NotFound);
        assert!(format_forge_error(&err).contains("resolve"));
    }

    /// 422 validation errors name the offending fields
    #[tokio::test]
    async fn test_422_lists_field_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/servers/1/databases"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "The given data was invalid.",
                "errors": {"name": ["The name has already been taken."]}
            })))
            .mount(&server)
            .await;

        let err = executor(&server)
            .execute(ResourceKind::Databases, "create", &args(json!({"server_id": 1, "name": "app"})), &creds())
            .await
            .unwrap_err();

        let text = format_forge_error(&err);
        assert!(text.contains("422"));
        assert!(text.contains("name: The name has already been taken."));
    }

    /// A response slower than the client deadline fails instead of hanging
    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"servers": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = ForgeHttpClient::with_timeout(Duration::from_millis(200)).unwrap();
        let result = RestExecutor::new(client, &server.uri())
            .execute(ResourceKind::Servers, "list", &Map::new(), &creds())
            .await;

        assert!(result.is_err());
    }

    /// A rejected token maps to the authentication hint
    #[tokio::test]
    async fn test_401_hint_mentions_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
            .mount(&server)
            .await;

        let err = executor(&server)
            .execute(ResourceKind::User, "get", &Map::new(), &creds())
            .await
            .unwrap_err();

        assert!(format_forge_error(&err).contains("API token"));
    }
}

/// Test module for the gateway over the REST executor
mod gateway_tests {
    use super::*;

    fn gateway(server: &MockServer) -> Gateway {
        Gateway::new(Arc::new(executor(server)), GatewaySettings::default())
    }

    /// A server name is resolved with one list call, then used as the id
    #[tokio::test]
    async fn test_get_server_by_name() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/servers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [{"id": 1, "name": "production"}, {"id": 2, "name": "staging"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "server": {"id": 2, "name": "staging", "ip_address": "10.0.0.2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let result = gw
            .handle(
                &json!({"resource": "servers", "action": "get", "id": "staging"}),
                &gw.context(Credentials::new("test-token")),
            )
            .await;

        assert!(!result.is_error, "{}", result.text);
        assert_eq!(result.data.unwrap()["ip_address"], "10.0.0.2");
    }

    /// Deploy-and-wait drives trigger, poll, log and history endpoints
    #[tokio::test]
    async fn test_deploy_and_wait_end_to_end() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/servers/1/sites/2/deployment/deploy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "site": {"id": 2, "deployment_status": "deploying"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/1/sites/2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "site": {"id": 2, "deployment_status": null}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/1/sites/2/deployment/log"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Deployed"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/servers/1/sites/2/deployment-history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "deployments": [{"id": 40, "status": "finished"}]
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let result = gw
            .handle(
                &json!({
                    "resource": "deployments",
                    "action": "deploy_and_wait",
                    "server_id": 1,
                    "site_id": 2,
                    "poll_interval_ms": 10,
                    "timeout_ms": 5000
                }),
                &gw.context(Credentials::new("test-token")),
            )
            .await;

        assert!(!result.is_error, "{}", result.text);
        let data = result.data.unwrap();
        assert_eq!(data["status"], "success");
        assert_eq!(data["log"], "Deployed");
    }

    /// A failed trigger surfaces as an error result
    #[tokio::test]
    async fn test_deploy_trigger_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/servers/1/sites/2/deployment/deploy"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Server Error"})))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let result = gw
            .handle(
                &json!({"resource": "deployments", "action": "deploy_and_wait", "server_id": 1, "site_id": 2}),
                &gw.context(Credentials::new("test-token")),
            )
            .await;

        assert!(result.is_error);
        assert!(result.text.contains("500"));
    }
}
