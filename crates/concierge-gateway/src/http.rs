//! reqwest implementation of [`BackendGateway`] against the storefront REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use concierge_core::config::BackendConfig;
use concierge_core::{
    AssistantReply, Conversation, ConversationId, ConversationSummary, MessageId, QuickAction,
    Rating, ReportResult, Suggestion,
};

use crate::backend::BackendGateway;
use crate::error::GatewayError;
use crate::wire::{
    ChatRequestBody, ConversationListPayload, ConversationPayload, FeedbackBody,
    ReportRequestBody, WireChatReply, WireQuickActions, WireReport, WireSuggestions,
};

/// Gateway speaking JSON over HTTP with an optional bearer token.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    api_root: String,
    token: Option<String>,
}

impl HttpGateway {
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let base = config.base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(GatewayError::invalid_request(format!(
                "base url must be http(s), got '{}'",
                config.base_url
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| GatewayError::network(format!("failed to build HTTP client: {}", e)))?;
        let token = Some(config.api_token.trim().to_string()).filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("No API token configured; requests will be anonymous");
        }
        Ok(Self {
            client,
            api_root: format!("{}/api", base),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and return the body of a 2xx answer; anything else is classified.
    async fn execute(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "Backend returned error status");
            return Err(GatewayError::from_status(status.as_u16(), &body));
        }
        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        debug!(path, "GET");
        let body = self.execute(self.client.get(self.url(path))).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<T, GatewayError> {
        debug!(path, "POST");
        let body = self
            .execute(self.client.post(self.url(path)).json(payload))
            .await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn conversation_path(id: &ConversationId) -> Result<String, GatewayError> {
    let raw = id.as_str();
    if raw.is_empty() || raw.contains(['/', '?', '#']) {
        return Err(GatewayError::invalid_request(format!(
            "conversation id '{}' cannot be used in a path",
            raw
        )));
    }
    Ok(format!("/assistant/conversations/{}/", raw))
}

#[async_trait]
impl BackendGateway for HttpGateway {
    async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<AssistantReply, GatewayError> {
        let body = ChatRequestBody {
            message: text,
            conversation_id: conversation_id.map(|id| id.as_str()),
        };
        let reply: WireChatReply = self.post_json("/assistant/chat/", &body).await?;
        reply.validate()
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        let payload: ConversationListPayload = self.get_json("/assistant/conversations/").await?;
        Ok(payload.into_summaries())
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<Conversation, GatewayError> {
        let payload: ConversationPayload = self.get_json(&conversation_path(id)?).await?;
        payload.into_conversation()
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError> {
        let path = format!("{}delete/", conversation_path(id)?);
        debug!(path = %path, "DELETE");
        self.execute(self.client.delete(self.url(&path))).await?;
        Ok(())
    }

    async fn send_feedback(
        &self,
        message_id: &MessageId,
        rating: Rating,
        comment: Option<&str>,
    ) -> Result<(), GatewayError> {
        let body = FeedbackBody {
            message: message_id.as_str(),
            rating: rating.value(),
            comment: comment.unwrap_or(""),
        };
        debug!(path = "/assistant/feedback/", "POST");
        self.execute(self.client.post(self.url("/assistant/feedback/")).json(&body))
            .await?;
        Ok(())
    }

    async fn quick_actions(&self) -> Result<Vec<QuickAction>, GatewayError> {
        let payload: WireQuickActions = self.get_json("/assistant/quick-actions/").await?;
        Ok(payload.into_quick_actions())
    }

    async fn suggestions(&self) -> Result<Vec<Suggestion>, GatewayError> {
        let payload: WireSuggestions = self.get_json("/assistant/suggestions/").await?;
        Ok(payload.into_suggestions())
    }

    async fn generate_report(&self, query: &str) -> Result<ReportResult, GatewayError> {
        let payload: WireReport = self
            .post_json("/reports/ai/generate/", &ReportRequestBody { query })
            .await?;
        payload.validate(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    // =========================================================================
    // Test server
    // =========================================================================

    #[derive(Clone, Default)]
    struct Seen {
        bodies: Arc<Mutex<Vec<Value>>>,
        auth: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl Seen {
        fn record(&self, headers: &HeaderMap, body: Value) {
            self.auth.lock().unwrap().push(
                headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            );
            self.bodies.lock().unwrap().push(body);
        }
    }

    fn message(id: &str, role: &str, content: &str) -> Value {
        json!({
            "id": id,
            "role": role,
            "content": content,
            "suggested_actions": [],
            "related_resources": [],
            "created_at": "2025-10-27T14:03:11Z"
        })
    }

    fn router(seen: Seen) -> Router {
        let chat_seen = seen.clone();
        let feedback_seen = seen.clone();
        let report_seen = seen.clone();
        let delete_seen = seen;
        Router::new()
            .route(
                "/api/assistant/chat/",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = chat_seen.clone();
                    async move {
                        seen.record(&headers, body.clone());
                        if body["message"] == "boom" {
                            return (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(json!({"success": false, "error": "Error al procesar el mensaje"})),
                            );
                        }
                        let conversation_id = body["conversation_id"]
                            .as_str()
                            .unwrap_or("new-conv")
                            .to_string();
                        (
                            StatusCode::OK,
                            Json(json!({
                                "success": true,
                                "conversation_id": conversation_id,
                                "message": message("a1", "assistant", "Hola, ¿en qué te ayudo?"),
                                "user_role": "employee"
                            })),
                        )
                    }
                }),
            )
            .route(
                "/api/assistant/conversations/",
                get(|| async {
                    Json(json!([
                        {"id": "c2", "title": "Segunda", "started_at": "2025-10-27T15:00:00Z",
                         "last_message_at": "2025-10-27T15:01:00Z", "is_active": true, "message_count": 2},
                        {"id": "c1", "title": "Primera", "started_at": "2025-10-27T14:00:00Z",
                         "last_message_at": "2025-10-27T14:01:00Z", "is_active": true, "message_count": 2}
                    ]))
                }),
            )
            .route(
                "/api/assistant/conversations/{id}/",
                get(|Path(id): Path<String>| async move {
                    if id == "missing" {
                        return (
                            StatusCode::NOT_FOUND,
                            Json(json!({"detail": "No encontrado."})),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!({
                            "id": id,
                            "title": "Ventas",
                            "started_at": "2025-10-27T14:00:00Z",
                            "last_message_at": "2025-10-27T14:01:00Z",
                            "is_active": true,
                            "messages": [
                                message("m1", "user", "¿Cómo vendo?"),
                                message("m2", "assistant", "Usa el POS")
                            ]
                        })),
                    )
                }),
            )
            .route(
                "/api/assistant/conversations/{id}/delete/",
                delete(move |headers: HeaderMap, Path(id): Path<String>| {
                    let seen = delete_seen.clone();
                    async move {
                        seen.record(&headers, json!({"deleted": id}));
                        Json(json!({"success": true, "message": "Conversación eliminada"}))
                    }
                }),
            )
            .route(
                "/api/assistant/feedback/",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = feedback_seen.clone();
                    async move {
                        seen.record(&headers, body);
                        (StatusCode::CREATED, Json(json!({"id": 1})))
                    }
                }),
            )
            .route(
                "/api/assistant/quick-actions/",
                get(|| async {
                    Json(json!({
                        "success": true,
                        "role": "employee",
                        "quick_actions": [{"label": "🛒 POS", "url": "/pos", "icon": "shopping-cart"}]
                    }))
                }),
            )
            .route(
                "/api/assistant/suggestions/",
                get(|| async {
                    Json(json!({"success": true, "role": "employee", "suggestions": ["¿Cómo registro una venta?"]}))
                }),
            )
            .route(
                "/api/reports/ai/generate/",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = report_seen.clone();
                    async move {
                        seen.record(&headers, body.clone());
                        if body["query"] == "" {
                            return (
                                StatusCode::BAD_REQUEST,
                                Json(json!({"detail": "La consulta no puede estar vacía"})),
                            );
                        }
                        (
                            StatusCode::OK,
                            Json(json!({
                                "query": body["query"],
                                "interpretation": {"type": "sales", "entity": "product", "period": "week", "metric": "total"},
                                "data": [{"product": "Café", "total": 10}],
                                "column_keys": ["product", "total"],
                                "columns": ["Producto", "Total"],
                                "summary": "Café lidera"
                            })),
                        )
                    }
                }),
            )
    }

    async fn spawn_backend(token: &str) -> (HttpGateway, Seen) {
        let seen = Seen::default();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(seen.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let config = BackendConfig {
            base_url: format!("http://{}/", addr),
            api_token: token.to_string(),
            timeout_secs: 5,
        };
        (HttpGateway::new(&config).unwrap(), seen)
    }

    // =========================================================================
    // Construction
    // =========================================================================

    #[test]
    fn test_new_rejects_non_http_url() {
        let config = BackendConfig {
            base_url: "ftp://example.com".to_string(),
            ..BackendConfig::default()
        };
        let err = HttpGateway::new(&config).unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::InvalidRequest);
    }

    #[test]
    fn test_api_root_strips_trailing_slash() {
        let config = BackendConfig {
            base_url: "https://tienda.example.com/".to_string(),
            ..BackendConfig::default()
        };
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(
            gateway.url("/assistant/chat/"),
            "https://tienda.example.com/api/assistant/chat/"
        );
    }

    #[test]
    fn test_conversation_path_rejects_separators() {
        assert!(conversation_path(&ConversationId::new("a/b")).is_err());
        assert!(conversation_path(&ConversationId::new("")).is_err());
        assert_eq!(
            conversation_path(&ConversationId::new("c1")).unwrap(),
            "/assistant/conversations/c1/"
        );
    }

    // =========================================================================
    // Round trips
    // =========================================================================

    #[tokio::test]
    async fn test_send_message_new_conversation() {
        let (gateway, seen) = spawn_backend("tok").await;
        let reply = gateway.send_message("Hola", None).await.unwrap();
        assert_eq!(reply.conversation_id.as_str(), "new-conv");
        assert_eq!(reply.message.id.as_str(), "a1");

        let bodies = seen.bodies.lock().unwrap();
        assert_eq!(bodies[0], json!({"message": "Hola", "conversation_id": null}));
        assert_eq!(
            seen.auth.lock().unwrap()[0].as_deref(),
            Some("Bearer tok")
        );
    }

    #[tokio::test]
    async fn test_send_message_existing_conversation() {
        let (gateway, seen) = spawn_backend("tok").await;
        let id = ConversationId::new("c7");
        let reply = gateway.send_message("Sigo", Some(&id)).await.unwrap();
        assert_eq!(reply.conversation_id, id);
        assert_eq!(seen.bodies.lock().unwrap()[0]["conversation_id"], "c7");
    }

    #[tokio::test]
    async fn test_send_message_server_error() {
        let (gateway, _) = spawn_backend("tok").await;
        let err = gateway.send_message("boom", None).await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Server);
        assert_eq!(err.status, Some(500));
        assert_eq!(err.to_string(), "Error al procesar el mensaje");
    }

    #[tokio::test]
    async fn test_anonymous_requests_have_no_auth_header() {
        let (gateway, seen) = spawn_backend("").await;
        gateway.send_message("Hola", None).await.unwrap();
        assert!(seen.auth.lock().unwrap()[0].is_none());
    }

    #[tokio::test]
    async fn test_list_and_get_conversations() {
        let (gateway, _) = spawn_backend("tok").await;
        let list = gateway.list_conversations().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id.as_str(), "c2");

        let conv = gateway
            .get_conversation(&ConversationId::new("c1"))
            .await
            .unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[1].content, "Usa el POS");
    }

    #[tokio::test]
    async fn test_get_missing_conversation() {
        let (gateway, _) = spawn_backend("tok").await;
        let err = gateway
            .get_conversation(&ConversationId::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::NotFound);
        assert_eq!(err.to_string(), "No encontrado.");
    }

    #[tokio::test]
    async fn test_delete_and_feedback() {
        let (gateway, seen) = spawn_backend("tok").await;
        gateway
            .delete_conversation(&ConversationId::new("c1"))
            .await
            .unwrap();
        gateway
            .send_feedback(&MessageId::new("a1"), Rating::new(5).unwrap(), None)
            .await
            .unwrap();
        let bodies = seen.bodies.lock().unwrap();
        assert_eq!(bodies[0], json!({"deleted": "c1"}));
        assert_eq!(bodies[1], json!({"message": "a1", "rating": 5, "comment": ""}));
    }

    #[tokio::test]
    async fn test_hints() {
        let (gateway, _) = spawn_backend("tok").await;
        let actions = gateway.quick_actions().await.unwrap();
        assert_eq!(actions[0].url, "/pos");
        let suggestions = gateway.suggestions().await.unwrap();
        assert_eq!(suggestions, vec!["¿Cómo registro una venta?"]);
    }

    #[tokio::test]
    async fn test_generate_report() {
        let (gateway, _) = spawn_backend("tok").await;
        let report = gateway.generate_report("ventas de la semana").await.unwrap();
        assert_eq!(report.query, "ventas de la semana");
        assert_eq!(report.columns, vec!["Producto", "Total"]);

        let err = gateway.generate_report("").await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "La consulta no puede estar vacía");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let config = BackendConfig {
            base_url: format!("http://{}", addr),
            api_token: String::new(),
            timeout_secs: 2,
        };
        let gateway = HttpGateway::new(&config).unwrap();
        let err = gateway.suggestions().await.unwrap_err();
        assert_eq!(err.kind, GatewayErrorKind::Network);
    }
}
