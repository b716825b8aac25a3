//! HTTP tool: exposes a configured HTTP endpoint to the model.
//!
//! The model-proposed `input_params` object becomes the JSON body
//! (POST/PUT/PATCH) or the query string (GET/DELETE). The response body is
//! returned as text, plus parsed JSON when the body is JSON.

use async_trait::async_trait;
use statewright_config::ToolConfig;
use statewright_core::error::ToolError;
use statewright_core::tool::{Tool, ToolResult};
use std::time::Duration;
use tracing::debug;

pub struct HttpTool {
    config: ToolConfig,
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new(config: ToolConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn method(&self) -> Result<reqwest::Method, ToolError> {
        match self.config.method.to_uppercase().as_str() {
            "GET" => Ok(reqwest::Method::GET),
            "POST" => Ok(reqwest::Method::POST),
            "PUT" => Ok(reqwest::Method::PUT),
            "PATCH" => Ok(reqwest::Method::PATCH),
            "DELETE" => Ok(reqwest::Method::DELETE),
            other => Err(ToolError::InvalidArguments(format!(
                "Invalid HTTP method: {other}. Must be GET, POST, PUT, PATCH, or DELETE."
            ))),
        }
    }

    /// Flatten top-level parameters into query pairs; nested values are sent as JSON text.
    fn query_pairs(arguments: &serde_json::Value) -> Vec<(String, String)> {
        arguments
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let value = match v {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (k.clone(), value)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments(
                "tool parameters must be a JSON object".into(),
            ));
        }

        let method = self.method()?;
        let mut request = self.client.request(method.clone(), &self.config.url);
        for (name, value) in &self.config.headers {
            request = request.header(name, value);
        }
        request = if method == reqwest::Method::GET || method == reqwest::Method::DELETE {
            request.query(&Self::query_pairs(&arguments))
        } else {
            request.json(&arguments)
        };

        debug!(tool = %self.config.name, url = %self.config.url, "Calling HTTP tool");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: self.config.name.clone(),
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                ToolError::ExecutionFailed {
                    tool_name: self.config.name.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.config.name.clone(),
            reason: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.config.name.clone(),
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }

        Ok(ToolResult {
            success: true,
            data: serde_json::from_str(&body).ok(),
            output: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn tool_config(url: String, method: &str) -> ToolConfig {
        ToolConfig {
            name: "Weather API".into(),
            description: "Current weather".into(),
            url,
            method: method.into(),
            headers: HashMap::new(),
            timeout_secs: 5,
            enabled: true,
        }
    }

    /// Serve exactly one HTTP response and return the raw request text.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/lookup", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn post_sends_params_and_parses_json_body() {
        let (url, server) = serve_once("200 OK", r#"{"temp":72}"#).await;
        let tool = HttpTool::new(tool_config(url, "POST"));

        let result = tool
            .execute(serde_json::json!({"location": "Austin"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.data, Some(serde_json::json!({"temp": 72})));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /lookup"));
        assert!(request.contains("Austin"));
    }

    #[tokio::test]
    async fn error_status_is_execution_failure() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"down"}"#).await;
        let tool = HttpTool::new(tool_config(url, "GET"));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn rejects_non_object_params() {
        let tool = HttpTool::new(tool_config("http://127.0.0.1:9/x".into(), "POST"));
        let err = tool.execute(serde_json::json!("oops")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_method() {
        let tool = HttpTool::new(tool_config("http://127.0.0.1:9/x".into(), "TRACE"));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn query_pairs_stringify_values() {
        let pairs = HttpTool::query_pairs(&serde_json::json!({"q": "rust", "n": 3}));
        assert_eq!(
            pairs,
            vec![("q".to_string(), "rust".to_string()), ("n".to_string(), "3".to_string())]
        );
    }
}
