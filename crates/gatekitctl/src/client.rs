//! Thin API client for the CLI commands
//!
//! Maps HTTP failures onto the CLI exit-code contract: 2 authentication,
//! 3 insufficient permissions, 4 validation, 1 everything else.

use serde_json::Value;

/// CLI-facing failure with its exit code
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

impl CliError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: 1,
        }
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CliError::generic(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value, CliError> {
        self.request(reqwest::Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, CliError> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, CliError> {
        self.request(reqwest::Method::DELETE, path, None).await
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, CliError> {
        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CliError::generic(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let value: Value = response.json().await.unwrap_or(Value::Null);

        if (200..300).contains(&status) {
            return Ok(value);
        }

        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("request failed")
            .to_string();
        let exit_code = match status {
            401 => 2,
            403 => 3,
            400 | 422 => 4,
            _ => 1,
        };
        Err(CliError { message, exit_code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_contract() {
        // 0 ok / 1 generic / 2 auth / 3 permission / 4 validation
        let auth = CliError {
            message: "no".into(),
            exit_code: 2,
        };
        assert_eq!(auth.exit_code, 2);
        assert_eq!(CliError::generic("x").exit_code, 1);
    }
}
