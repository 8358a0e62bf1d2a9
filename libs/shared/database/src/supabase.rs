use anyhow::{anyhow, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Which credential a request is made with. User tokens are subject to
/// row-level authorization; the service role is not.
#[derive(Debug, Clone, Copy)]
pub enum SupabaseAuth<'a> {
    User(&'a str),
    ServiceRole,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self, auth: Option<SupabaseAuth<'_>>, returning: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        let api_key = match auth {
            Some(SupabaseAuth::ServiceRole) => &self.service_role_key,
            _ => &self.anon_key,
        };
        headers.insert("apikey", HeaderValue::from_str(api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = match auth {
            Some(SupabaseAuth::User(token)) => Some(token),
            Some(SupabaseAuth::ServiceRole) => Some(self.service_role_key.as_str()),
            None => None,
        };
        if let Some(token) = bearer {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        if returning {
            headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        }

        Ok(headers)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.execute(method, path, auth_token.map(SupabaseAuth::User), body, false)
            .await
    }

    /// Issues a write that returns the affected rows. PostgREST answers with an
    /// empty array when the filter matched nothing, which is how conditional
    /// updates report "zero rows affected".
    pub async fn request_returning<T>(
        &self,
        method: Method,
        path: &str,
        auth: SupabaseAuth<'_>,
        body: Option<Value>,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.execute(method, path, Some(auth), body, true).await
    }

    pub async fn request_as<T>(
        &self,
        method: Method,
        path: &str,
        auth: SupabaseAuth<'_>,
        body: Option<Value>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.execute(method, path, Some(auth), body, false).await
    }

    async fn execute<T>(
        &self,
        method: Method,
        path: &str,
        auth: Option<SupabaseAuth<'_>>,
        body: Option<Value>,
        returning: bool,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let headers = self.get_headers(auth, returning)?;

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
