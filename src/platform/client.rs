use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::PlatformError;
use super::types::{
    AacAudioConfiguration, Encoding, ErrorEnvelope, Fmp4Muxing, H264VideoConfiguration, HttpInput,
    PaginationResponse, RemoteStatus, ResourceId, ResponseEnvelope, S3Output,
    StartEncodingRequest, Stream, Task,
};

pub const API_URL: &str = "https://api.bitmovin.com/v1";

/// HTTP client for the encoding platform's REST API.
pub struct PlatformClient {
    api_key: String,
    tenant_org_id: Option<String>,
    client: Client,
    base_url: String,
}

impl PlatformClient {
    /// `base_url` is usually [`API_URL`]; tests point it at a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            api_key,
            tenant_org_id: None,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Scope every request to an organisation of a multi-tenant account.
    pub fn with_tenant_org_id(mut self, tenant_org_id: Option<String>) -> Self {
        self.tenant_org_id = tenant_org_id;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_http_input(&self, input: &HttpInput) -> Result<HttpInput, PlatformError> {
        self.post("/encoding/inputs/http", input).await
    }

    pub async fn create_s3_output(&self, output: &S3Output) -> Result<S3Output, PlatformError> {
        self.post("/encoding/outputs/s3", output).await
    }

    pub async fn create_h264_configuration(
        &self,
        config: &H264VideoConfiguration,
    ) -> Result<H264VideoConfiguration, PlatformError> {
        self.post("/encoding/configurations/video/h264", config)
            .await
    }

    pub async fn create_aac_configuration(
        &self,
        config: &AacAudioConfiguration,
    ) -> Result<AacAudioConfiguration, PlatformError> {
        self.post("/encoding/configurations/audio/aac", config)
            .await
    }

    pub async fn create_encoding(&self, encoding: &Encoding) -> Result<Encoding, PlatformError> {
        self.post("/encoding/encodings", encoding).await
    }

    pub async fn create_stream(
        &self,
        encoding_id: &str,
        stream: &Stream,
    ) -> Result<Stream, PlatformError> {
        self.post(&format!("/encoding/encodings/{encoding_id}/streams"), stream)
            .await
    }

    pub async fn create_fmp4_muxing(
        &self,
        encoding_id: &str,
        muxing: &Fmp4Muxing,
    ) -> Result<Fmp4Muxing, PlatformError> {
        self.post(
            &format!("/encoding/encodings/{encoding_id}/muxings/fmp4"),
            muxing,
        )
        .await
    }

    pub async fn start_encoding(&self, encoding_id: &str) -> Result<ResourceId, PlatformError> {
        self.post(
            &format!("/encoding/encodings/{encoding_id}/start"),
            &StartEncodingRequest::default(),
        )
        .await
    }

    /// Remove an encoding together with its streams and muxings.
    pub async fn delete_encoding(&self, encoding_id: &str) -> Result<ResourceId, PlatformError> {
        self.delete(&format!("/encoding/encodings/{encoding_id}"))
            .await
    }

    pub async fn encoding_status(&self, encoding_id: &str) -> Result<Task, PlatformError> {
        self.get(&format!("/encoding/encodings/{encoding_id}/status"), &[])
            .await
    }

    /// Number of encodings currently in `status`, as reported by the list endpoint.
    pub async fn count_encodings(&self, status: RemoteStatus) -> Result<u64, PlatformError> {
        let page: PaginationResponse = self
            .get(
                "/encoding/encodings",
                &[("status", status.as_query()), ("limit", "1")],
            )
            .await?;
        page.total_count.ok_or_else(|| {
            PlatformError::UnexpectedResponse("encoding list without totalCount".into())
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("X-Api-Key", &self.api_key)
            .header("Content-Type", "application/json");
        if let Some(tenant) = &self.tenant_org_id {
            builder = builder.header("X-Tenant-Org-Id", tenant);
        }
        builder
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, PlatformError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!("POST {path}");
        let response = self.request(Method::POST, path).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn get<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<R, PlatformError>
    where
        R: DeserializeOwned,
    {
        debug!("GET {path}");
        let response = self.request(Method::GET, path).query(query).send().await?;
        Self::handle_response(response).await
    }

    async fn delete<R>(&self, path: &str) -> Result<R, PlatformError>
    where
        R: DeserializeOwned,
    {
        debug!("DELETE {path}");
        let response = self.request(Method::DELETE, path).send().await?;
        Self::handle_response(response).await
    }

    /// Unwraps the success envelope, or turns an error envelope into [`PlatformError::Api`].
    async fn handle_response<R: DeserializeOwned>(response: Response) -> Result<R, PlatformError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => PlatformError::Api {
                    status: status.as_u16(),
                    code: Some(envelope.data.code),
                    message: envelope.data.message,
                    details: envelope
                        .data
                        .details
                        .into_iter()
                        .map(|m| m.text)
                        .chain(envelope.data.developer_message)
                        .collect(),
                    retry_hint: envelope.data.retry_hint,
                },
                Err(_) => PlatformError::Api {
                    status: status.as_u16(),
                    code: None,
                    message: if body.is_empty() {
                        status.to_string()
                    } else {
                        body
                    },
                    details: Vec::new(),
                    retry_hint: None,
                },
            });
        }

        let envelope: ResponseEnvelope<R> = serde_json::from_str(&body)
            .map_err(|e| PlatformError::UnexpectedResponse(format!("{e}: {body}")))?;
        Ok(envelope.data.result)
    }
}
