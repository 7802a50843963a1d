//! Evolution API 集成（WhatsApp）
//!
//! 所有请求带 `apikey` 头、JSON 请求体；非 2xx 视为 Transport 错误。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;

use crate::core::SalesError;
use crate::integrations::messaging::{InboundMedia, MessagingGateway, OutboundMedia};

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMediaRequest<'a> {
    number: &'a str,
    #[serde(rename = "mimetype")]
    mime_type: &'a str,
    #[serde(rename = "mediatype")]
    media_type: &'a str,
    file_name: &'a str,
    media: &'a str,
}

pub struct EvolutionGateway {
    http: reqwest::Client,
    base_url: String,
    instance_id: String,
    api_key: String,
}

impl EvolutionGateway {
    pub fn new(
        base_url: &str,
        instance_id: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, SalesError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SalesError::Config(format!("cannot build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            instance_id: instance_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, path, self.instance_id)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, SalesError> {
        let resp = self
            .http
            .post(self.url(path))
            .header("apikey", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(SalesError::Transport(format!(
                "Evolution API {path} returned {status}: {text}"
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl MessagingGateway for EvolutionGateway {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), SalesError> {
        self.post(
            "message/sendText",
            &SendTextRequest {
                number: recipient,
                text,
            },
        )
        .await?;
        tracing::info!(recipient, chars = text.chars().count(), "text sent to whatsapp");
        Ok(())
    }

    async fn send_media(&self, media: &OutboundMedia) -> Result<(), SalesError> {
        self.post(
            "message/sendMedia",
            &SendMediaRequest {
                number: &media.recipient,
                mime_type: &media.mime_type,
                media_type: media.media_kind.as_str(),
                file_name: &media.file_name,
                media: &media.base64,
            },
        )
        .await?;
        tracing::info!(
            recipient = %media.recipient,
            file = %media.file_name,
            kind = media.media_kind.as_str(),
            "media sent to whatsapp"
        );
        Ok(())
    }

    async fn fetch_media(&self, message_id: &str) -> Result<InboundMedia, SalesError> {
        let body = json!({
            "message": { "key": { "id": message_id } },
            "convertToMp4": false,
        });
        let resp = self.post("chat/getBase64FromMediaMessage", &body).await?;
        resp.json::<InboundMedia>()
            .await
            .map_err(|e| SalesError::Validation(format!("malformed media response: {e}")))
    }
}
