//! A small set of typed endpoint wrappers over [`RestClient::request`].

use serde::Deserialize;
use serde_json::{json, Value};

use cordwire_core::error::{CordError, CordResult};

use super::client::RestClient;
use super::multipart::Multipart;
use super::transport::{HttpRequest, Method};

/// Longest message content the API accepts, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Response of `GET /gateway/bot`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    /// Recommended shard count.
    pub shards: u32,
}

#[derive(Deserialize)]
struct GatewayUrl {
    url: String,
}

fn check_content(content: &str) -> CordResult<()> {
    let len = content.chars().count();
    if len == 0 || len > MAX_MESSAGE_LEN {
        return Err(CordError::InvalidParameter {
            parameter: "content".into(),
            reason: format!("length {len} out of range (should be 1-{MAX_MESSAGE_LEN})"),
        });
    }
    Ok(())
}

impl RestClient {
    /// Gateway URL to connect to.
    pub async fn get_gateway_url(&self) -> CordResult<String> {
        let body = self.request(HttpRequest::new(Method::Get, "/gateway")).await?;
        let GatewayUrl { url } = serde_json::from_value(body)?;
        Ok(url)
    }

    /// Gateway URL plus the recommended shard count for a bot token.
    pub async fn get_gateway_bot(&self) -> CordResult<GatewayBot> {
        let body = self
            .request(HttpRequest::new(Method::Get, "/gateway/bot"))
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    pub async fn get_channel(&self, channel_id: u64) -> CordResult<Value> {
        self.request(HttpRequest::new(Method::Get, format!("/channels/{channel_id}")))
            .await
    }

    /// Post a text message. Content must be 1 to 2000 characters; anything
    /// else fails before a request is made.
    pub async fn create_message(&self, channel_id: u64, content: &str, tts: bool) -> CordResult<Value> {
        check_content(content)?;
        let request = HttpRequest::new(Method::Post, format!("/channels/{channel_id}/messages"))
            .json(&json!({ "content": content, "tts": tts }))?;
        self.request(request).await
    }

    pub async fn edit_message(&self, channel_id: u64, message_id: u64, content: &str) -> CordResult<Value> {
        check_content(content)?;
        let request = HttpRequest::new(
            Method::Patch,
            format!("/channels/{channel_id}/messages/{message_id}"),
        )
        .json(&json!({ "content": content }))?;
        self.request(request).await
    }

    pub async fn delete_message(&self, channel_id: u64, message_id: u64) -> CordResult<()> {
        self.request(HttpRequest::new(
            Method::Delete,
            format!("/channels/{channel_id}/messages/{message_id}"),
        ))
        .await?;
        Ok(())
    }

    pub async fn trigger_typing(&self, channel_id: u64) -> CordResult<()> {
        self.request(HttpRequest::new(
            Method::Post,
            format!("/channels/{channel_id}/typing"),
        ))
        .await?;
        Ok(())
    }

    /// Upload a file as a message attachment, with optional message content.
    pub async fn send_file(
        &self,
        channel_id: u64,
        filename: &str,
        data: &[u8],
        content: Option<&str>,
    ) -> CordResult<Value> {
        let mut payload = json!({});
        if let Some(content) = content {
            check_content(content)?;
            payload["content"] = json!(content);
        }

        let form = Multipart::new()
            .text("payload_json", payload.to_string())
            .file("file", filename, "application/octet-stream", data.to_vec());
        let request = HttpRequest::new(Method::Post, format!("/channels/{channel_id}/messages"))
            .multipart(form);
        self.request(request).await
    }
}
