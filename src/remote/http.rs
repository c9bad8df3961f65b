use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{LabelApi, MailApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Label, Mail, OutgoingMail};

#[derive(Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachLabelRequest<'a> {
    label_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// REST client for the BMail web server (`/api/...`).
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let base = Url::parse(&config.api_url)
            .map_err(|e| Error::Config(format!("invalid api_url {:?}: {e}", config.api_url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "api_url cannot be a base: {}",
                config.api_url
            )));
        }
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(HttpBackend { client, base })
    }

    /// `<base>/api/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("api_url cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments.iter().copied());
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder, token: &str) -> Result<Response> {
        let response = request.bearer_auth(token).send().await.map_err(|e| {
            log::error!("Network error: {e}");
            Error::Network(e.to_string())
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        log::warn!("Request failed: {status} {message}");
        Err(status_error(status, message))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        token: &str,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.execute(self.client.get(url), token).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("malformed response: {e}")))
    }
}

/// Map a non-success status to the crate error taxonomy.
fn status_error(status: StatusCode, message: String) -> Error {
    let message = if message.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        message
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(message),
        StatusCode::NOT_FOUND => Error::NotFound {
            kind: "resource",
            id: message,
        },
        StatusCode::BAD_REQUEST => Error::Validation(message),
        _ => Error::Network(format!("{status}: {message}")),
    }
}

#[async_trait]
impl LabelApi for HttpBackend {
    async fn list_labels(&self, token: &str) -> Result<Vec<Label>> {
        self.get_json(&["labels"], token).await
    }

    async fn create_label(&self, token: &str, name: &str) -> Result<()> {
        let url = self.endpoint(&["labels"])?;
        let request = self.client.post(url).json(&CreateLabelRequest { name });
        self.execute(request, token).await?;
        Ok(())
    }

    async fn delete_label(&self, token: &str, label_id: &str) -> Result<()> {
        let url = self.endpoint(&["labels", label_id])?;
        self.execute(self.client.delete(url), token).await?;
        Ok(())
    }
}

#[async_trait]
impl MailApi for HttpBackend {
    async fn list_mail_by_label(&self, token: &str, filter: &str) -> Result<Vec<Mail>> {
        self.get_json(&["mails", "byLabel", filter], token).await
    }

    async fn search_mail(&self, token: &str, query: &str) -> Result<Vec<Mail>> {
        self.get_json(&["mails", "search", query], token).await
    }

    async fn attach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()> {
        let url = self.endpoint(&["mails", mail_id, "labels"])?;
        let request = self.client.post(url).json(&AttachLabelRequest { label_id });
        self.execute(request, token).await?;
        Ok(())
    }

    async fn detach_label(&self, token: &str, mail_id: &str, label_id: &str) -> Result<()> {
        let url = self.endpoint(&["mails", mail_id, "labels", label_id])?;
        self.execute(self.client.delete(url), token).await?;
        Ok(())
    }

    async fn delete_mail(&self, token: &str, mail_id: &str) -> Result<()> {
        let url = self.endpoint(&["mails", mail_id])?;
        self.execute(self.client.delete(url), token).await?;
        Ok(())
    }

    async fn send_mail(&self, token: &str, mail: &OutgoingMail) -> Result<()> {
        let url = self.endpoint(&["mails"])?;
        self.execute(self.client.post(url).json(mail), token).await?;
        Ok(())
    }

    async fn update_draft(&self, token: &str, mail_id: &str, mail: &OutgoingMail) -> Result<()> {
        let url = self.endpoint(&["mails", mail_id])?;
        self.execute(self.client.patch(url).json(mail), token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(api_url: &str) -> HttpBackend {
        HttpBackend::new(&Config {
            api_url: api_url.into(),
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn endpoint_appends_api_segments() {
        let b = backend("http://localhost:3000");
        assert_eq!(
            b.endpoint(&["mails", "byLabel", "inbox"]).unwrap().as_str(),
            "http://localhost:3000/api/mails/byLabel/inbox"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_and_encodes_segments() {
        let b = backend("https://mail.example.com/bmail/");
        assert_eq!(
            b.endpoint(&["mails", "search", "q1 report/final"])
                .unwrap()
                .as_str(),
            "https://mail.example.com/bmail/api/mails/search/q1%20report%2Ffinal"
        );
    }

    #[test]
    fn bad_api_url_is_config_error() {
        let result = HttpBackend::new(&Config {
            api_url: "not a url".into(),
            ..Config::default()
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn statuses_map_to_taxonomy() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "You must be logged in".into()),
            Error::Auth(m) if m == "You must be logged in"
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, String::new()),
            Error::NotFound { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "Label name is required".into()),
            Error::Validation(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, String::new()),
            Error::Network(m) if m.contains("Internal Server Error")
        ));
    }

    #[test]
    fn attach_request_uses_camel_case() {
        let json = serde_json::to_string(&AttachLabelRequest { label_id: "3" }).unwrap();
        assert_eq!(json, r#"{"labelId":"3"}"#);
    }
}
