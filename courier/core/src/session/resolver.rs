//! Session Resolver
//!
//! Obtains a session token for a user, reusing an existing session when the
//! backend has one and creating one otherwise.
//!
//! | Call | Request | Not found |
//! |---|---|---|
//! | [`SessionResolver::get_session`] | `GET /get_session?user_id=` | `Ok(None)` on 404 |
//! | [`SessionResolver::create_session`] | `POST /session` | n/a |

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;

use super::{CreateSessionRequest, Session};
use crate::config::ApiConfig;
use crate::error::ChatError;

/// A session and whether it was created by this call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSession {
    /// The session
    pub session: Session,
    /// `true` if no existing session was found and a new one was created
    pub is_new: bool,
}

/// Fetches or creates sessions against the chat API
#[derive(Clone, Debug)]
pub struct SessionResolver {
    api: ApiConfig,
    http: reqwest::Client,
}

impl SessionResolver {
    /// Create a resolver for an API
    ///
    /// # Errors
    ///
    /// Returns `UNEXPECTED_ERROR` if the HTTP client cannot be built.
    pub fn new(api: ApiConfig) -> Result<Self, ChatError> {
        let http = api.http_client()?;
        Ok(Self { api, http })
    }

    /// Look up the user's existing session
    ///
    /// # Errors
    ///
    /// - `HTTP_<status>` for any non-success status other than 404
    /// - `NETWORK_ERROR` if the request never completed
    /// - `UNEXPECTED_ERROR` if the body holds no session
    pub async fn get_session(&self, user_id: &str) -> Result<Option<Session>, ChatError> {
        tracing::debug!(user_id, "Looking up session");

        let response = self
            .http
            .get(self.api.endpoint("get_session"))
            .query(&[("user_id", user_id)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(user_id, "No existing session");
            return Ok(None);
        }

        let body = read_body(response).await?;
        parse_session(&body).map(Some)
    }

    /// Create a new session
    ///
    /// # Errors
    ///
    /// - `HTTP_<status>` for any non-success status
    /// - `NETWORK_ERROR` if the request never completed
    /// - `UNEXPECTED_ERROR` if the body holds no session
    pub async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session, ChatError> {
        let response = self
            .http
            .post(self.api.endpoint("session"))
            .json(request)
            .send()
            .await?;

        let body = read_body(response).await?;
        let session = parse_session(&body)?;
        tracing::info!(
            user_id = %request.user_id,
            session_id = %session.session_id,
            "Created session"
        );
        Ok(session)
    }

    /// Reuse the user's session, or create one if none exists
    ///
    /// A failed lookup is returned as-is; creation is only attempted when the
    /// lookup definitively found nothing. `device_id` defaults to a fresh UUID.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::get_session`] or [`Self::create_session`].
    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        secondary_id: &str,
        device_id: Option<&str>,
    ) -> Result<ResolvedSession, ChatError> {
        if let Some(session) = self.get_session(user_id).await? {
            tracing::info!(session_id = %session.session_id, "Reusing existing session");
            return Ok(ResolvedSession {
                session,
                is_new: false,
            });
        }

        let request = CreateSessionRequest {
            device_id: device_id.map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string),
            client_type: self.api.client_type,
            user_id: user_id.to_string(),
            user_jhh_id: secondary_id.to_string(),
        };
        let session = self.create_session(&request).await?;
        Ok(ResolvedSession {
            session,
            is_new: true,
        })
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, ChatError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Session request rejected");
        return Err(ChatError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<Value>().await?)
}

fn parse_session(body: &Value) -> Result<Session, ChatError> {
    Session::from_payload(body, Utc::now()).ok_or_else(|| {
        ChatError::Unexpected("Session response missing session_id or session_token".to_string())
    })
}
