//! Where the client connects to.

use url::Url;

use crate::error::ClientError;

/// Server endpoint plus the identity and scope sent as query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    endpoint: Url,
    pub project_id: String,
    pub token: String,
    pub channel_id: Option<String>,
}

impl ConnectTarget {
    /// Validate the endpoint (`ws://` or `wss://`) and the required parameters.
    pub fn new(
        endpoint: &str,
        project_id: impl Into<String>,
        token: impl Into<String>,
        channel_id: Option<String>,
    ) -> Result<Self, ClientError> {
        let endpoint = Url::parse(endpoint)?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(ClientError::UnsupportedScheme(endpoint.scheme().to_string()));
        }
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(ClientError::MissingField("project_id"));
        }
        let token = token.into();
        if token.is_empty() {
            return Err(ClientError::MissingField("token"));
        }
        Ok(Self {
            endpoint,
            project_id,
            token,
            channel_id: channel_id.filter(|c| !c.is_empty()),
        })
    }

    /// URL for the next connection attempt.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("project_id", &self.project_id)
                .append_pair("token", &self.token);
            if let Some(channel) = &self.channel_id {
                query.append_pair("channel_id", channel);
            }
        }
        url
    }
}
