//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN: INT. SERVER ROOM, 3:47 AM
//!
//! The scroll context has a one minute TTL. The engineer has a one coffee TTL.
//! Both are running low. Somewhere a `_bulk` request returns `"errors": true` and
//! nobody reads the items array. We read the items array.
//!
//! This module is the connection provider: it owns the HTTP client, the auth, and the
//! base URL, and it hands out authorized requests to the reader and the writer.
//!
//! 🧠 Knowledge graph:
//! - `ElasticsearchConfig`: url, credentials, trust switch, timeouts. Lives here, next to
//!   the thing it configures.
//! - `ElasticsearchConnection`: one `reqwest::Client` (cheap to clone, pooled inside),
//!   pinged once at connect time so a dead cluster fails INIT, not page 40.
//! - `scroll_reader`: `CursorReader` over `_search?scroll` / `_search/scroll`
//! - `bulk_writer`: `BulkWriter` over `_bulk` or per-document `PUT`
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::{Method, RequestBuilder, Url};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

mod bulk_writer;
mod scroll_reader;

pub(crate) use bulk_writer::ElasticsearchBulkWriter;
pub use bulk_writer::{BulkAction, ElasticsearchWriterConfig, WriteMode};
pub(crate) use scroll_reader::ElasticsearchScrollReader;

// 📡 ElasticsearchConfig: "It's just Elasticsearch", she said, before the cluster went red.
//
// 🔧 auth is tri-modal: api_key, username+password, or anonymous (good luck).
// api_key wins when both are set. This is not a democracy.
#[derive(Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 Scheme + host + port. Yes, all of it.
    #[serde(default = "default_url")]
    pub url: String,
    /// 🔒 Basic auth username.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub username: Option<String>,
    /// 🔒 Basic auth password. Comes from the environment if you value your git history.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub password: Option<String>,
    /// 🔒 API key, sent as `Authorization: ApiKey ...`.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub api_key: Option<String>,
    /// ⚠️ Accept any server certificate. For self-signed dev clusters only.
    #[serde(default)]
    pub trust_all_certificates: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Per-request timeout. Bulk requests are meaty, so this is generous.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// 🔢 PRODEX_ELASTICSEARCH__PASSWORD=123456 arrives from figment as a number, and
// `true` arrives as a bool. Credentials are strings no matter what they look like.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Flag(bool),
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(s) => s,
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Flag(b) => b.to_string(),
    }))
}

fn default_url() -> String {
    "https://localhost:9200".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            trust_all_certificates: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// 🎭 manual Debug so `info!("{:#?}", config)` never leaks a password into the logs
impl std::fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("trust_all_certificates", &self.trust_all_certificates)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
enum Auth {
    ApiKey(String),
    Basic {
        username: String,
        password: Option<String>,
    },
    Anonymous,
}

impl Auth {
    fn from_config(config: &ElasticsearchConfig) -> Self {
        // -- 🔒 api_key is the premium tier. basic auth is economy. anonymous is standing room.
        if let Some(api_key) = &config.api_key {
            Auth::ApiKey(api_key.clone())
        } else if let Some(username) = &config.username {
            Auth::Basic {
                username: username.clone(),
                password: config.password.clone(),
            }
        } else {
            Auth::Anonymous
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::ApiKey(api_key) => request.header("Authorization", format!("ApiKey {}", api_key)),
            Auth::Basic { username, password } => request.basic_auth(username, password.as_ref()),
            Auth::Anonymous => request,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Auth::ApiKey(_) => "api key",
            Auth::Basic { .. } => "basic",
            Auth::Anonymous => "anonymous",
        }
    }
}

/// 📡 An authenticated, TLS-configured handle to the cluster.
///
/// Cloning is cheap: `reqwest::Client` is an `Arc` around a connection pool, so the reader
/// and the writer share sockets without sharing any mutable state.
#[derive(Clone)]
pub(crate) struct ElasticsearchConnection {
    client: reqwest::Client,
    base_url: Url,
    auth: Auth,
}

impl std::fmt::Debug for ElasticsearchConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConnection")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth.describe())
            .finish()
    }
}

impl ElasticsearchConnection {
    /// 🚀 Build the client and make sure somebody answers.
    ///
    /// 1. Parse the URL (typos die here, not mid-scroll).
    /// 2. Build the `reqwest::Client` with the configured timeouts and trust policy.
    /// 3. `GET /` with the configured auth. Anything but 2xx is fatal.
    pub(crate) async fn connect(config: &ElasticsearchConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url).with_context(|| {
            format!(
                "💀 '{}' is not a URL we can work with. Scheme, host, port. All three. Please.",
                config.url
            )
        })?;

        if config.trust_all_certificates {
            warn!(
                "⚠️ trust_all_certificates is on: any certificate from {} will be accepted. Fine for a laptop cluster, spicy anywhere else.",
                base_url
            );
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.trust_all_certificates)
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Either way: tragic.")?;

        let connection = Self {
            client,
            base_url,
            auth: Auth::from_config(config),
        };

        // -- 📡 "Hello? Is this thing on?" Fail loudly now rather than quietly 50,000 docs later.
        let response = connection
            .request(Method::GET, connection.base_url.clone())
            .send()
            .await
            .with_context(|| {
                format!(
                    "💀 Could not reach Elasticsearch at {}. We knocked. Nobody came to the door.",
                    connection.base_url
                )
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Elasticsearch at {} answered the ping with {} ({} auth). Body: '{}'",
                connection.base_url,
                status,
                connection.auth.describe(),
                body
            );
        }

        debug!(
            "✅ Connected to {} using {} auth",
            connection.base_url,
            connection.auth.describe()
        );
        Ok(connection)
    }

    /// 🔧 Build `{base_url}/{segments...}`. Each segment is percent-encoded, so an id
    /// with a slash in it stays one segment instead of wandering off into a new path.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("💀 '{}' cannot be used as a base URL", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 🔒 A request with auth already applied.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.auth.apply(self.client.request(method, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: server.uri(),
            ..ElasticsearchConfig::default()
        }
    }

    #[tokio::test]
    async fn the_one_where_the_cluster_answers_the_ping() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"tagline": "You Know, for Search"})))
            .expect(1)
            .mount(&server)
            .await;

        let connection = ElasticsearchConnection::connect(&config_for(&server)).await?;
        assert_eq!(
            connection.endpoint(&["product", "_search"])?.path(),
            "/product/_search"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_bad_credentials_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("security_exception"))
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.username = Some("elastic".into());
        config.password = Some("wrong".into());

        let err = ElasticsearchConnection::connect(&config)
            .await
            .expect_err("💀 a 401 ping must abort the connection");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn the_one_where_api_key_beats_basic_auth() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("Authorization", "ApiKey c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config_for(&server);
        config.username = Some("elastic".into());
        config.password = Some("changeme".into());
        config.api_key = Some("c2VjcmV0".into());

        ElasticsearchConnection::connect(&config).await?;
        Ok(())
    }

    #[test]
    fn the_one_where_debug_output_keeps_secrets_secret() {
        let config = ElasticsearchConfig {
            password: Some("hunter2".into()),
            api_key: Some("c2VjcmV0".into()),
            ..ElasticsearchConfig::default()
        };
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("c2VjcmV0"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn the_one_where_ids_with_slashes_stay_in_their_lane() -> Result<()> {
        let connection = ElasticsearchConnection {
            client: reqwest::Client::new(),
            base_url: Url::parse("http://localhost:9200/")?,
            auth: Auth::Anonymous,
        };
        let url = connection.endpoint(&["product", "_doc", "a/b"])?;
        assert_eq!(url.path(), "/product/_doc/a%2Fb");
        Ok(())
    }
}
