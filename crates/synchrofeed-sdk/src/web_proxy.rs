use url::Url;

/// Outbound proxy configuration read from the conventional environment
/// variables (`http_proxy` / `HTTP_PROXY`, `https_proxy` / `HTTPS_PROXY`,
/// `no_proxy` / `NO_PROXY`).
#[derive(Debug, Clone, Default)]
pub struct WebProxy {
    pub http_proxy: Option<ProxyEndpoint>,
    pub https_proxy: Option<ProxyEndpoint>,
    pub no_proxy: Option<String>,
}

/// A parsed proxy address with any credentials split out of the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl WebProxy {
    /// Read proxy settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read proxy settings through `lookup` (lower-case name wins).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |lower: &str, upper: &str| {
            lookup(lower)
                .or_else(|| lookup(upper))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            http_proxy: read("http_proxy", "HTTP_PROXY").and_then(|raw| ProxyEndpoint::parse(&raw)),
            https_proxy: read("https_proxy", "HTTPS_PROXY")
                .and_then(|raw| ProxyEndpoint::parse(&raw)),
            no_proxy: read("no_proxy", "NO_PROXY"),
        }
    }

    /// Passwords embedded in proxy URLs, so they can be masked in logs.
    pub fn secrets(&self) -> Vec<String> {
        [&self.http_proxy, &self.https_proxy]
            .into_iter()
            .flatten()
            .filter_map(|p| p.password.clone())
            .collect()
    }
}

impl ProxyEndpoint {
    /// Parse a proxy address, assuming `http://` when no scheme is given.
    pub fn parse(raw: &str) -> Option<Self> {
        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };

        let mut url = Url::parse(&with_scheme).ok()?;
        let username = Some(url.username().to_string()).filter(|u| !u.is_empty());
        let password = url.password().map(str::to_string);
        // Credentials are passed separately, never as part of the address.
        let _ = url.set_username("");
        let _ = url.set_password(None);

        Some(Self {
            address: url.to_string(),
            username,
            password,
        })
    }
}
