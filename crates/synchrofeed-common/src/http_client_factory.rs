// HttpClientFactory: builds the reqwest client used by feed repositories,
// with proxy and TLS settings applied.

use crate::constants::variables;
use anyhow::{Context, Result};
use reqwest::{Client, NoProxy, Proxy};
use std::time::Duration;
use synchrofeed_sdk::web_proxy::ProxyEndpoint;
use synchrofeed_sdk::{ListenerPackage, StringUtil, WebProxy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(100);

/// Creates properly configured HTTP clients.
pub struct HttpClientFactory;

impl HttpClientFactory {
    /// User agent sent with every feed request.
    pub fn user_agent() -> String {
        format!(
            "{}/{}",
            ListenerPackage::PRODUCT_NAME,
            ListenerPackage::VERSION
        )
    }

    /// Create a `reqwest::Client` configured with proxy and TLS settings.
    ///
    /// Certificate validation is disabled when `SYNCHROFEED_TLS_NO_VERIFY`
    /// is truthy.
    pub fn create_client(web_proxy: &WebProxy) -> Result<Client> {
        let no_proxy = web_proxy.no_proxy.as_deref().and_then(NoProxy::from_string);

        let mut builder = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(REQUEST_TIMEOUT);

        if let Some(ref endpoint) = web_proxy.http_proxy {
            let proxy = Proxy::http(&endpoint.address)
                .with_context(|| format!("invalid http proxy '{}'", endpoint.address))?;
            builder = builder.proxy(with_auth(proxy, endpoint).no_proxy(no_proxy.clone()));
        }

        if let Some(ref endpoint) = web_proxy.https_proxy {
            let proxy = Proxy::https(&endpoint.address)
                .with_context(|| format!("invalid https proxy '{}'", endpoint.address))?;
            builder = builder.proxy(with_auth(proxy, endpoint).no_proxy(no_proxy));
        }

        let skip_verify = std::env::var(variables::TLS_NO_VERIFY)
            .ok()
            .and_then(|v| StringUtil::convert_to_bool(&v))
            .unwrap_or(false);
        if skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder.build().context("failed to build HTTP client")
    }
}

fn with_auth(proxy: Proxy, endpoint: &ProxyEndpoint) -> Proxy {
    match (&endpoint.username, &endpoint.password) {
        (Some(user), Some(pass)) => proxy.basic_auth(user, pass),
        (Some(user), None) => proxy.basic_auth(user, ""),
        _ => proxy,
    }
}
