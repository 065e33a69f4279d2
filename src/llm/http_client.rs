use reqwest::{Client, ClientBuilder, redirect};
use std::time::Duration;

const FETCH_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36";

fn pooled(timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
}

/// Client for reasoning-service calls. The timeout bounds a whole request.
pub fn build_service_client(timeout_secs: u64) -> Client {
    pooled(timeout_secs).build().unwrap_or_else(|_| Client::new())
}

/// Client for page fetches: browser user agent, bounded redirect chain.
pub fn build_fetch_client(timeout_secs: u64) -> Client {
    pooled(timeout_secs)
        .user_agent(FETCH_USER_AGENT)
        .redirect(redirect::Policy::limited(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}
