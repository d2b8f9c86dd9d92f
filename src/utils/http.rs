use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

// Default covers multi-megabyte image uploads and downloads; generation
// calls set a longer per-request timeout.
static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}
