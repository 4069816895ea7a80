use std::time::Duration;

use placegrid_core::error::AppError;
use placegrid_core::models::{NearbyPage, NearbyRequest, SearchStatus};
use placegrid_core::traits::PlacesApi;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Google Places nearby-search client.
///
/// One call per page. API-level statuses (`OVER_QUERY_LIMIT`,
/// `REQUEST_DENIED`, ...) come back inside the page; only transport and
/// HTTP failures are errors.
#[derive(Clone)]
pub struct GooglePlacesClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl GooglePlacesClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, AppError> {
        Self::build(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(&self.api_key, &self.base_url, timeout)
    }

    fn build(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(concat!("placegrid/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self::from_client(client, api_key, base_url, timeout))
    }

    fn from_client(client: Client, api_key: &str, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full request URL, key included.
    fn nearby_url(&self, request: &NearbyRequest) -> Result<Url, AppError> {
        let mut url = Url::parse(&format!("{}/nearbysearch/json", self.base_url))
            .map_err(|e| AppError::ConfigError(format!("Invalid places base URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "location",
                &format!("{},{}", request.location.lat, request.location.lng),
            );
            query.append_pair("radius", &request.radius_m.to_string());
            if let Some(category) = &request.category {
                query.append_pair("type", category);
            }
            if let Some(token) = &request.page_token {
                query.append_pair("pagetoken", token);
            }
            query.append_pair("key", &self.api_key);
        }

        Ok(url)
    }
}

// ---- Places API types ----

#[derive(Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    results: Vec<Value>,
    next_page_token: Option<String>,
    error_message: Option<String>,
}

impl From<NearbyResponse> for NearbyPage {
    fn from(response: NearbyResponse) -> Self {
        NearbyPage {
            status: SearchStatus::parse(&response.status),
            results: response.results,
            next_page_token: response.next_page_token.filter(|t| !t.is_empty()),
            error_message: response.error_message,
        }
    }
}

impl PlacesApi for GooglePlacesClient {
    async fn nearby_search(&self, request: &NearbyRequest) -> Result<NearbyPage, AppError> {
        let url = self.nearby_url(request)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            // reqwest embeds the URL, and with it the key, in its messages.
            let e = e.without_url();
            if e.is_timeout() {
                AppError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} from places API",
                status.as_u16()
            )));
        }

        let body: NearbyResponse = response.json().await.map_err(|e| {
            AppError::HttpError(format!("Failed to parse places response: {}", e.without_url()))
        })?;

        let page = NearbyPage::from(body);
        tracing::debug!(
            status = %page.status,
            results = page.results.len(),
            has_next_page = page.next_page_token.is_some(),
            "Nearby search page received"
        );
        Ok(page)
    }
}

/// Shorten an API key for display: first 10 and last 4 characters.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 14 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use placegrid_core::models::LatLng;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request() -> NearbyRequest {
        NearbyRequest {
            location: LatLng::new(18.0735, -15.9582),
            radius_m: 1000,
            category: Some("restaurant".into()),
            page_token: None,
        }
    }

    /// Serve one canned HTTP response and hand back the request line.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let text = String::from_utf8_lossy(&received).to_string();
            text.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    fn local_client(base: &str) -> GooglePlacesClient {
        let client = Client::builder().no_proxy().build().unwrap();
        GooglePlacesClient::from_client(client, "test-key", base, Duration::from_secs(5))
    }

    #[test]
    fn url_carries_every_parameter() {
        let client = GooglePlacesClient::new("secret").unwrap();
        let url = client.nearby_url(&request()).unwrap();

        assert_eq!(url.path(), "/maps/api/place/nearbysearch/json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("location".into(), "18.0735,-15.9582".into()),
                ("radius".into(), "1000".into()),
                ("type".into(), "restaurant".into()),
                ("key".into(), "secret".into()),
            ]
        );
    }

    #[test]
    fn generic_page_request_sends_token_without_type() {
        let client = GooglePlacesClient::with_base_url("k", "https://example.test/place/").unwrap();
        let mut req = request();
        req.category = None;
        req.page_token = Some("tok+/=".into());

        let url = client.nearby_url(&req).unwrap();

        assert_eq!(client.base_url(), "https://example.test/place");
        assert_eq!(url.host_str(), Some("example.test"));
        assert!(url.query_pairs().all(|(k, _)| k != "type"));
        assert!(
            url.query_pairs()
                .any(|(k, v)| k == "pagetoken" && v == "tok+/=")
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let client = GooglePlacesClient::with_base_url("k", "not a url").unwrap();
        assert!(matches!(
            client.nearby_url(&request()),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn response_maps_to_page() {
        let body: NearbyResponse = serde_json::from_str(
            r#"{
                "html_attributions": [],
                "next_page_token": "abc",
                "results": [{"place_id": "p1", "name": "Le Prince"}],
                "status": "OK"
            }"#,
        )
        .unwrap();

        let page = NearbyPage::from(body);
        assert_eq!(page.status, SearchStatus::Ok);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn denied_response_keeps_message() {
        let body: NearbyResponse = serde_json::from_str(
            r#"{"status": "REQUEST_DENIED", "error_message": "The provided API key is invalid."}"#,
        )
        .unwrap();

        let page = NearbyPage::from(body);
        assert_eq!(page.status, SearchStatus::RequestDenied);
        assert!(page.results.is_empty());
        assert_eq!(
            page.error_message.as_deref(),
            Some("The provided API key is invalid.")
        );
    }

    #[test]
    fn empty_token_means_last_page() {
        let body: NearbyResponse =
            serde_json::from_str(r#"{"status": "OK", "results": [], "next_page_token": ""}"#)
                .unwrap();
        assert!(NearbyPage::from(body).next_page_token.is_none());
    }

    #[test]
    fn masks_keys() {
        assert_eq!(mask_api_key("AIzaSyA1234567890abcdWXYZ"), "AIzaSyA123...WXYZ");
        assert_eq!(mask_api_key("short"), "*****");
    }

    #[tokio::test]
    async fn fetches_page_over_http() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"status":"OK","results":[{"place_id":"p1","name":"Marché"}]}"#,
        )
        .await;

        let page = local_client(&base).nearby_search(&request()).await.unwrap();

        assert_eq!(page.status, SearchStatus::Ok);
        assert_eq!(page.results[0]["name"], "Marché");
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /nearbysearch/json?location="));
        assert!(request_line.contains("key=test-key"));
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limit() {
        let (base, server) = serve_once("HTTP/1.1 429 Too Many Requests", "{}").await;

        let err = local_client(&base).nearby_search(&request()).await.unwrap_err();

        assert!(matches!(err, AppError::RateLimitExceeded));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_http_error() {
        let (base, server) = serve_once("HTTP/1.1 503 Service Unavailable", "{}").await;

        let err = local_client(&base).nearby_search(&request()).await.unwrap_err();

        assert!(matches!(err, AppError::HttpError(ref m) if m.contains("503")));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = local_client(&base).nearby_search(&request()).await.unwrap_err();

        assert!(matches!(err, AppError::NetworkError(_)));
    }
}
