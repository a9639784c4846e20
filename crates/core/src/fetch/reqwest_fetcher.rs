//! `reqwest`-backed fetcher.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::LOCATION, redirect, Client, Url};
use tracing::debug;

use super::types::set_cookie_pair;
use super::{FetchError, FetchRequest, FetchResponse, Fetcher, HttpConfig};

/// HTTP fetcher over a shared `reqwest::Client`.
///
/// Cookies are carried per session by the caller in the `Cookie` header, so
/// the client keeps no cookie store of its own. Redirects are followed here
/// rather than by the client: `Set-Cookie` headers from every hop are sent
/// on to the next one and surface in the final response.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
    max_redirects: usize,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(redirect::Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_redirects: config.max_redirects,
        })
    }

    async fn send(
        &self,
        url: &Url,
        request: &FetchRequest,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut builder = self.client.get(url.clone()).timeout(request.timeout);
        for (name, value) in &request.headers {
            if cookie.is_some() && name.eq_ignore_ascii_case("cookie") {
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(cookie) = cookie {
            builder = builder.header("Cookie", cookie);
        }
        builder.send().await.map_err(map_error)
    }
}

fn map_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_connect() {
        FetchError::Connect(e.to_string())
    } else {
        FetchError::Request(e.to_string())
    }
}

fn lowercase_headers(response: &reqwest::Response) -> Vec<(String, String)> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

/// The caller's `Cookie` header with cookies set along the redirect chain
/// merged in, later values winning.
fn merged_cookie(request: &FetchRequest, picked_up: &[(String, String)]) -> Option<String> {
    if picked_up.is_empty() {
        return None;
    }
    let mut cookies: Vec<(String, String)> = request
        .header("cookie")
        .into_iter()
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();
    for (name, value) in picked_up {
        match cookies.iter_mut().find(|(n, _)| n == name) {
            Some(existing) => existing.1 = value.clone(),
            None => cookies.push((name.clone(), value.clone())),
        }
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut url = Url::parse(&request.url)
            .map_err(|e| FetchError::Request(format!("Invalid URL {}: {}", request.url, e)))?;
        let mut set_cookies: Vec<(String, String)> = Vec::new();
        let mut hops = 0;

        loop {
            let picked_up: Vec<(String, String)> = set_cookies
                .iter()
                .filter_map(|(_, v)| set_cookie_pair(v))
                .collect();
            let cookie = merged_cookie(request, &picked_up);
            let response = self.send(&url, request, cookie.as_deref()).await?;
            let status = response.status();
            let mut headers = lowercase_headers(&response);

            let location = status
                .is_redirection()
                .then(|| response.headers().get(LOCATION))
                .flatten()
                .and_then(|v| v.to_str().ok())
                .and_then(|v| response.url().join(v).ok());

            if let Some(next) = location {
                if hops >= self.max_redirects {
                    return Err(FetchError::Request(format!(
                        "Too many redirects fetching {}",
                        request.url
                    )));
                }
                hops += 1;
                set_cookies.extend(headers.into_iter().filter(|(k, _)| k == "set-cookie"));
                debug!(from = %url, to = %next, status = status.as_u16(), "Following redirect");
                url = next;
                continue;
            }

            // Earlier hops first so the final response's cookies win
            set_cookies.append(&mut headers);
            let body = response.text().await.map_err(map_error)?;
            debug!(url = %request.url, status = status.as_u16(), hops, bytes = body.len(), "Fetched");

            return Ok(FetchResponse {
                status: status.as_u16(),
                headers: set_cookies,
                body,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer one connection per canned response and hand back the raw
    /// request heads.
    async fn serve(responses: Vec<&'static str>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut heads = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                heads.push(String::from_utf8_lossy(&head).to_lowercase());
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            heads
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_redirect_cookies_are_forwarded_and_returned() {
        let (addr, server) = serve(vec![
            "HTTP/1.1 302 Found\r\nLocation: /landing\r\nSet-Cookie: queueit=abc; Path=/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "HTTP/1.1 200 OK\r\nSet-Cookie: sid=xyz; HttpOnly\r\nContent-Length: 7\r\nConnection: close\r\n\r\ntickets",
        ])
        .await;
        let fetcher = ReqwestFetcher::new(&HttpConfig::default()).unwrap();
        let request = FetchRequest::new(format!("{}/start", addr), Duration::from_secs(5))
            .with_headers(vec![("Cookie".to_string(), "consent=yes".to_string())]);

        let response = fetcher.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "tickets");
        assert_eq!(
            response.cookies(),
            vec![
                ("queueit".to_string(), "abc".to_string()),
                ("sid".to_string(), "xyz".to_string())
            ]
        );

        let heads = server.await.unwrap();
        assert!(heads[0].starts_with("get /start "));
        assert!(heads[0].contains("cookie: consent=yes\r\n"));
        assert!(heads[1].starts_with("get /landing "));
        assert!(heads[1].contains("cookie: consent=yes; queueit=abc\r\n"));
    }

    #[tokio::test]
    async fn test_redirect_limit_is_an_error() {
        let (addr, _server) = serve(vec![
            "HTTP/1.1 301 Moved Permanently\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        ])
        .await;
        let config = HttpConfig {
            max_redirects: 0,
            ..Default::default()
        };
        let fetcher = ReqwestFetcher::new(&config).unwrap();

        let err = fetcher
            .fetch(&FetchRequest::new(addr, Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }

    #[test]
    fn test_merged_cookie_overrides_by_name() {
        let request = FetchRequest::new("http://x.test", Duration::from_secs(1))
            .with_headers(vec![("Cookie".to_string(), "sid=old; consent=yes".to_string())]);
        assert_eq!(merged_cookie(&request, &[]), None);
        assert_eq!(
            merged_cookie(&request, &[("sid".to_string(), "new".to_string())]).as_deref(),
            Some("sid=new; consent=yes")
        );
    }

    #[test]
    fn test_builds_with_tls_verification_disabled() {
        let config = HttpConfig {
            verify_tls: false,
            max_redirects: 0,
            ..Default::default()
        };
        assert!(ReqwestFetcher::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_transport_error() {
        let fetcher = ReqwestFetcher::new(&HttpConfig::default()).unwrap();
        // Port 9 (discard) on localhost is closed in test environments
        let request = FetchRequest::new("http://127.0.0.1:9/", Duration::from_secs(2));
        let err = fetcher.fetch(&request).await.unwrap_err();
        assert!(matches!(err, FetchError::Connect(_) | FetchError::Request(_) | FetchError::Timeout));
    }
}
