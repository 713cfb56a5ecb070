use reqwest::header::HOST;
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;
use crate::error::{HostVerifyError, Result};
use crate::host::{quote, Host};
use super::types::HttpVia;

#[derive(Debug, Clone, Copy)]
pub struct HttpProbe<'a> {
    pub url: &'a str,
    pub host_header: Option<&'a str>,
    pub insecure: bool,
    pub via: HttpVia,
}

impl<'a> HttpProbe<'a> {
    pub async fn fetch(&self, host: &dyn Host, limit: Duration) -> Result<String> {
        debug!("GET {} via {}", self.url, self.via.as_str());
        match self.via {
            HttpVia::Host => self.fetch_via_host(host).await,
            HttpVia::Direct => self.fetch_direct(limit).await,
        }
    }

    /// Command line issuing this request with curl on the target.
    pub fn curl_command(&self) -> String {
        let mut cmd = String::from("curl -sS");
        if self.insecure {
            cmd.push_str(" -k");
        }
        cmd.push(' ');
        cmd.push_str(&quote(self.url));
        if let Some(header) = self.host_header {
            cmd.push_str(" --header ");
            cmd.push_str(&quote(&format!("Host: {}", header)));
        }
        cmd
    }

    async fn fetch_via_host(&self, host: &dyn Host) -> Result<String> {
        let out = host.run(&self.curl_command()).await?;
        if !out.succeeded() {
            return Err(HostVerifyError::Http(format!(
                "curl {} exited with status {}: {}",
                self.url,
                out.exit_status,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }

    async fn fetch_direct(&self, limit: Duration) -> Result<String> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(limit)
            .build()
            .map_err(|e| HostVerifyError::Http(e.to_string()))?;

        let mut request = client.get(self.url);
        if let Some(header) = self.host_header {
            request = request.header(HOST, header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HostVerifyError::Http(format!("{}: {}", self.url, e)))?;
        response
            .text()
            .await
            .map_err(|e| HostVerifyError::Http(format!("{}: {}", self.url, e)))
    }
}

/// Walk a dotted path (`software.version`, `items.0.id`) into a JSON value.
pub fn json_field<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Compare a JSON value against a literal. Strings compare by content,
/// everything else by its JSON text.
pub fn json_equals(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        other => other.to_string() == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_curl_command_with_host_header() {
        let probe = HttpProbe {
            url: "https://localhost",
            host_header: Some("yourdomain.funkwhale"),
            insecure: true,
            via: HttpVia::Host,
        };
        assert_eq!(
            probe.curl_command(),
            "curl -sS -k https://localhost --header 'Host: yourdomain.funkwhale'"
        );
    }

    #[test]
    fn test_curl_command_secure_without_header() {
        let probe = HttpProbe {
            url: "http://127.0.0.1:5000/api/v1/",
            host_header: None,
            insecure: false,
            via: HttpVia::Host,
        };
        assert_eq!(probe.curl_command(), "curl -sS http://127.0.0.1:5000/api/v1/");
    }

    #[test]
    fn test_json_field_nested() {
        let body = json!({"software": {"name": "funkwhale", "version": "0.19.0-rc2"}});
        let value = json_field(&body, "software.version").unwrap();
        assert!(json_equals(value, "0.19.0-rc2"));
    }

    #[test]
    fn test_json_field_array_index() {
        let body = json!({"protocols": ["activitypub"], "usage": {"users": {"total": 3}}});
        assert_eq!(json_field(&body, "protocols.0"), Some(&json!("activitypub")));
        assert!(json_equals(json_field(&body, "usage.users.total").unwrap(), "3"));
    }

    #[test]
    fn test_json_field_missing() {
        let body = json!({"software": {"name": "funkwhale"}});
        assert!(json_field(&body, "software.version").is_none());
        assert!(json_field(&body, "software.name.first").is_none());
    }
}
