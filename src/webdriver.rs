//! Minimal W3C WebDriver client (chromedriver or a Selenium hub).
//!
//! Only the handful of commands needed to fill in and submit one form.

use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::KiraError;
use crate::submit::SessionCookie;

const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub headless: bool,
}

impl BrowserOptions {
    fn capabilities(&self) -> Value {
        let mut args = vec![format!("--user-agent={}", self.user_agent)];
        if self.headless {
            args.push("--headless".to_string());
        }
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "acceptInsecureCerts": true,
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

#[derive(Clone)]
pub struct WebDriver {
    client: Client,
    endpoint: String,
}

impl WebDriver {
    /// `endpoint` is e.g. `http://127.0.0.1:9515` or `http://127.0.0.1:4444/wd/hub`.
    pub fn new(endpoint: &str) -> Result<Self, KiraError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| KiraError::WebDriver(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn open(&self, options: &BrowserOptions) -> Result<BrowserSession, KiraError> {
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.client, Method::POST, &url, Some(options.capabilities()))?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| KiraError::WebDriver("new session response without sessionId".to_string()))?;
        debug!(session_id, "browser session opened");
        Ok(BrowserSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            closed: false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ElementRef(String);

/// An exclusively owned browser session; deleted on drop if not quit explicitly.
pub struct BrowserSession {
    client: Client,
    base: String,
    closed: bool,
}

impl BrowserSession {
    pub fn navigate(&self, url: &str) -> Result<(), KiraError> {
        self.command(Method::POST, "url", Some(json!({ "url": url })))?;
        Ok(())
    }

    pub fn find_by_css(&self, selector: &str) -> Result<ElementRef, KiraError> {
        let value = self.command(
            Method::POST,
            "element",
            Some(json!({ "using": "css selector", "value": selector })),
        )?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementRef(id.to_string()))
            .ok_or_else(|| KiraError::WebDriver(format!("no element matches {selector}")))
    }

    pub fn find_by_name(&self, name: &str) -> Result<ElementRef, KiraError> {
        self.find_by_css(&format!("[name=\"{name}\"]"))
    }

    pub fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), KiraError> {
        self.command(
            Method::POST,
            &format!("element/{}/value", element.0),
            Some(json!({ "text": text })),
        )?;
        Ok(())
    }

    pub fn click(&self, element: &ElementRef) -> Result<(), KiraError> {
        self.command(
            Method::POST,
            &format!("element/{}/click", element.0),
            Some(json!({})),
        )?;
        Ok(())
    }

    pub fn page_source(&self) -> Result<String, KiraError> {
        let value = self.command(Method::GET, "source", None)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| KiraError::WebDriver("page source is not a string".to_string()))
    }

    pub fn cookies(&self) -> Result<Vec<SessionCookie>, KiraError> {
        let value = self.command(Method::GET, "cookie", None)?;
        let cookies = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(SessionCookie {
                            name: item.get("name")?.as_str()?.to_string(),
                            value: item.get("value")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(cookies)
    }

    pub fn quit(mut self) -> Result<(), KiraError> {
        self.closed = true;
        send(&self.client, Method::DELETE, &self.base, None).map(|_| ())
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, KiraError> {
        send(&self.client, method, &format!("{}/{}", self.base, path), body)
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = send(&self.client, Method::DELETE, &self.base, None) {
            warn!(error = %err, "failed to close browser session");
        }
    }
}

fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, KiraError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .map_err(|err| KiraError::WebDriver(err.to_string()))?;
    let status = response.status();
    let payload: Value = response
        .json()
        .map_err(|err| KiraError::WebDriver(err.to_string()))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        return Err(KiraError::WebDriver(describe_error(status.as_u16(), &value)));
    }
    Ok(value)
}

fn describe_error(status: u16, value: &Value) -> String {
    let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    match value.get("message").and_then(Value::as_str) {
        Some(message) => format!("{error} ({status}): {message}"),
        None => format!("{error} ({status})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_carry_agent_and_proxy() {
        let options = BrowserOptions {
            user_agent: "KiraSraBlast/0.1.0".to_string(),
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            headless: true,
        };
        let caps = options.capabilities();
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.contains(&json!("--user-agent=KiraSraBlast/0.1.0")));
        assert!(args.contains(&json!("--headless")));
        assert!(args.contains(&json!("--proxy-server=socks5://127.0.0.1:1080")));
    }

    #[test]
    fn error_description() {
        let value = json!({ "error": "no such element", "message": "Unable to locate" });
        assert_eq!(
            describe_error(404, &value),
            "no such element (404): Unable to locate"
        );
    }
}
