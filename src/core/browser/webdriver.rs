//! W3C WebDriver client for chromedriver.
//!
//! Speaks the JSON-over-HTTP WebDriver protocol with `reqwest`. Script
//! injection before navigation goes through chromedriver's CDP passthrough,
//! since classic WebDriver has no equivalent of
//! `Page.addScriptToEvaluateOnNewDocument`.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{BrowserFactory, BrowserOptions, BrowserSession};
use crate::errors::{HarnessError, HarnessResult};

/// Key under which WebDriver returns element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Opens one chromedriver session per simulated user
pub struct WebDriverFactory {
    client: Client,
    endpoint: String,
    options: BrowserOptions,
}

impl WebDriverFactory {
    pub fn new(endpoint: impl Into<String>, options: BrowserOptions) -> HarnessResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            options,
        })
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": self.options.chrome_args(),
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BrowserFactory for WebDriverFactory {
    async fn open(&self, session_index: usize) -> HarnessResult<Box<dyn BrowserSession>> {
        let response = self
            .client
            .post(format!("{}/session", self.endpoint))
            .json(&self.capabilities())
            .send()
            .await?;
        let value = unwrap_response(response).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| HarnessError::Browser("new session response has no sessionId".into()))?
            .to_string();

        info!(session_index, %session_id, "Opened WebDriver session");
        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            session_id,
            closed: AtomicBool::new(false),
        }))
    }
}

/// A live chromedriver session
pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> HarnessResult<Value> {
        let url = format!("{}{}", self.base, path);
        debug!(%method, %url, "WebDriver command");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        unwrap_response(request.send().await?).await
    }

    async fn find(&self, selector: &str) -> HarnessResult<String> {
        let value = self
            .command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector })),
            )
            .await?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                HarnessError::Browser(format!("element reference missing for '{selector}'"))
            })
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn add_init_script(&self, source: &str) -> HarnessResult<()> {
        self.command(
            Method::POST,
            "/goog/cdp/execute",
            Some(json!({
                "cmd": "Page.addScriptToEvaluateOnNewDocument",
                "params": { "source": source },
            })),
        )
        .await?;
        Ok(())
    }

    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> HarnessResult<()> {
        let element = self.find(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/clear"),
            Some(json!({})),
        )
        .await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> HarnessResult<()> {
        let element = self.find(selector).await?;
        self.command(
            Method::POST,
            &format!("/element/{element}/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn is_present(&self, selector: &str) -> HarnessResult<bool> {
        match self.find(selector).await {
            Ok(_) => Ok(true),
            Err(HarnessError::WebDriver { error, .. }) if error == "no such element" => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn evaluate(&self, script: &str) -> HarnessResult<Value> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    async fn close(&self) -> HarnessResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.command(Method::DELETE, "", None).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(session_id = %self.session_id, "Failed to delete WebDriver session: {}", e);
                Err(e)
            }
        }
    }
}

/// Extract `value` from a WebDriver response, mapping protocol errors.
async fn unwrap_response(response: reqwest::Response) -> HarnessResult<Value> {
    let status = response.status();
    let mut body: Value = response.json().await?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Err(HarnessError::WebDriver { error, message })
}
