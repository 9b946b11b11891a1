use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ContextId, DriverError, Element, Locator, PageDriver};

/// W3C key under which element references are serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// A browser session driven over the W3C WebDriver HTTP protocol
/// (chromedriver, geckodriver).
pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    /// Start a new Chrome session on the WebDriver server at `server_url`.
    pub async fn connect(server_url: &str, headless: bool) -> Result<Self, DriverError> {
        let client = Client::new();
        let base = server_url.trim_end_matches('/').to_string();

        let mut args = vec!["--remote-debugging-port=9222"];
        if headless {
            args.push("--headless=new");
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let resp = client
            .post(format!("{base}/session"))
            .json(&body)
            .send()
            .await?;
        let value = unwrap_response(resp).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("session not created", "response carried no sessionId"))?
            .to_string();

        info!("WebDriver session {} started on {}", session_id, base);
        Ok(WebDriverSession {
            client,
            base,
            session_id,
        })
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}/session/{}{}", self.base, self.session_id, path);
        debug!("{} {}", method, path);
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        unwrap_response(req.send().await?).await
    }

    async fn get(&self, path: &str) -> Result<Value, DriverError> {
        self.command(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, DriverError> {
        self.command(Method::DELETE, path, None).await
    }
}

fn protocol(error: &str, message: &str) -> DriverError {
    DriverError::Protocol {
        error: error.to_string(),
        message: message.to_string(),
    }
}

fn locator_body(locator: &Locator) -> Value {
    json!({ "using": locator.strategy(), "value": locator.expr() })
}

fn element_from(value: &Value) -> Result<Element, DriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| Element(id.to_string()))
        .ok_or_else(|| protocol("invalid element", "response carried no element reference"))
}

fn optional_element(result: Result<Value, DriverError>) -> Result<Option<Element>, DriverError> {
    match result {
        Ok(value) => element_from(&value).map(Some),
        Err(DriverError::NoSuchElement) => Ok(None),
        Err(e) => Err(e),
    }
}

fn string_value(value: Value) -> Result<String, DriverError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(protocol("invalid response", &format!("expected a string, got {other}"))),
    }
}

/// Strip the `{"value": ...}` envelope and map W3C error codes.
async fn unwrap_response(resp: reqwest::Response) -> Result<Value, DriverError> {
    let status = resp.status();
    let mut body: Value = resp.json().await?;
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
    Err(map_error(error, message))
}

fn map_error(error: String, message: String) -> DriverError {
    match error.as_str() {
        "no such element" => DriverError::NoSuchElement,
        "stale element reference" => DriverError::StaleElement,
        "no such window" => DriverError::NoSuchContext,
        _ => DriverError::Protocol { error, message },
    }
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    async fn find(&mut self, locator: &Locator) -> Result<Option<Element>, DriverError> {
        optional_element(self.post("/element", locator_body(locator)).await)
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let value = self.post("/elements", locator_body(locator)).await?;
        value
            .as_array()
            .map(|items| items.iter().map(element_from).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Option<Element>, DriverError> {
        let path = format!("/element/{}/element", parent.0);
        optional_element(self.post(&path, locator_body(locator)).await)
    }

    async fn click(&mut self, element: &Element) -> Result<(), DriverError> {
        let path = format!("/element/{}/click", element.0);
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn clear(&mut self, element: &Element) -> Result<(), DriverError> {
        let path = format!("/element/{}/clear", element.0);
        self.post(&path, json!({})).await.map(|_| ())
    }

    async fn type_text(&mut self, element: &Element, text: &str) -> Result<(), DriverError> {
        let path = format!("/element/{}/value", element.0);
        self.post(&path, json!({ "text": text })).await.map(|_| ())
    }

    async fn text(&mut self, element: &Element) -> Result<String, DriverError> {
        string_value(self.get(&format!("/element/{}/text", element.0)).await?)
    }

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        // Properties resolve relative hrefs; fall back to the raw attribute.
        let property = self
            .get(&format!("/element/{}/property/{}", element.0, name))
            .await?;
        if let Value::String(s) = property {
            return Ok(Some(s));
        }
        match self
            .get(&format!("/element/{}/attribute/{}", element.0, name))
            .await?
        {
            Value::String(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    async fn is_clickable(&mut self, element: &Element) -> Result<bool, DriverError> {
        let displayed = self
            .get(&format!("/element/{}/displayed", element.0))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !displayed {
            return Ok(false);
        }
        Ok(self
            .get(&format!("/element/{}/enabled", element.0))
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        string_value(self.get("/source").await?)
    }

    async fn current_context(&mut self) -> Result<ContextId, DriverError> {
        string_value(self.get("/window").await?).map(ContextId)
    }

    async fn contexts(&mut self) -> Result<Vec<ContextId>, DriverError> {
        let value = self.get("/window/handles").await?;
        Ok(value
            .as_array()
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|h| ContextId(h.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn switch_to(&mut self, context: &ContextId) -> Result<(), DriverError> {
        self.post("/window", json!({ "handle": context.0 }))
            .await
            .map(|_| ())
    }

    async fn close_context(&mut self) -> Result<(), DriverError> {
        self.delete("/window").await.map(|_| ())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        let url = format!("{}/session/{}", self.base, self.session_id);
        unwrap_response(self.client.delete(url).send().await?).await?;
        info!("WebDriver session {} closed", self.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_w3c_error_codes() {
        assert!(matches!(
            map_error("no such element".into(), String::new()),
            DriverError::NoSuchElement
        ));
        assert!(matches!(
            map_error("no such window".into(), String::new()),
            DriverError::NoSuchContext
        ));
        match map_error("javascript error".into(), "boom".into()) {
            DriverError::Protocol { error, message } => {
                assert_eq!(error, "javascript error");
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reads_element_reference() {
        let value = json!({ ELEMENT_KEY: "abc-123" });
        assert_eq!(element_from(&value).unwrap(), Element("abc-123".into()));
        assert!(element_from(&json!({})).is_err());
    }

    #[test]
    fn missing_element_is_none() {
        assert_eq!(optional_element(Err(DriverError::NoSuchElement)).unwrap(), None);
    }

    #[test]
    fn locator_serializes_strategy() {
        let body = locator_body(&Locator::css("td > a"));
        assert_eq!(body["using"], "css selector");
        assert_eq!(body["value"], "td > a");
    }
}
