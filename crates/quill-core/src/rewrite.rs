//! Client for the remote chat-completion endpoint that performs rewrites.

use crate::action::RewriteAction;
use crate::error::{QuillError, Result};
use crate::settings::Settings;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// One rewrite of `text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRequest {
    pub text: String,
    pub action: RewriteAction,
    /// Only meaningful for [`RewriteAction::Translate`]
    pub target_language: Option<String>,
}

impl RewriteRequest {
    pub fn new(text: impl Into<String>, action: RewriteAction) -> Self {
        Self {
            text: text.into(),
            action,
            target_language: None,
        }
    }

    pub fn with_target_language(mut self, language: Option<String>) -> Self {
        self.target_language = language.filter(|l| !l.trim().is_empty());
        self
    }
}

/// Languages used when a translation request names none
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDefaults {
    pub target: String,
    /// Used by the model when the text is already in the target language
    pub fallback: String,
}

impl Default for LanguageDefaults {
    fn default() -> Self {
        Self {
            target: "English".to_string(),
            fallback: "Spanish".to_string(),
        }
    }
}

impl LanguageDefaults {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            target: settings.translate_language.clone(),
            fallback: settings.translate_fallback_language.clone(),
        }
    }
}

/// The instruction sent to the model. The input is appended verbatim.
pub fn build_instruction(request: &RewriteRequest, languages: &LanguageDefaults) -> String {
    let text = &request.text;
    match request.action {
        RewriteAction::Grammar => format!(
            "Correct the grammar and spelling in the following text. Return only the corrected text without any explanations:\n\n{}",
            text
        ),
        RewriteAction::Rephrase => format!(
            "Rephrase the following text to make it clearer and more concise. Return only the rephrased text without any explanations:\n\n{}",
            text
        ),
        RewriteAction::Summarize => format!(
            "Briefly summarize the following text, capturing the key points. Return only the summary without any explanations:\n\n{}",
            text
        ),
        RewriteAction::Translate => {
            let target = request
                .target_language
                .as_deref()
                .unwrap_or(&languages.target);
            let fallback = if languages.fallback.eq_ignore_ascii_case(target) {
                // A fallback equal to the target would loop back to itself
                if target.eq_ignore_ascii_case("English") {
                    "Spanish"
                } else {
                    "English"
                }
            } else {
                languages.fallback.as_str()
            };
            format!(
                "Translate the following text to {target}. If the text is already in {target}, translate it to {fallback} instead. Return only the translated text without any explanations:\n\n{text}",
                target = target,
                fallback = fallback,
                text = text
            )
        }
    }
}

/// Produces rewritten text for a request.
pub trait RewriteClient: Send + Sync {
    fn rewrite(&self, request: &RewriteRequest) -> Result<String>;
}

/// Where and how requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Managed multi-tenant deployment addressed by endpoint + deployment + API version
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
        api_key: String,
    },
    /// Direct API-key endpoint, or any OpenAI-compatible proxy
    OpenAi {
        base_url: String,
        api_key: String,
        model: String,
    },
}

impl Backend {
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.use_azure {
            Backend::Azure {
                endpoint: settings.azure_endpoint.clone(),
                deployment: settings.azure_deployment.clone(),
                api_version: settings.azure_api_version.clone(),
                api_key: settings.azure_api_key.clone(),
            }
        } else {
            Backend::OpenAi {
                base_url: settings.openai_base_url.clone(),
                api_key: settings.openai_api_key.clone(),
                model: settings.openai_model.clone(),
            }
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Backend::Azure { .. } => "azure",
            Backend::OpenAi { .. } => "openai",
        }
    }

    /// Chat completions URL, without query parameters
    pub fn url(&self) -> String {
        match self {
            Backend::Azure {
                endpoint,
                deployment,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions",
                with_scheme(endpoint),
                deployment.trim()
            ),
            Backend::OpenAi { base_url, .. } => {
                format!("{}/chat/completions", with_scheme(base_url))
            }
        }
    }

    fn body(&self, instruction: &str) -> Value {
        let messages = json!([{ "role": "user", "content": instruction }]);
        match self {
            Backend::Azure { .. } => json!({ "messages": messages }),
            Backend::OpenAi { model, .. } => json!({ "model": model, "messages": messages }),
        }
    }

    fn request(&self, agent: &ureq::Agent) -> ureq::Request {
        let request = agent
            .post(&self.url())
            .set("Content-Type", "application/json");
        match self {
            Backend::Azure {
                api_version,
                api_key,
                ..
            } => request
                .query("api-version", api_version.trim())
                .set("api-key", api_key.trim()),
            Backend::OpenAi { api_key, .. } => {
                request.set("Authorization", &format!("Bearer {}", api_key.trim()))
            }
        }
    }
}

fn with_scheme(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Pull the rewritten text out of a response envelope. Accepts the chat
/// completion shape and, as fallbacks, a top-level `content` or `response`
/// string.
pub fn extract_completion(body: &Value) -> Option<String> {
    let text = body["choices"][0]["message"]["content"]
        .as_str()
        .or_else(|| body["content"].as_str())
        .or_else(|| body["response"].as_str())?
        .trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// [`RewriteClient`] over HTTP with one bounded wait and no retries.
pub struct ChatClient {
    backend: Backend,
    languages: LanguageDefaults,
    agent: ureq::Agent,
}

impl ChatClient {
    pub fn new(backend: Backend, languages: LanguageDefaults, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            backend,
            languages,
            agent,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Backend::from_settings(settings),
            LanguageDefaults::from_settings(settings),
            settings.request_timeout(),
        )
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

impl RewriteClient for ChatClient {
    fn rewrite(&self, request: &RewriteRequest) -> Result<String> {
        if request.text.trim().is_empty() {
            return Err(QuillError::EmptyInput);
        }

        let instruction = build_instruction(request, &self.languages);
        let body = self.backend.body(&instruction);
        let started = Instant::now();
        info!(
            backend = self.backend.id(),
            action = %request.action,
            chars = request.text.chars().count(),
            "sending rewrite request"
        );

        let response = self
            .backend
            .request(&self.agent)
            .send_json(body)
            .map_err(|e| {
                let detail = match e {
                    ureq::Error::Status(code, response) => {
                        let body = response.into_string().unwrap_or_default();
                        format!("HTTP {}: {}", code, truncate(&body, 300))
                    }
                    ureq::Error::Transport(transport) => format!("transport error: {}", transport),
                };
                error!(backend = self.backend.id(), "rewrite request failed: {}", detail);
                QuillError::ServiceUnavailable(detail)
            })?;

        let json: Value = response.into_json().map_err(|e| {
            error!(backend = self.backend.id(), "malformed rewrite response: {}", e);
            QuillError::ServiceUnavailable(format!("malformed response body: {}", e))
        })?;

        let text = extract_completion(&json).ok_or_else(|| {
            error!(backend = self.backend.id(), "rewrite response had no completion text");
            QuillError::ServiceUnavailable("response contained no completion text".to_string())
        })?;

        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.chars().count(),
            "rewrite completed"
        );
        Ok(text)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A local HTTP endpoint standing in for the chat completion service.

    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::runtime::Runtime;
    use warp::http::StatusCode;
    use warp::Filter;

    #[derive(Debug, Clone)]
    pub struct Recorded {
        pub path: String,
        pub query: Option<String>,
        pub api_key: Option<String>,
        pub authorization: Option<String>,
        pub body: Value,
    }

    pub struct MockEndpoint {
        pub base_url: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
        _runtime: Runtime,
    }

    impl MockEndpoint {
        /// Answer every POST with `status` and `body`
        pub fn replying(status: u16, body: impl Into<String>) -> Self {
            Self::replying_after(Duration::ZERO, status, body)
        }

        /// Like [`MockEndpoint::replying`], holding each reply back for `delay`
        pub fn replying_after(delay: Duration, status: u16, body: impl Into<String>) -> Self {
            let runtime = Runtime::new().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorded = Arc::clone(&requests);
            let reply_body: String = body.into();
            let status = StatusCode::from_u16(status).unwrap();

            let query = warp::query::raw()
                .map(Some)
                .or(warp::any().map(|| None))
                .unify();
            let route = warp::post()
                .and(warp::path::full())
                .and(query)
                .and(warp::header::optional::<String>("api-key"))
                .and(warp::header::optional::<String>("authorization"))
                .and(warp::body::json())
                .and_then(
                    move |path: warp::path::FullPath,
                          query: Option<String>,
                          api_key: Option<String>,
                          authorization: Option<String>,
                          body: Value| {
                        recorded.lock().unwrap().push(Recorded {
                            path: path.as_str().to_string(),
                            query,
                            api_key,
                            authorization,
                            body,
                        });
                        let reply = warp::reply::with_status(
                            warp::reply::with_header(
                                reply_body.clone(),
                                "content-type",
                                "application/json",
                            ),
                            status,
                        );
                        async move {
                            if !delay.is_zero() {
                                tokio::time::sleep(delay).await;
                            }
                            Ok::<_, std::convert::Infallible>(reply)
                        }
                    },
                );

            let (addr, server) = {
                let _guard = runtime.enter();
                warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0))
            };
            runtime.spawn(server);

            Self {
                base_url: format!("http://{}", addr),
                requests,
                _runtime: runtime,
            }
        }

        pub fn completing(text: &str) -> Self {
            Self::replying(200, completion(text))
        }

        pub fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// A chat completion envelope holding `text`
    pub fn completion(text: &str) -> String {
        json!({
            "id": "chatcmpl-test",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": text}}]
        })
        .to_string()
    }

    /// A URL nothing listens on
    pub fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }

    pub fn openai_client(base_url: &str) -> ChatClient {
        openai_client_with_timeout(base_url, Duration::from_secs(5))
    }

    pub fn openai_client_with_timeout(base_url: &str, timeout: Duration) -> ChatClient {
        ChatClient::new(
            Backend::OpenAi {
                base_url: base_url.to_string(),
                api_key: "test-key".to_string(),
                model: "gpt-test".to_string(),
            },
            LanguageDefaults::default(),
            timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::error::FailureKind;

    const INPUT: &str = "  Their are many mistake's here.\n\tÜnïcode ✓ stays  ";

    #[test]
    fn instructions_keep_input_verbatim_with_directive() {
        let languages = LanguageDefaults::default();
        let directives = [
            (RewriteAction::Grammar, "grammar"),
            (RewriteAction::Rephrase, "rephrase"),
            (RewriteAction::Summarize, "summariz"),
            (RewriteAction::Translate, "translate"),
        ];
        for (action, directive) in directives {
            let instruction = build_instruction(&RewriteRequest::new(INPUT, action), &languages);
            assert!(instruction.ends_with(INPUT), "{} lost its input", action);
            assert!(
                instruction.to_lowercase().contains(directive),
                "{} is missing '{}'",
                action,
                directive
            );
        }
    }

    #[test]
    fn translate_defaults_and_fallback() {
        let languages = LanguageDefaults::default();
        let default = build_instruction(
            &RewriteRequest::new("hola", RewriteAction::Translate),
            &languages,
        );
        assert!(default.contains("to English"));
        assert!(default.contains("to Spanish instead"));

        let spanish = build_instruction(
            &RewriteRequest::new("hello", RewriteAction::Translate)
                .with_target_language(Some("Spanish".to_string())),
            &languages,
        );
        assert!(spanish.contains("to Spanish."));
        assert!(spanish.contains("to English instead"));
    }

    #[test]
    fn blank_target_language_uses_default() {
        let request = RewriteRequest::new("x", RewriteAction::Translate)
            .with_target_language(Some("  ".to_string()));
        assert_eq!(request.target_language, None);
    }

    #[test]
    fn backend_urls() {
        let azure = Backend::from_settings(&Settings::default());
        assert_eq!(
            azure.url(),
            "https://init.openai.azure.com/openai/deployments/gpt-4o/chat/completions"
        );

        let mut settings = Settings::default();
        settings.use_azure = false;
        settings.openai_base_url = "https://proxy.example.com/v1/".to_string();
        let direct = Backend::from_settings(&settings);
        assert_eq!(direct.url(), "https://proxy.example.com/v1/chat/completions");
        assert_eq!(direct.id(), "openai");
    }

    #[test]
    fn request_bodies_hold_one_user_message() {
        let azure = Backend::from_settings(&Settings::default());
        let body = azure.body("do it");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "do it");
        assert_eq!(body["messages"].as_array().map(|m| m.len()), Some(1));
        assert!(body.get("model").is_none());

        let mut settings = Settings::default();
        settings.use_azure = false;
        let body = Backend::from_settings(&settings).body("do it");
        assert_eq!(body["model"], "gpt-3.5-turbo");
    }

    #[test]
    fn extracts_completion_shapes() {
        let chat = json!({"choices": [{"message": {"role": "assistant", "content": " fixed \n"}}]});
        assert_eq!(extract_completion(&chat).as_deref(), Some("fixed"));
        assert_eq!(
            extract_completion(&json!({"content": "a"})).as_deref(),
            Some("a")
        );
        assert_eq!(
            extract_completion(&json!({"response": "b"})).as_deref(),
            Some("b")
        );
        assert_eq!(extract_completion(&json!({"choices": []})), None);
        assert_eq!(extract_completion(&json!({"content": "   "})), None);
    }

    #[test]
    fn empty_input_is_rejected_before_network() {
        // Port 9 (discard) is never contacted: validation happens first
        let client = ChatClient::new(
            Backend::OpenAi {
                base_url: "http://127.0.0.1:9".to_string(),
                api_key: String::new(),
                model: "m".to_string(),
            },
            LanguageDefaults::default(),
            Duration::from_millis(50),
        );
        let err = client
            .rewrite(&RewriteRequest::new(" \n ", RewriteAction::Grammar))
            .unwrap_err();
        assert!(matches!(err, QuillError::EmptyInput));
    }

    #[test]
    fn service_failures_collapse_to_one_kind() {
        let server_error = MockEndpoint::replying(500, r#"{"error": "boom"}"#);
        let malformed = MockEndpoint::replying(200, "<html>gateway</html>");
        let no_choices = MockEndpoint::replying(200, r#"{"choices": []}"#);
        let urls = [
            server_error.base_url.clone(),
            malformed.base_url.clone(),
            no_choices.base_url.clone(),
            refused_url(),
        ];

        for url in urls {
            let err = openai_client(&url)
                .rewrite(&RewriteRequest::new("some text", RewriteAction::Grammar))
                .unwrap_err();
            assert!(
                matches!(err, QuillError::ServiceUnavailable(_)),
                "{} gave {:?}",
                url,
                err
            );
            assert_eq!(err.kind(), FailureKind::Service);
            assert_eq!(
                err.user_message(),
                "Rewrite service unavailable, check your configuration or updates"
            );
        }
        assert_eq!(server_error.requests().len(), 1);
    }

    #[test]
    fn azure_requests_carry_deployment_version_and_key() {
        let endpoint = MockEndpoint::completing("  There are many mistakes here.\n");
        let client = ChatClient::new(
            Backend::Azure {
                endpoint: endpoint.base_url.clone(),
                deployment: "gpt-4o".to_string(),
                api_version: "2025-01-01-preview".to_string(),
                api_key: "azure-secret".to_string(),
            },
            LanguageDefaults::default(),
            Duration::from_secs(5),
        );

        let text = client
            .rewrite(&RewriteRequest::new(INPUT, RewriteAction::Grammar))
            .unwrap();
        assert_eq!(text, "There are many mistakes here.");

        let requests = endpoint.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.path, "/openai/deployments/gpt-4o/chat/completions");
        assert_eq!(request.query.as_deref(), Some("api-version=2025-01-01-preview"));
        assert_eq!(request.api_key.as_deref(), Some("azure-secret"));
        let content = request.body["messages"][0]["content"].as_str().unwrap();
        assert!(content.ends_with(INPUT));
    }

    #[test]
    fn direct_requests_use_bearer_auth_and_model() {
        let endpoint = MockEndpoint::completing("Resumen.");
        let client = openai_client(&endpoint.base_url);

        let text = client
            .rewrite(&RewriteRequest::new("long text", RewriteAction::Summarize))
            .unwrap();
        assert_eq!(text, "Resumen.");

        let request = &endpoint.requests()[0];
        assert_eq!(request.path, "/chat/completions");
        assert_eq!(request.authorization.as_deref(), Some("Bearer test-key"));
        assert_eq!(request.body["model"], "gpt-test");
        assert!(request.body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_lowercase()
            .contains("summariz"));
    }

    #[test]
    fn slow_endpoint_gives_up_at_the_client_timeout() {
        let endpoint = MockEndpoint::replying_after(
            Duration::from_secs(3),
            200,
            completion("too late"),
        );
        let client = openai_client_with_timeout(&endpoint.base_url, Duration::from_millis(200));

        let started = Instant::now();
        let err = client
            .rewrite(&RewriteRequest::new("some text", RewriteAction::Grammar))
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, QuillError::ServiceUnavailable(_)), "{:?}", err);
        assert_eq!(err.kind(), FailureKind::Service);
        assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
    }
}
