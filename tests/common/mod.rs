//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use toolauth::auth::api::{AuthServerApi, AuthStatus, AuthorizationUrlRequest, CodeExchangeRequest};
use toolauth::auth::popup::{AuthorizationHook, AuthorizationPrompt, CallbackParams};
use toolauth::auth::token_store::{MemoryTokenStore, ProviderTokenRecord, TokenStore};
use toolauth::client::{Client, ReauthContext, ReauthHandler};
use toolauth::config::Config;
use toolauth::error::{Result, ToolAuthError};
use toolauth::transport::{RpcFailure, ToolTransport};
use toolauth::types::{LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_TOOLS_LIST};

pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("toolauth.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// `github` (OAuth) and `plainTool` (no OAuth, enables `echo`).
pub fn two_provider_config() -> Config {
    Config::from_yaml(
        r#"
providers:
  github:
    tools: [github_list_repos, github_create_issue]
    oauth:
      client_id: test-client
      client_secret: test-secret
      scopes: [repo]
  slack:
    tools: [slack_post_message]
    oauth:
      client_id: slack-client
      client_secret: slack-secret
  plainTool:
    tools: [echo]
"#,
    )
    .expect("valid test config")
}

// ---------------------------------------------------------------------------
// FakeTransport
// ---------------------------------------------------------------------------

/// One recorded `tools/call`.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tool: String,
    pub bearer: Option<String>,
}

/// A tool server that advertises a fixed tool list and answers `tools/call`
/// from a script, falling back to echoing the arguments.
#[derive(Debug)]
pub struct FakeTransport {
    tools: Vec<String>,
    script: Mutex<VecDeque<std::result::Result<Value, RpcFailure>>>,
    calls: Mutex<Vec<RecordedCall>>,
    pub initializes: AtomicUsize,
}

impl FakeTransport {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools.iter().map(|t| t.to_string()).collect(),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            initializes: AtomicUsize::new(0),
        }
    }

    /// Every tool the test config enables.
    pub fn all_tools() -> Self {
        Self::new(&[
            "github_list_repos",
            "github_create_issue",
            "slack_post_message",
            "echo",
        ])
    }

    pub fn push_failure(&self, failure: RpcFailure) {
        self.script.lock().unwrap().push_back(Err(failure));
    }

    pub fn push_result(&self, result: Value) {
        self.script.lock().unwrap().push_back(Ok(result));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ToolTransport for FakeTransport {
    async fn request(&self, method: &str, params: Value, bearer: Option<&str>) -> Result<Value> {
        match method {
            METHOD_INITIALIZE => {
                self.initializes.fetch_add(1, Ordering::SeqCst);
                Ok(json!({
                    "protocolVersion": LATEST_PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "fake-server", "version": "1.0.0"}
                }))
            }
            METHOD_TOOLS_LIST => Ok(json!({
                "tools": self.tools.iter().map(|t| json!({"name": t})).collect::<Vec<_>>()
            })),
            _ => {
                let tool = params["name"].as_str().unwrap_or_default().to_string();
                self.calls.lock().unwrap().push(RecordedCall {
                    tool: tool.clone(),
                    bearer: bearer.map(str::to_string),
                });
                match self.script.lock().unwrap().pop_front() {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(failure)) => Err(failure.into()),
                    None => Ok(json!({
                        "content": [{"type": "text", "text": format!("{tool}: {}", params["arguments"])}]
                    })),
                }
            }
        }
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeAuthApi
// ---------------------------------------------------------------------------

/// OAuth endpoints that issue `token-<code>` for every code.
#[derive(Debug, Default)]
pub struct FakeAuthApi {
    pub authorize_requests: Mutex<Vec<AuthorizationUrlRequest>>,
    pub exchanges: Mutex<Vec<CodeExchangeRequest>>,
    pub revokes: Mutex<Vec<(String, String)>>,
    pub fail_revoke: AtomicBool,
}

impl FakeAuthApi {
    pub fn revoke_count(&self) -> usize {
        self.revokes.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl AuthServerApi for FakeAuthApi {
    async fn request_authorization_url(&self, request: &AuthorizationUrlRequest) -> Result<String> {
        self.authorize_requests.lock().unwrap().push(request.clone());
        Ok(format!(
            "https://provider.example.com/authorize?client_id={}&state={}",
            request.client_id, request.state
        ))
    }

    async fn exchange_code(&self, request: &CodeExchangeRequest) -> Result<ProviderTokenRecord> {
        self.exchanges.lock().unwrap().push(request.clone());
        let mut record = ProviderTokenRecord::bearer(format!("token-{}", request.code), 3600);
        record.scopes = Some(vec!["repo".to_string()]);
        Ok(record)
    }

    async fn check_status(&self, _provider: &str, _token: &str) -> Result<AuthStatus> {
        Ok(AuthStatus {
            authorized: true,
            ..Default::default()
        })
    }

    async fn revoke(&self, provider: &str, token: &str) -> Result<()> {
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(ToolAuthError::AuthServer {
                message: "revoke endpoint returned 500".to_string(),
                status: Some(500),
            }
            .into());
        }
        self.revokes
            .lock()
            .unwrap()
            .push((provider.to_string(), token.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Answers every authorization prompt with `code=<code>` and the prompt's
/// state, as if the user approved instantly.
pub struct ApprovingHook {
    pub code: String,
}

#[async_trait::async_trait]
impl AuthorizationHook for ApprovingHook {
    async fn present(&self, prompt: &AuthorizationPrompt) -> Result<CallbackParams> {
        let state = CallbackParams::from_location(&prompt.url).state;
        Ok(CallbackParams {
            code: Some(self.code.clone()),
            state,
            ..Default::default()
        })
    }
}

/// A reauth handler with a fixed answer that can store a fresh token first.
pub struct ScriptedReauth {
    pub answer: bool,
    pub calls: Mutex<Vec<ReauthContext>>,
    pub refresh: Option<(Arc<dyn TokenStore>, String)>,
}

impl ScriptedReauth {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: Mutex::new(Vec::new()),
            refresh: None,
        }
    }

    pub fn refreshing(tokens: Arc<dyn TokenStore>, new_token: &str) -> Self {
        Self {
            answer: true,
            calls: Mutex::new(Vec::new()),
            refresh: Some((tokens, new_token.to_string())),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ReauthHandler for ScriptedReauth {
    async fn reauthenticate(&self, ctx: &ReauthContext) -> Result<bool> {
        self.calls.lock().unwrap().push(ctx.clone());
        if let Some((tokens, token)) = &self.refresh {
            tokens.set(&ctx.provider, &ProviderTokenRecord::bearer(token.clone(), 3600))?;
        }
        Ok(self.answer)
    }
}

// ---------------------------------------------------------------------------
// Client wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub client: Client,
    pub transport: Arc<FakeTransport>,
    pub api: Arc<FakeAuthApi>,
    pub tokens: Arc<MemoryTokenStore>,
}

pub fn harness(reauth: Option<Arc<dyn ReauthHandler>>) -> Harness {
    harness_with(two_provider_config(), Arc::new(MemoryTokenStore::new()), reauth)
}

pub fn harness_with(
    config: Config,
    tokens: Arc<MemoryTokenStore>,
    reauth: Option<Arc<dyn ReauthHandler>>,
) -> Harness {
    let transport = Arc::new(FakeTransport::all_tools());
    let api = Arc::new(FakeAuthApi::default());
    let mut builder = Client::builder(&config)
        .with_transport(transport.clone())
        .with_auth_api(api.clone())
        .with_token_store(tokens.clone())
        .with_authorization_hook(Arc::new(ApprovingHook {
            code: "granted".to_string(),
        }));
    if let Some(handler) = reauth {
        builder = builder.with_reauth_handler(handler);
    }
    Harness {
        client: builder.build().expect("client builds"),
        transport,
        api,
        tokens,
    }
}
