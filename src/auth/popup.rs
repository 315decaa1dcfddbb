//! Presenting the authorization URL to the user
//!
//! A flow in popup mode opens a window through a [`WindowOpener`] and then
//! polls it on a timer (see [`spawn_monitor`]) until the window either lands
//! on the redirect URI or is closed. The poll task is owned by a
//! [`PopupHandle`] so it can be cancelled when the manager is closed.
//!
//! The default opener, [`BrowserOpener`], launches the system browser and
//! serves the redirect URI on a loopback listener. The "window" it returns
//! reports the callback URL once the browser hits it, and reports itself
//! closed when the popup timeout elapses first.
//!
//! Hosts without a browser supply an [`AuthorizationHook`] instead, which
//! replaces window handling entirely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Result, ToolAuthError};

// ---------------------------------------------------------------------------
// Callback parameters
// ---------------------------------------------------------------------------

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code on success.
    pub code: Option<String>,
    /// State token echoed back by the provider.
    pub state: Option<String>,
    /// OAuth error code on failure, e.g. `access_denied`.
    pub error: Option<String>,
    /// Provider-supplied description of `error`.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extracts callback parameters from a full redirect URL.
    ///
    /// Unparseable URLs produce empty parameters.
    ///
    /// # Examples
    ///
    /// ```
    /// use toolauth::auth::popup::CallbackParams;
    ///
    /// let params = CallbackParams::from_location(
    ///     "http://127.0.0.1:8765/callback?code=abc&state=xyz",
    /// );
    /// assert_eq!(params.code.as_deref(), Some("abc"));
    /// assert_eq!(params.state.as_deref(), Some("xyz"));
    /// assert!(params.error.is_none());
    /// ```
    pub fn from_location(location: &str) -> Self {
        let Ok(url) = Url::parse(location) else {
            return Self::default();
        };
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }
}

// ---------------------------------------------------------------------------
// Window abstraction
// ---------------------------------------------------------------------------

/// What to open.
#[derive(Debug, Clone)]
pub struct PopupRequest {
    /// Provider authorization URL.
    pub url: String,
    /// Redirect URI the provider returns to.
    pub redirect_uri: String,
    /// Window width in pixels.
    pub width: u32,
    /// Window height in pixels.
    pub height: u32,
}

/// A window showing the provider's authorization page.
pub trait PopupWindow: Send + Sync {
    /// Current location, if it is readable.
    fn location(&self) -> Option<String>;

    /// Returns `true` once the window has been closed.
    fn is_closed(&self) -> bool;

    /// Closes the window. Idempotent.
    fn close(&self);
}

/// Host UI surface capable of opening windows and navigating.
#[async_trait::async_trait]
pub trait WindowOpener: Send + Sync {
    /// Opens a popup window for `request`.
    async fn open_popup(&self, request: &PopupRequest) -> Result<Arc<dyn PopupWindow>>;

    /// Sends the current surface to `url` (redirect mode).
    async fn navigate(&self, url: &str) -> Result<()>;
}

/// What an [`AuthorizationHook`] is asked to present.
#[derive(Debug, Clone)]
pub struct AuthorizationPrompt {
    /// Provider being authorized.
    pub provider: String,
    /// Provider authorization URL.
    pub url: String,
    /// Redirect URI the provider returns to.
    pub redirect_uri: String,
}

/// Replaces the window-based user interaction entirely.
#[async_trait::async_trait]
pub trait AuthorizationHook: Send + Sync {
    /// Shows `prompt` to the user and resolves with the callback parameters.
    async fn present(&self, prompt: &AuthorizationPrompt) -> Result<CallbackParams>;
}

// ---------------------------------------------------------------------------
// Popup monitor
// ---------------------------------------------------------------------------

/// Owner of a running popup poll task.
#[derive(Debug)]
pub struct PopupHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PopupHandle {
    /// Cancels the poll task. The task closes its window before exiting.
    pub fn close(self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the poll task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task polling `window` every `poll_interval`.
///
/// The receiver resolves with the callback parameters once the window
/// location reaches `redirect_uri` (see [`is_redirect_target`]), or with
/// [`ToolAuthError::UserCancelled`] when the window closes first or the
/// handle is closed.
pub fn spawn_monitor(
    window: Arc<dyn PopupWindow>,
    redirect_uri: String,
    poll_interval: Duration,
) -> (PopupHandle, oneshot::Receiver<Result<CallbackParams>>) {
    let (tx, rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    window.close();
                    let _ = tx.send(Err(ToolAuthError::UserCancelled(
                        "authorization flow was closed".to_string(),
                    )
                    .into()));
                    return;
                }
                _ = ticker.tick() => {
                    if let Some(location) = window.location() {
                        if is_redirect_target(&location, &redirect_uri) {
                            window.close();
                            let _ = tx.send(Ok(CallbackParams::from_location(&location)));
                            return;
                        }
                    }
                    if window.is_closed() {
                        let _ = tx.send(Err(ToolAuthError::UserCancelled(
                            "authorization window was closed before completing".to_string(),
                        )
                        .into()));
                        return;
                    }
                }
            }
        }
    });

    (PopupHandle { cancel, task }, rx)
}

/// Returns `true` when `location` points at `redirect_uri`.
///
/// Scheme, host, effective port and path must match; the query is ignored.
/// Unparseable input falls back to a prefix match.
///
/// # Examples
///
/// ```
/// use toolauth::auth::popup::is_redirect_target;
///
/// assert!(is_redirect_target(
///     "http://127.0.0.1/callback?code=c",
///     "http://127.0.0.1:80/callback",
/// ));
/// assert!(!is_redirect_target(
///     "http://127.0.0.1:8765/callbackx?code=c",
///     "http://127.0.0.1:8765/callback",
/// ));
/// ```
pub fn is_redirect_target(location: &str, redirect_uri: &str) -> bool {
    match (Url::parse(location), Url::parse(redirect_uri)) {
        (Ok(location), Ok(redirect)) => {
            location.scheme() == redirect.scheme()
                && location.host() == redirect.host()
                && location.port_or_known_default() == redirect.port_or_known_default()
                && location.path() == redirect.path()
        }
        _ => location.starts_with(redirect_uri),
    }
}

// ---------------------------------------------------------------------------
// BrowserOpener
// ---------------------------------------------------------------------------

/// Opens the system browser and catches the redirect on a loopback listener.
#[derive(Debug, Clone)]
pub struct BrowserOpener {
    popup_timeout: Duration,
}

impl BrowserOpener {
    /// Creates an opener whose windows count as closed after `popup_timeout`.
    pub fn new(popup_timeout: Duration) -> Self {
        Self { popup_timeout }
    }
}

#[async_trait::async_trait]
impl WindowOpener for BrowserOpener {
    async fn open_popup(&self, request: &PopupRequest) -> Result<Arc<dyn PopupWindow>> {
        let window = LoopbackWindow::listen(&request.redirect_uri, self.popup_timeout).await?;

        eprintln!(
            "Open the following URL in your browser to authorize:\n{}",
            request.url
        );
        try_open_browser(&request.url);

        Ok(window)
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        eprintln!("Continue authorization at:\n{url}");
        try_open_browser(url);
        Ok(())
    }
}

/// Launches the platform browser. Failures are ignored; the URL is also
/// printed to stderr.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}

struct LoopbackWindow {
    location: Arc<Mutex<Option<String>>>,
    deadline: Instant,
    closed: AtomicBool,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackWindow {
    /// Binds the loopback redirect URI and starts serving callbacks.
    async fn listen(redirect_uri: &str, popup_timeout: Duration) -> Result<Arc<Self>> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| ToolAuthError::Config(format!("invalid redirect URI: {e}")))?;
        let host = redirect
            .host_str()
            .filter(|h| matches!(*h, "127.0.0.1" | "localhost" | "[::1]"))
            .ok_or_else(|| {
                ToolAuthError::Config(format!(
                    "popup mode needs a loopback redirect URI, got {redirect_uri}"
                ))
            })?
            .trim_matches(|c: char| c == '[' || c == ']')
            .to_string();
        let port = redirect
            .port_or_known_default()
            .ok_or_else(|| ToolAuthError::Config("redirect URI has no port".to_string()))?;

        let listener = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| {
                ToolAuthError::Config(format!("failed to bind redirect listener: {e}"))
            })?;

        let window = Arc::new(Self::new(Instant::now() + popup_timeout));
        let server = tokio::spawn(serve_callback(
            listener,
            redirect,
            Arc::clone(&window.location),
        ));
        window.attach(server);
        Ok(window)
    }

    fn new(deadline: Instant) -> Self {
        Self {
            location: Arc::new(Mutex::new(None)),
            deadline,
            closed: AtomicBool::new(false),
            server: Mutex::new(None),
        }
    }

    fn attach(&self, server: JoinHandle<()>) {
        *self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(server);
    }
}

impl PopupWindow for LoopbackWindow {
    fn location(&self) -> Option<String> {
        self.location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || (Instant::now() >= self.deadline && self.location().is_none())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(server) = self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            server.abort();
        }
    }
}

const CALLBACK_OK: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nAuthorization received. You may close this tab.";
const CALLBACK_NOT_FOUND: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nNot found";

/// How long a connection may take to send its request headers.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepts connections until one hits the redirect path, then records the
/// full callback URL in `location`.
///
/// Each connection is read on its own task, so a browser's idle speculative
/// connection cannot hold up the real callback.
async fn serve_callback(
    listener: tokio::net::TcpListener,
    redirect: Url,
    location: Arc<Mutex<Option<String>>>,
) {
    let done = CancellationToken::new();
    loop {
        let accepted = tokio::select! {
            _ = done.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let stream = match accepted {
            Ok((stream, _peer)) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept authorization callback");
                return;
            }
        };

        let redirect = redirect.clone();
        let location = Arc::clone(&location);
        let done = done.clone();
        tokio::spawn(async move {
            let handled = tokio::time::timeout(
                REQUEST_READ_TIMEOUT,
                handle_connection(stream, &redirect, &location),
            )
            .await;
            match handled {
                Ok(true) => done.cancel(),
                Ok(false) => {}
                Err(_) => tracing::debug!("Dropped idle connection on redirect listener"),
            }
        });
    }
}

/// Serves one request. Returns `true` when it was the callback.
async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    redirect: &Url,
    location: &Mutex<Option<String>>,
) -> bool {
    let (read_half, mut write_half) = stream.split();
    let mut lines = BufReader::new(read_half).lines();
    let mut request_line = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.is_empty() {
            break;
        }
        if request_line.is_empty() {
            request_line = line;
        }
    }

    // "GET /callback?code=...&state=... HTTP/1.1"
    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let full = match redirect.join(target) {
        Ok(full) if full.path() == redirect.path() => full,
        _ => {
            let _ = write_half.write_all(CALLBACK_NOT_FOUND.as_bytes()).await;
            return false;
        }
    };

    {
        let mut location = location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if location.is_none() {
            *location = Some(full.to_string());
        }
    }
    let _ = write_half.write_all(CALLBACK_OK.as_bytes()).await;
    tracing::debug!("Authorization callback received on loopback listener");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedWindow {
        location: Mutex<Option<String>>,
        closed: AtomicBool,
    }

    impl ScriptedWindow {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                location: Mutex::new(None),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl PopupWindow for ScriptedWindow {
        fn location(&self) -> Option<String> {
            self.location.lock().unwrap().clone()
        }
        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    const REDIRECT: &str = "http://127.0.0.1:8765/callback";

    #[test]
    fn test_callback_params_with_error() {
        let params = CallbackParams::from_location(
            "http://127.0.0.1:8765/callback?error=access_denied&error_description=no%20thanks&state=s",
        );
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("no thanks"));
        assert!(params.code.is_none());
    }

    #[test]
    fn test_callback_params_from_garbage_is_empty() {
        assert_eq!(CallbackParams::from_location("::not a url::"), CallbackParams::default());
    }

    #[tokio::test]
    async fn test_monitor_reports_callback() {
        let window = ScriptedWindow::new();
        let (_handle, rx) =
            spawn_monitor(window.clone(), REDIRECT.to_string(), Duration::from_millis(5));
        *window.location.lock().unwrap() = Some(format!("{REDIRECT}?code=c1&state=s1"));

        let params = rx.await.unwrap().unwrap();
        assert_eq!(params.code.as_deref(), Some("c1"));
        assert!(window.is_closed(), "monitor closes the window once done");
    }

    #[tokio::test]
    async fn test_monitor_ignores_provider_pages() {
        let window = ScriptedWindow::new();
        *window.location.lock().unwrap() = Some("https://github.com/login".to_string());
        let (handle, rx) =
            spawn_monitor(window.clone(), REDIRECT.to_string(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        window.close();

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(
            crate::error::kind(&err),
            Some(ToolAuthError::UserCancelled(_))
        ));
    }

    #[tokio::test]
    async fn test_close_handle_cancels_monitor() {
        let window = ScriptedWindow::new();
        let (handle, rx) =
            spawn_monitor(window.clone(), REDIRECT.to_string(), Duration::from_secs(60));
        handle.close();

        // A dropped sender also means cancelled.
        if let Ok(result) = rx.await {
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    async fn test_monitor_matches_redirect_with_default_port() {
        let window = ScriptedWindow::new();
        *window.location.lock().unwrap() =
            Some("http://127.0.0.1/callback?code=c80&state=s".to_string());
        let (_handle, rx) = spawn_monitor(
            window,
            "http://127.0.0.1:80/callback".to_string(),
            Duration::from_millis(5),
        );

        let params = rx.await.unwrap().unwrap();
        assert_eq!(params.code.as_deref(), Some("c80"));
    }

    #[test]
    fn test_redirect_target_requires_same_origin_and_path() {
        assert!(is_redirect_target(&format!("{REDIRECT}?code=c"), REDIRECT));
        assert!(!is_redirect_target("http://127.0.0.1:9999/callback?code=c", REDIRECT));
        assert!(!is_redirect_target("https://127.0.0.1:8765/callback", REDIRECT));
        assert!(!is_redirect_target("http://127.0.0.1:8765/other", REDIRECT));
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    async fn send_request(port: u16, target: &str) -> String {
        use tokio::io::AsyncReadExt;

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_callback() {
        let port = free_port();
        let redirect = format!("http://127.0.0.1:{port}/callback");
        let window = LoopbackWindow::listen(&redirect, Duration::from_secs(30))
            .await
            .unwrap();

        // A browser's speculative connection that never sends a request.
        let _idle = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();

        let response = tokio::time::timeout(
            Duration::from_secs(5),
            send_request(port, "/callback?code=c&state=s"),
        )
        .await
        .expect("callback served while another connection is idle");
        assert!(response.starts_with("HTTP/1.1 200"));

        let location = window.location().expect("callback recorded");
        assert!(is_redirect_target(&location, &redirect));
        let params = CallbackParams::from_location(&location);
        assert_eq!(params.code.as_deref(), Some("c"));
        assert_eq!(params.state.as_deref(), Some("s"));
        window.close();
    }

    #[tokio::test]
    async fn test_other_paths_get_not_found() {
        let port = free_port();
        let redirect = format!("http://127.0.0.1:{port}/callback");
        let window = LoopbackWindow::listen(&redirect, Duration::from_secs(30))
            .await
            .unwrap();

        let response = send_request(port, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(window.location().is_none());

        send_request(port, "/callback?code=later&state=s").await;
        assert!(window.location().unwrap().contains("code=later"));
        window.close();
    }

    #[test]
    fn test_loopback_window_times_out_without_callback() {
        let window = LoopbackWindow::new(Instant::now());
        assert!(window.is_closed());
    }
}
