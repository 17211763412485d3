use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, EventRequestWillBeSent, GetRequestPostDataParams, Headers,
    SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use super::{BrowserError, BrowserSurface, CapturedRequest, RouteFilter, SessionCookie, Target};
use crate::config::BrowserSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const COOKIE_FALLBACK_URL: &str = "https://www.youtube.com";

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Protocol(err.to_string())
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    filter: Option<RouteFilter>,
    generation: u64,
    captured: Option<CapturedRequest>,
}

fn lock(state: &Mutex<CaptureState>) -> MutexGuard<'_, CaptureState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Click,
    Hover,
}

/// Headless Chromium session with a single page reused for every video
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    capture: Arc<Mutex<CaptureState>>,
    handler_task: JoinHandle<()>,
    listener_task: JoinHandle<()>,
    navigation_timeout: Duration,
    closed: bool,
}

impl ChromeSession {
    /// Launch the browser, open the page and seed it with `cookies`
    pub async fn launch(
        settings: &BrowserSettings,
        cookies: &[SessionCookie],
    ) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder().args(settings.launch_args.clone());
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &settings.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        tracing::info!("Launching Chromium (headless: {})", settings.headless);
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    tracing::trace!("Browser handler event error: {}", err);
                }
            }
        });

        let page = match Self::open_page(&browser, settings, cookies).await {
            Ok(page) => page,
            Err(err) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(err);
            }
        };

        let capture = Arc::new(Mutex::new(CaptureState::default()));
        let requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let listener_task = spawn_capture_listener(page.clone(), requests, Arc::clone(&capture));

        Ok(Self {
            browser,
            page,
            capture,
            handler_task,
            listener_task,
            navigation_timeout: Duration::from_secs(settings.navigation_timeout_secs),
            closed: false,
        })
    }

    async fn open_page(
        browser: &Browser,
        settings: &BrowserSettings,
        cookies: &[SessionCookie],
    ) -> Result<Page, BrowserError> {
        let page = browser.new_page("about:blank").await?;
        page.set_user_agent(user_agent_override(settings)).await?;

        if !cookies.is_empty() {
            let params = cookies
                .iter()
                .map(cookie_param)
                .collect::<Result<Vec<_>, _>>()?;
            page.set_cookies(params).await?;
            tracing::info!("Seeded browser session with {} cookies", cookies.len());
        }

        Ok(page)
    }

    async fn act_within(
        &self,
        target: Target,
        action: Action,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_act(target, action).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::Timeout {
                    target: target.to_string(),
                    timeout,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// One attempt at acting on `target`; `false` while it is missing or not yet interactable
    async fn try_act(&self, target: Target, action: Action) -> bool {
        match target {
            Target::Css(selector) => {
                let Ok(element) = self.page.find_element(selector).await else {
                    return false;
                };
                let outcome = match action {
                    Action::Click => element.click().await.map(|_| ()),
                    Action::Hover => element.hover().await.map(|_| ()),
                };
                match outcome {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::trace!("{} not interactable yet: {}", selector, err);
                        false
                    }
                }
            }
            Target::Role { role, name } => {
                let script = role_script(role, name, action);
                match self.page.evaluate(script).await {
                    Ok(result) => result.into_value::<bool>().unwrap_or(false),
                    Err(err) => {
                        tracing::trace!("Role lookup for {} failed: {}", target, err);
                        false
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BrowserSurface for ChromeSession {
    async fn clear_routes(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Err(BrowserError::Protocol("browser session is closed".to_string()));
        }
        let mut state = lock(&self.capture);
        state.filter = None;
        state.generation += 1;
        state.captured = None;
        Ok(())
    }

    async fn route(&mut self, filter: RouteFilter) -> Result<(), BrowserError> {
        let mut state = lock(&self.capture);
        state.filter = Some(filter);
        state.generation += 1;
        state.captured = None;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<(), BrowserError> {
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {:?}", self.navigation_timeout),
            }),
        }
    }

    async fn click(&mut self, target: Target, timeout: Duration) -> Result<(), BrowserError> {
        self.act_within(target, Action::Click, timeout).await
    }

    async fn hover(&mut self, target: Target, timeout: Duration) -> Result<(), BrowserError> {
        self.act_within(target, Action::Hover, timeout).await
    }

    async fn wait(&mut self, duration: Duration) {
        sleep(duration).await;
    }

    async fn take_captured(&mut self) -> Option<CapturedRequest> {
        lock(&self.capture).captured.take()
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.listener_task.abort();

        let result = self.browser.close().await.map(|_| ());
        if let Err(err) = self.browser.wait().await {
            tracing::warn!("Failed waiting for browser process to exit: {}", err);
        }
        self.handler_task.abort();
        tracing::debug!("Browser session closed");

        result.map_err(BrowserError::from)
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!("Browser session dropped without close()");
        }
        self.listener_task.abort();
        self.handler_task.abort();
    }
}

fn spawn_capture_listener(
    page: Page,
    mut requests: EventStream<EventRequestWillBeSent>,
    capture: Arc<Mutex<CaptureState>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            let generation = {
                let state = lock(&capture);
                match state.filter {
                    Some(filter) if filter.matches(&event.request.url) => state.generation,
                    _ => continue,
                }
            };

            let body = if event.request.has_post_data.unwrap_or(false) {
                match page
                    .execute(GetRequestPostDataParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(response) => Some(response.result.post_data.clone()),
                    Err(err) => {
                        tracing::debug!("Could not read post data for {}: {}", event.request.url, err);
                        None
                    }
                }
            } else {
                None
            };

            let captured = CapturedRequest {
                url: event.request.url.clone(),
                headers: header_map(&event.request.headers),
                body,
            };

            let mut state = lock(&capture);
            if state.generation == generation {
                tracing::debug!("Captured request: {}", captured.url);
                state.captured = Some(captured);
            }
        }
    })
}

fn user_agent_override(settings: &BrowserSettings) -> SetUserAgentOverrideParams {
    SetUserAgentOverrideParams::new(settings.user_agent.clone())
}

fn header_map(headers: &Headers) -> BTreeMap<String, String> {
    match serde_json::to_value(headers) {
        Ok(Value::Object(fields)) => fields
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, value)
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn cookie_param(cookie: &SessionCookie) -> Result<CookieParam, BrowserError> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone());

    match &cookie.domain {
        Some(domain) => builder = builder.domain(domain.clone()),
        None => builder = builder.url(COOKIE_FALLBACK_URL),
    }
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    if let Some(secure) = cookie.secure {
        builder = builder.secure(secure);
    }
    if let Some(http_only) = cookie.http_only {
        builder = builder.http_only(http_only);
    }
    if let Some(expires) = cookie.expires.filter(|expires| *expires > 0.0) {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    let same_site = match cookie.same_site.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("strict") => Some(CookieSameSite::Strict),
        Some("lax") => Some(CookieSameSite::Lax),
        Some("none") => Some(CookieSameSite::None),
        _ => None,
    };
    if let Some(same_site) = same_site {
        builder = builder.same_site(same_site);
    }

    builder
        .build()
        .map_err(|err| BrowserError::Protocol(format!("invalid cookie {}: {}", cookie.name, err)))
}

/// Script that finds an element by role and accessible name (case-insensitive substring,
/// visible elements only) and performs `action` on it
fn role_script(role: &str, name: &str, action: Action) -> String {
    let selector = Value::from(format!("{role}, [role=\"{role}\"]")).to_string();
    let name = Value::from(name.to_lowercase()).to_string();
    let act = match action {
        Action::Click => "el.click();",
        Action::Hover => {
            "el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true })); \
             el.dispatchEvent(new MouseEvent('mouseenter'));"
        }
    };

    format!(
        r#"(() => {{
  for (const el of document.querySelectorAll({selector})) {{
    const label = (el.getAttribute('aria-label') || el.innerText || el.textContent || '').trim().toLowerCase();
    if (!label.includes({name}) || el.getClientRects().length === 0) continue;
    {act}
    return true;
  }}
  return false;
}})()"#
    )
}
