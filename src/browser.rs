use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CrBrowser, BrowserConfig as CrBrowserConfig};
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::page::{ChromePage, FormPage};

/// Chrome flags that improve performance without affecting functionality.
const PERF_ARGS: &[&str] = &[
    "disable-gpu",
    "disable-extensions",
    "metrics-recording-only",
    "mute-audio",
    "no-default-browser-check",
    "no-first-run",
    "disable-client-side-phishing-detection",
    "disable-prompt-on-repost",
];

/// One exclusive browser session for a single automation run.
#[async_trait]
pub trait Session: Send + Sync {
    type Page: FormPage;

    fn page(&self) -> &Self::Page;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(self) -> Result<()>;
}

/// Acquires fresh sessions.
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: Session;

    async fn launch(&self) -> Result<Self::Session>;
}

/// Launches a local Chrome/Chromium through chromiumoxide.
pub struct ChromeLauncher {
    config: BrowserConfig,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    type Session = ChromeSession;

    async fn launch(&self) -> Result<ChromeSession> {
        ChromeSession::launch(&self.config).await
    }
}

/// A running browser with the single page the form is driven on.
pub struct ChromeSession {
    browser: CrBrowser,
    page: ChromePage,
    handler_task: tokio::task::JoinHandle<()>,
}

impl ChromeSession {
    async fn launch(config: &BrowserConfig) -> Result<Self> {
        let mut builder = CrBrowserConfig::builder();

        if config.headless {
            builder = builder.new_headless_mode().no_sandbox();
        } else {
            builder = builder.with_head().no_sandbox();
        }

        // chromiumoxide adds the `--` prefix itself
        for arg in PERF_ARGS {
            builder = builder.arg(*arg);
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder = builder.viewport(Viewport {
            width: config.viewport_width,
            height: config.viewport_height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: false,
            has_touch: false,
        });

        let cr_config = builder
            .build()
            .map_err(|e| Error::SessionError(format!("invalid browser config: {e}")))?;

        let (mut browser, mut handler) = CrBrowser::launch(cr_config)
            .await
            .map_err(|e| Error::SessionError(format!("browser launch failed: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        let opened = match browser.new_page("about:blank").await {
            Ok(cr_page) => ChromePage::new(cr_page).await,
            Err(e) => Err(Error::SessionError(format!("cannot open page: {e}"))),
        };
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                // No session exists yet to close, so tear the process down here.
                let _ = browser.close().await;
                handler_task.abort();
                return Err(e);
            }
        };
        debug!(headless = config.headless, "browser session started");

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }
}

#[async_trait]
impl Session for ChromeSession {
    type Page = ChromePage;

    fn page(&self) -> &ChromePage {
        &self.page
    }

    async fn close(self) -> Result<()> {
        let Self {
            mut browser,
            page,
            handler_task,
        } = self;

        if let Err(e) = page.close().await {
            warn!(error = %e, "closing page failed");
        }
        let result = browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| Error::SessionError(format!("browser close failed: {e}")));
        let _ = browser.wait().await;
        handler_task.abort();
        debug!("browser session closed");
        result
    }
}
