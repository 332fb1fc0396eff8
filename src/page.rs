use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent,
};
use chromiumoxide::page::Page as CrPage;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::element::{Element, ElementRef, REF_ATTRIBUTE};
use crate::error::{Error, Result};
use crate::form_map::Query;

/// The page operations the form engine needs.
///
/// Implemented by [`ChromePage`] for real runs; tests drive the engine
/// through a simulated page instead.
#[async_trait]
pub trait FormPage: Send + Sync {
    type Handle: Clone + PartialEq + fmt::Debug + Send + Sync;

    async fn navigate(&self, url: &str) -> Result<()>;

    /// Every element matching `query`, in document order.
    async fn query(&self, query: &Query) -> Result<Vec<Self::Handle>>;

    /// The ancestor `depth` levels above `element`.
    async fn ancestor(&self, element: &Self::Handle, depth: usize) -> Result<Self::Handle>;

    /// Lower-case tag name.
    async fn tag_name(&self, element: &Self::Handle) -> Result<String>;

    async fn is_visible(&self, element: &Self::Handle) -> Result<bool>;

    async fn click(&self, element: &Self::Handle) -> Result<()>;

    /// Set the value directly and fire `input`/`change`.
    async fn set_value(&self, element: &Self::Handle, value: &str) -> Result<()>;

    /// Type text with real key events.
    async fn type_text(&self, element: &Self::Handle, text: &str) -> Result<()>;

    async fn press_key(&self, element: &Self::Handle, key: &str) -> Result<()>;

    /// Choose the `<option>` whose text equals `label`.
    async fn select_option(&self, element: &Self::Handle, label: &str) -> Result<()>;

    async fn value(&self, element: &Self::Handle) -> Result<String>;

    /// Wait until the document is loaded, no request is in flight and none
    /// has started or finished for `quiet`, failing after `timeout`.
    ///
    /// The quiet window is measured from the call at the earliest, so a
    /// request started by a click just before still counts.
    async fn wait_for_idle(&self, quiet: Duration, timeout: Duration) -> Result<()>;

    /// Visible text of the whole page.
    async fn text(&self) -> Result<String>;

    /// Fixed settle pause.
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Requests the page has started but not yet finished, fed from CDP
/// network events.
#[derive(Debug)]
struct NetworkTracker {
    state: Mutex<NetworkState>,
}

#[derive(Debug)]
struct NetworkState {
    in_flight: HashSet<String>,
    last_activity: Instant,
}

enum NetworkEvent {
    Started(String),
    Done(String),
}

impl NetworkTracker {
    fn new() -> Self {
        Self {
            state: Mutex::new(NetworkState {
                in_flight: HashSet::new(),
                last_activity: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: NetworkEvent) {
        let mut state = self.lock();
        match event {
            NetworkEvent::Started(id) => {
                state.in_flight.insert(id);
            }
            NetworkEvent::Done(id) => {
                state.in_flight.remove(&id);
            }
        }
        state.last_activity = Instant::now();
    }

    fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Nothing in flight, and nothing started or finished within `quiet`
    /// of `since` or later.
    fn quiet_since(&self, since: Instant, quiet: Duration) -> bool {
        let state = self.lock();
        state.in_flight.is_empty() && since.max(state.last_activity).elapsed() >= quiet
    }
}

/// A chromiumoxide page driven through evaluated scripts and CDP input events.
pub struct ChromePage {
    inner: CrPage,
    network: Arc<NetworkTracker>,
    network_task: JoinHandle<()>,
}

impl ChromePage {
    /// Wrap `inner` and start tracking its network requests.
    pub(crate) async fn new(inner: CrPage) -> Result<Self> {
        // Subscribe before enabling the domain so no early request is missed.
        let started = inner.event_listener::<EventRequestWillBeSent>().await?;
        let finished = inner.event_listener::<EventLoadingFinished>().await?;
        let failed = inner.event_listener::<EventLoadingFailed>().await?;
        inner.execute(NetworkEnableParams::default()).await?;

        let network = Arc::new(NetworkTracker::new());
        let tracker = Arc::clone(&network);
        let mut events = futures::stream::select(
            started.map(|e| NetworkEvent::Started(e.request_id.inner().clone())),
            futures::stream::select(
                finished.map(|e| NetworkEvent::Done(e.request_id.inner().clone())),
                failed.map(|e| NetworkEvent::Done(e.request_id.inner().clone())),
            ),
        );
        let network_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                tracker.record(event);
            }
        });

        Ok(Self {
            inner,
            network,
            network_task,
        })
    }

    /// Returns a reference to the underlying chromiumoxide Page.
    pub fn inner(&self) -> &CrPage {
        &self.inner
    }

    pub async fn close(self) -> Result<()> {
        self.network_task.abort();
        self.inner.close().await.map_err(Error::CdpError)
    }

    async fn element(&self, handle: &ElementRef) -> Result<Element> {
        let el = self
            .inner
            .find_element(handle.selector())
            .await
            .map_err(|e| Error::ElementNotFound {
                key: format!("{handle} ({e})"),
            })?;
        Ok(Element::new(el))
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T> {
        let result = self
            .inner
            .evaluate(js)
            .await
            .map_err(|e| Error::JsError(e.to_string()))?;
        result
            .into_value::<T>()
            .map_err(|e| Error::JsError(e.to_string()))
    }

    /// Wrap `body` so it runs with `el` bound to the handle's node.
    fn on_element(handle: &ElementRef, body: &str) -> String {
        let selector = js_literal(&handle.selector());
        format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) throw new Error('stale element: ' + {selector});
                {body}
            }})()
            "#
        )
    }
}

fn js_literal(value: &str) -> String {
    serde_json::Value::String(value.to_owned()).to_string()
}

/// Stamp a node with a ref attribute (once) and return the ref.
const STAMP_JS: &str = r#"
    const stamp = (node) => {
        if (!node.getAttribute(ATTR)) {
            window.__autofillRefSeq = (window.__autofillRefSeq || 0) + 1;
            node.setAttribute(ATTR, String(window.__autofillRefSeq));
        }
        return node.getAttribute(ATTR);
    };
"#;

#[async_trait]
impl FormPage for ChromePage {
    type Handle = ElementRef;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.inner
            .goto(url)
            .await
            .map_err(|e| Error::SessionError(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<ElementRef>> {
        let css = js_literal(&query.css);
        let text = match &query.text {
            Some(text) => js_literal(text),
            None => "null".to_string(),
        };
        let stamp = STAMP_JS.replace("ATTR", &js_literal(REF_ATTRIBUTE));
        let js = format!(
            r#"
            (() => {{
                {stamp}
                const wanted = {text};
                const nameOf = (el) =>
                    (el.getAttribute('aria-label') || el.innerText || el.textContent || '').trim();
                return Array.from(document.querySelectorAll({css}))
                    .filter(el => wanted === null || nameOf(el) === wanted)
                    .map(stamp);
            }})()
            "#
        );
        let refs: Vec<String> = self.eval(js).await?;
        debug!(query = %query, matches = refs.len(), "query");
        Ok(refs.into_iter().map(ElementRef::new).collect())
    }

    async fn ancestor(&self, element: &ElementRef, depth: usize) -> Result<ElementRef> {
        let stamp = STAMP_JS.replace("ATTR", &js_literal(REF_ATTRIBUTE));
        let js = Self::on_element(
            element,
            &format!(
                r#"
                {stamp}
                let node = el;
                for (let i = 0; i < {depth}; i++) {{
                    if (!node.parentElement) return '';
                    node = node.parentElement;
                }}
                return stamp(node);
                "#
            ),
        );
        let id: String = self.eval(js).await?;
        if id.is_empty() {
            return Err(Error::ElementNotFound {
                key: format!("ancestor {depth} of {element}"),
            });
        }
        Ok(ElementRef::new(id))
    }

    async fn tag_name(&self, element: &ElementRef) -> Result<String> {
        self.eval(Self::on_element(element, "return el.tagName.toLowerCase();"))
            .await
    }

    async fn is_visible(&self, element: &ElementRef) -> Result<bool> {
        let body = r#"
            const style = window.getComputedStyle(el);
            if (style.display === 'none' || style.visibility === 'hidden') return false;
            return el.getClientRects().length > 0;
        "#;
        self.eval(Self::on_element(element, body)).await
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.element(element).await?.click().await
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()> {
        // Framework-controlled inputs ignore plain `el.value = ...`; go through
        // the prototype setter so their change tracking sees the write.
        let body = format!(
            r#"
            const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
                : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
                : HTMLInputElement.prototype;
            const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
            setter.call(el, {value});
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
            "#,
            value = js_literal(value)
        );
        let _: bool = self.eval(Self::on_element(element, &body)).await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<()> {
        let el = self.element(element).await?;
        el.focus().await?;
        el.type_text(text).await
    }

    async fn press_key(&self, element: &ElementRef, key: &str) -> Result<()> {
        self.element(element).await?.press_key(key).await
    }

    async fn select_option(&self, element: &ElementRef, label: &str) -> Result<()> {
        let body = format!(
            r#"
            const wanted = {label};
            const option = Array.from(el.options || []).find(o => o.text.trim() === wanted);
            if (!option) return false;
            el.value = option.value;
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
            "#,
            label = js_literal(label)
        );
        let selected: bool = self.eval(Self::on_element(element, &body)).await?;
        if selected {
            Ok(())
        } else {
            Err(Error::ElementNotFound {
                key: format!("option {label:?} in {element}"),
            })
        }
    }

    async fn value(&self, element: &ElementRef) -> Result<String> {
        self.eval(Self::on_element(
            element,
            "return el.value === undefined ? (el.innerText || '') : String(el.value);",
        ))
        .await
    }

    async fn wait_for_idle(&self, quiet: Duration, timeout: Duration) -> Result<()> {
        let poll = Duration::from_millis(100);
        let start = Instant::now();

        loop {
            // Mid-navigation evaluations fail; treat them as "not ready yet".
            let complete = self
                .eval::<String>("document.readyState".to_string())
                .await
                .map(|state| state == "complete")
                .unwrap_or(false);

            if complete && self.network.quiet_since(start, quiet) {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "page idle"
                );
                return Ok(());
            }

            if start.elapsed() >= timeout {
                return Err(Error::Timeout(format!(
                    "page did not become idle within {timeout:?} ({} requests in flight)",
                    self.network.in_flight()
                )));
            }

            tokio::time::sleep(poll).await;
        }
    }

    async fn text(&self) -> Result<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }
}
