use std::fmt;

use chromiumoxide::element::Element as CrElement;

use crate::error::{Error, Result};

/// Attribute stamped onto every element the page hands out.
pub(crate) const REF_ATTRIBUTE: &str = "data-autofill-ref";

/// Stable handle to a live DOM element.
///
/// The page stamps each matched node with a unique attribute the first time
/// it is seen, so resolving the same node twice yields equal handles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// CSS selector matching exactly this element.
    pub fn selector(&self) -> String {
        format!("[{REF_ATTRIBUTE}=\"{}\"]", self.0)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Wrapper around a chromiumoxide Element for input-level events.
pub(crate) struct Element {
    inner: CrElement,
}

impl Element {
    pub(crate) fn new(inner: CrElement) -> Self {
        Self { inner }
    }

    /// Click this element (scrolls into view first).
    pub(crate) async fn click(&self) -> Result<()> {
        self.inner.click().await.map_err(Error::CdpError)?;
        Ok(())
    }

    /// Type text into this element, one key event per character.
    pub(crate) async fn type_text(&self, text: &str) -> Result<()> {
        self.inner.type_str(text).await.map_err(Error::CdpError)?;
        Ok(())
    }

    /// Press a key on this element (e.g. "Enter", "Tab").
    pub(crate) async fn press_key(&self, key: &str) -> Result<()> {
        self.inner.press_key(key).await.map_err(Error::CdpError)?;
        Ok(())
    }

    pub(crate) async fn focus(&self) -> Result<()> {
        self.inner.focus().await.map_err(Error::CdpError)?;
        Ok(())
    }
}
