//! Resolve logical field keys to live elements.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::form_map::{FieldKey, FormMap, Query};
use crate::page::FormPage;

/// How a located field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A plain form control; it is its own interactive surface.
    Flat,
    /// A framework widget whose clickable surface is an ancestor container.
    Composite,
}

/// A resolved field: the input element and the surface to click.
#[derive(Debug, Clone, PartialEq)]
pub struct Located<H> {
    pub element: H,
    pub surface: H,
    pub shape: Shape,
}

pub struct FieldLocator<'a> {
    map: &'a FormMap,
}

impl<'a> FieldLocator<'a> {
    pub fn new(map: &'a FormMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &'a FormMap {
        self.map
    }

    /// Resolve `key` to exactly one element.
    ///
    /// Strategies are tried in map order and the first one that matches
    /// anything decides: one match resolves, several are ambiguous.
    pub async fn locate<P: FormPage>(&self, page: &P, key: &FieldKey) -> Result<Located<P::Handle>> {
        let spec = self.map.field(&key.name)?;

        for strategy in &spec.strategies {
            let query = strategy.query(key, &self.map.item_scope);
            let mut matches = page.query(&query).await?;
            trace!(%key, %query, matches = matches.len(), "strategy tried");

            match matches.len() {
                0 => continue,
                1 => {
                    let element = matches.remove(0);
                    let depth = strategy.surface_depth();
                    let (surface, shape) = if depth == 0 {
                        (element.clone(), Shape::Flat)
                    } else {
                        (page.ancestor(&element, depth).await?, Shape::Composite)
                    };
                    debug!(%key, ?shape, "located");
                    return Ok(Located {
                        element,
                        surface,
                        shape,
                    });
                }
                count => {
                    return Err(Error::AmbiguousElement {
                        key: key.to_string(),
                        count,
                    })
                }
            }
        }

        Err(Error::ElementNotFound {
            key: key.to_string(),
        })
    }
}

/// Poll until exactly one visible element matches `query`.
///
/// Returns `None` once `timeout` has elapsed; never waits longer.
pub async fn wait_for_visible<P: FormPage>(
    page: &P,
    query: &Query,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<P::Handle>> {
    match poll_visible(page, query, timeout, interval).await? {
        Some(mut visible) if visible.len() == 1 => Ok(visible.pop()),
        Some(visible) => Err(Error::AmbiguousElement {
            key: query.to_string(),
            count: visible.len(),
        }),
        None => Ok(None),
    }
}

/// Poll until at least one visible element matches `query` and return the
/// first in document order.
pub async fn wait_for_first_visible<P: FormPage>(
    page: &P,
    query: &Query,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<P::Handle>> {
    let visible = poll_visible(page, query, timeout, interval).await?;
    Ok(visible.and_then(|handles| handles.into_iter().next()))
}

async fn poll_visible<P: FormPage>(
    page: &P,
    query: &Query,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<Vec<P::Handle>>> {
    let start = Instant::now();

    loop {
        let mut visible = Vec::new();
        for handle in page.query(query).await? {
            if page.is_visible(&handle).await? {
                visible.push(handle);
            }
        }
        if !visible.is_empty() {
            return Ok(Some(visible));
        }

        if start.elapsed() >= timeout {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}
