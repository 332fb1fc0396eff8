use tracing::{debug, warn};

use super::FillContext;
use crate::error::Result;
use crate::form_map::{keys, FieldKey};
use crate::locator::wait_for_first_visible;
use crate::page::FormPage;
use crate::record::ApplicationReason;

/// Characters typed before looking for a suggestion; enough to narrow the
/// list without filtering out the target.
const FILTER_PREFIX_CHARS: usize = 3;

/// How the application reason ended up in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonPath {
    /// The matching suggestion was clicked.
    Suggestion,
    /// No suggestion appeared; the value was set directly and committed.
    DirectSet,
}

/// Type a short prefix into the autocomplete and click the exact match,
/// falling back to setting the value directly and pressing Enter.
pub async fn fill_reason<P: FormPage>(
    ctx: &FillContext<'_, P>,
    reason: ApplicationReason,
) -> Result<ReasonPath> {
    let page = ctx.page;
    let timings = &ctx.timings;
    let key = FieldKey::new(keys::APPLICATION_REASON);
    let target = reason.label();
    let located = ctx.locator.locate(page, &key).await?;

    page.click(&located.surface).await?;
    page.set_value(&located.element, "").await?;
    let prefix: String = target.chars().take(FILTER_PREFIX_CHARS).collect();
    page.type_text(&located.element, &prefix).await?;
    page.pause(timings.autocomplete_settle).await;

    let item_query = ctx.locator.map().autocomplete_item.clone().with_text(target);
    let suggestion = wait_for_first_visible(
        page,
        &item_query,
        timings.autocomplete_timeout,
        timings.poll_interval,
    )
    .await?;

    if let Some(item) = suggestion {
        page.click(&item).await?;
        debug!(%key, reason = target, "picked suggestion");
        return Ok(ReasonPath::Suggestion);
    }

    // The server may or may not validate a value that never came from the
    // suggestion list.
    warn!(
        %key,
        reason = target,
        "no matching suggestion within {:?}; setting the value directly",
        timings.autocomplete_timeout
    );
    page.set_value(&located.element, target).await?;
    page.press_key(&located.element, "Enter").await?;
    Ok(ReasonPath::DirectSet)
}
