use tracing::debug;

use super::FillContext;
use crate::error::{Error, Result};
use crate::form_map::{keys, FieldKey};
use crate::locator::{wait_for_visible, Shape};
use crate::page::FormPage;
use crate::record::Address;

/// Which repeated address block on the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSlot {
    Primary,
    Secondary,
}

impl AddressSlot {
    /// Item index of the block on the form (1-based).
    pub fn index(self) -> usize {
        match self {
            AddressSlot::Primary => 1,
            AddressSlot::Secondary => 2,
        }
    }
}

/// Fill the non-empty subfields of one address block; returns the number
/// of fields written.
///
/// Blank subfields are never written, so an empty secondary block leaves
/// the form untouched.
pub async fn fill_address<P: FormPage>(
    ctx: &FillContext<'_, P>,
    slot: AddressSlot,
    address: &Address,
) -> Result<usize> {
    let index = slot.index();
    let mut writes = 0;

    if let Some(postal_code) = non_blank(&address.postal_code) {
        ctx.set_text(FieldKey::new(keys::POSTAL_CODE).indexed(index), postal_code)
            .await?;
        writes += 1;
    }
    if let Some(prefecture) = non_blank(&address.prefecture) {
        select_prefecture(ctx, FieldKey::new(keys::PREFECTURE).indexed(index), prefecture)
            .await?;
        writes += 1;
    }
    if let Some(city) = non_blank(&address.city) {
        ctx.set_text(FieldKey::new(keys::CITY).indexed(index), city)
            .await?;
        writes += 1;
    }
    if let Some(street) = non_blank(&address.street) {
        ctx.set_text(FieldKey::new(keys::STREET).indexed(index), street)
            .await?;
        writes += 1;
    }

    Ok(writes)
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Pick a prefecture from either a native `<select>` or a searchable
/// dropdown widget.
async fn select_prefecture<P: FormPage>(
    ctx: &FillContext<'_, P>,
    key: FieldKey,
    prefecture: &str,
) -> Result<()> {
    let page = ctx.page;
    let located = ctx.locator.locate(page, &key).await?;

    if page.tag_name(&located.element).await? == "select" {
        page.select_option(&located.element, prefecture).await?;
        debug!(%key, prefecture, "selected from native select");
        return Ok(());
    }

    if located.shape == Shape::Flat {
        page.set_value(&located.element, prefecture).await?;
        debug!(%key, prefecture, "typed into plain input");
        return Ok(());
    }

    let map = ctx.locator.map();
    let timings = &ctx.timings;
    page.click(&located.surface).await?;
    let menu = wait_for_visible(page, &map.menu, timings.menu_timeout, timings.poll_interval);
    if menu.await?.is_none() {
        return Err(Error::MenuTimeout {
            key: key.to_string(),
            timeout: timings.menu_timeout,
        });
    }

    // Other dropdowns may keep their own listbox mounted but hidden.
    let option_query = map.menu_option.clone().with_text(prefecture);
    let option = wait_for_visible(page, &option_query, timings.menu_timeout, timings.poll_interval)
        .await?
        .ok_or_else(|| Error::ElementNotFound {
            key: format!("{key} option {prefecture:?}"),
        })?;
    page.click(&option).await?;
    debug!(%key, prefecture, "selected from dropdown menu");
    Ok(())
}
