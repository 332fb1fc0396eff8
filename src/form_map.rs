//! Selectors describing the hosted application form.
//!
//! The hosted form is outside our control and its markup changes between
//! versions, so every selector lives here as data. The built-in map can be
//! replaced wholesale from a JSON file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical field names used by the section fillers.
pub mod keys {
    pub const ENTITY_TYPE: &str = "entityType";
    pub const COMPANY_NAME: &str = "companyName";
    pub const COMPANY_NAME_KANA: &str = "companyNameKana";
    pub const REP_LAST_NAME: &str = "representativeLastName";
    pub const REP_FIRST_NAME: &str = "representativeFirstName";
    pub const REP_LAST_NAME_KANA: &str = "representativeLastNameKana";
    pub const REP_FIRST_NAME_KANA: &str = "representativeFirstNameKana";
    pub const POSTAL_CODE: &str = "postalCode";
    pub const PREFECTURE: &str = "prefecture";
    pub const CITY: &str = "city";
    pub const STREET: &str = "street";
    pub const WORKER_COUNT: &str = "workerCount";
    pub const APPLICATION_METHOD: &str = "applicationMethod";
    pub const CONTACT_LAST_NAME: &str = "contactLastName";
    pub const CONTACT_FIRST_NAME: &str = "contactFirstName";
    pub const CONTACT_LAST_NAME_KANA: &str = "contactLastNameKana";
    pub const CONTACT_FIRST_NAME_KANA: &str = "contactFirstNameKana";
    pub const CONTACT_PHONE: &str = "contactPhone";
    pub const CONTACT_EMAIL: &str = "contactEmail";
    pub const AGENT_NAME: &str = "agentName";
    pub const APPLICATION_REASON: &str = "applicationReason";
    pub const CONFIRM_BUTTON: &str = "confirmButton";
    pub const SUBMIT_BUTTON: &str = "submitButton";
}

/// Identifies one field on the page: a logical name, plus an item index for
/// repeated blocks and an option label for radio groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub name: String,
    pub index: Option<usize>,
    pub option: Option<String>,
}

impl FieldKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
            option: None,
        }
    }

    /// Scope the key to the `index`-th repeated block (1-based).
    pub fn indexed(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Select one option of a radio-style group by its visible label.
    pub fn option(mut self, label: impl Into<String>) -> Self {
        self.option = Some(label.into());
        self
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        if let Some(option) = &self.option {
            write!(f, "={option}")?;
        }
        Ok(())
    }
}

/// A CSS query with an optional exact accessible-name filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Query {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{} (name {:?})", self.css, text),
            None => f.write_str(&self.css),
        }
    }
}

/// One way of finding a field in the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// A plain `input`/`select`/`textarea` carrying `name="..."`.
    Name(String),
    /// A framework-rendered widget: the visible input carries
    /// `attr="value"` and the clickable surface is `surface_depth` levels up.
    Data {
        attr: String,
        value: String,
        #[serde(default)]
        surface_depth: usize,
    },
    /// Arbitrary CSS, optionally narrowed to an exact accessible name.
    Css {
        css: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl Strategy {
    /// Build the concrete query for `key`, scoped by `item_scope` when the
    /// key is indexed.
    pub fn query(&self, key: &FieldKey, item_scope: &str) -> Query {
        let scope = match key.index {
            Some(index) => format!("{} ", item_scope.replace("{index}", &index.to_string())),
            None => String::new(),
        };
        match self {
            Strategy::Name(name) => {
                let name = css_string(name);
                let css = match &key.option {
                    Some(option) => {
                        format!("{scope}input[name={name}][value={}]", css_string(option))
                    }
                    None => format!(
                        "{scope}input[name={name}], {scope}select[name={name}], {scope}textarea[name={name}]"
                    ),
                };
                Query { css, text: None }
            }
            Strategy::Data { attr, value, .. } => Query {
                css: format!("{scope}[{attr}={}]", css_string(value)),
                text: key.option.clone(),
            },
            Strategy::Css { css, text } => Query {
                css: format!("{scope}{css}"),
                text: key.option.clone().or_else(|| text.clone()),
            },
        }
    }

    /// How many ancestors up the interactive surface sits.
    pub fn surface_depth(&self) -> usize {
        match self {
            Strategy::Data { surface_depth, .. } => *surface_depth,
            _ => 0,
        }
    }
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub strategies: Vec<Strategy>,
}

impl FieldSpec {
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormMap {
    /// Present once the entry form has fully rendered.
    pub anchor: Query,
    /// Prefix for repeated blocks; `{index}` is replaced by the item index.
    pub item_scope: String,
    /// Floating menu opened by composite dropdowns.
    pub menu: Query,
    /// An option inside the floating menu; the name filter is set per lookup.
    pub menu_option: Query,
    /// A suggestion row of the application-reason autocomplete.
    pub autocomplete_item: Query,
    pub fields: BTreeMap<String, FieldSpec>,
}

impl FormMap {
    /// Load a map from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid form map {}: {e}", path.display())))
    }

    pub fn field(&self, name: &str) -> Result<&FieldSpec> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::Config(format!("form map has no entry for field '{name}'")))
    }
}

const DATA_ATTR: &str = "data-field-code";

/// A field that is either a plain named input or a composite widget whose
/// surface is the input's grandparent.
fn input_field(name: &str) -> FieldSpec {
    FieldSpec::new(vec![
        Strategy::Name(name.to_string()),
        Strategy::Data {
            attr: DATA_ATTR.to_string(),
            value: name.to_string(),
            surface_depth: 2,
        },
    ])
}

/// A radio group: labels inside the group container, picked by option text.
fn radio_group(name: &str) -> FieldSpec {
    FieldSpec::new(vec![
        Strategy::Css {
            css: format!("[{DATA_ATTR}=\"{name}\"] label"),
            text: None,
        },
        Strategy::Name(name.to_string()),
    ])
}

fn button(text: &str) -> FieldSpec {
    FieldSpec::new(vec![Strategy::Css {
        css: "button".to_string(),
        text: Some(text.to_string()),
    }])
}

impl Default for FormMap {
    fn default() -> Self {
        use keys::*;

        let mut fields = BTreeMap::new();
        for name in [
            COMPANY_NAME,
            COMPANY_NAME_KANA,
            REP_LAST_NAME,
            REP_FIRST_NAME,
            REP_LAST_NAME_KANA,
            REP_FIRST_NAME_KANA,
            POSTAL_CODE,
            PREFECTURE,
            CITY,
            STREET,
            WORKER_COUNT,
            CONTACT_LAST_NAME,
            CONTACT_FIRST_NAME,
            CONTACT_LAST_NAME_KANA,
            CONTACT_FIRST_NAME_KANA,
            CONTACT_PHONE,
            CONTACT_EMAIL,
            AGENT_NAME,
            APPLICATION_REASON,
        ] {
            fields.insert(name.to_string(), input_field(name));
        }
        fields.insert(ENTITY_TYPE.to_string(), radio_group(ENTITY_TYPE));
        fields.insert(APPLICATION_METHOD.to_string(), radio_group(APPLICATION_METHOD));
        fields.insert(CONFIRM_BUTTON.to_string(), button("確認画面へ進む"));
        fields.insert(SUBMIT_BUTTON.to_string(), button("送信する"));

        Self {
            anchor: Query::css(format!("[name=\"{COMPANY_NAME}\"], [{DATA_ATTR}=\"{COMPANY_NAME}\"]")),
            item_scope: "[data-item-index=\"{index}\"]".to_string(),
            menu: Query::css("[role=\"listbox\"]"),
            menu_option: Query::css("[role=\"listbox\"] [role=\"option\"]"),
            autocomplete_item: Query::css("[role=\"listbox\"] li"),
            fields,
        }
    }
}
