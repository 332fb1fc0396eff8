//! In-memory stand-ins for the browser: a page that mimics the hosted
//! form's widgets, plus launcher, gate, observer and sink doubles.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use subsidy_autofill::browser::{Launcher, Session};
use subsidy_autofill::config::Timings;
use subsidy_autofill::driver::{ConfirmationGate, Decision};
use subsidy_autofill::form_map::{keys, FieldKey, FormMap, Query};
use subsidy_autofill::progress::{ProgressEvent, ProgressObserver};
use subsidy_autofill::record::ApplicationReason;
use subsidy_autofill::sink::{SubmissionRow, SubmissionSink};
use subsidy_autofill::{ApplicantRecord, Error, FormPage, Result};

pub const PREFECTURES: [&str; 3] = ["東京都", "大阪府", "北海道"];
pub const RECEIPT_PAGE: &str = "送信が完了しました。\n＜ 受付番号: ABC123 ＞\n";

/// Timings small enough that every bounded wait expires quickly.
pub fn fast_timings() -> Timings {
    Timings {
        settle: Duration::ZERO,
        menu_timeout: Duration::from_millis(50),
        autocomplete_settle: Duration::ZERO,
        autocomplete_timeout: Duration::from_millis(50),
        anchor_timeout: Duration::from_millis(50),
        ready_timeout: Duration::from_millis(50),
        network_quiet: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
    }
}

pub fn record_json() -> Value {
    json!({
        "entityType": "法人",
        "company": { "name": "株式会社サンプル", "nameKana": "カブシキガイシャサンプル" },
        "representative": {
            "lastName": "山田", "firstName": "太郎",
            "lastNameKana": "ヤマダ", "firstNameKana": "タロウ"
        },
        "primaryAddress": {
            "postalCode": "100-0001", "prefecture": "東京都",
            "city": "千代田区", "street": "千代田1-1"
        },
        "workerCount": 50,
        "applicationMethod": "紙申請",
        "contact": {
            "lastName": "佐藤", "firstName": "花子",
            "lastNameKana": "サトウ", "firstNameKana": "ハナコ",
            "phone": "03-1234-5678", "email": "hanako@example.co.jp"
        },
        "applicationReason": "業務効率化・生産性向上のため"
    })
}

pub fn record_from(value: Value) -> ApplicantRecord {
    ApplicantRecord::from_json(&value.to_string()).expect("test record is valid")
}

pub fn sample_record() -> ApplicantRecord {
    record_from(record_json())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Navigate(String),
    Click(String),
    SetValue(String, String),
    Type(String, String),
    Key(String, String),
    Select(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Plain,
    Menu,
    MenuOption,
    Suggestion,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    None,
    Check,
    OpensMenu { input: usize },
    PicksMenuOption,
    Suggests,
    PicksSuggestion { input: usize },
    Confirms,
    Submits,
}

#[derive(Debug, Clone)]
struct SimElement {
    id: String,
    selectors: Vec<String>,
    name: String,
    tag: String,
    kind: Kind,
    visible: bool,
    value: String,
    parent: Option<usize>,
    options: Vec<String>,
    behavior: Behavior,
}

impl SimElement {
    fn new(id: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selectors: vec![css.into()],
            name: String::new(),
            tag: "input".to_string(),
            kind: Kind::Plain,
            visible: true,
            value: String::new(),
            parent: None,
            options: Vec::new(),
            behavior: Behavior::None,
        }
    }
}

struct State {
    elements: Vec<SimElement>,
    text: String,
    receipt_text: String,
    ops: Vec<Op>,
    menu_target: Option<usize>,
    menu_enabled: bool,
    suggestions_enabled: bool,
    idle_fails: bool,
}

/// A page laid out like the hosted form under the default [`FormMap`]:
/// plain named inputs, radio labels, searchable dropdowns for prefectures
/// and an autocomplete for the application reason.
pub struct SimPage {
    state: Mutex<State>,
}

fn css(map: &FormMap, key: &FieldKey, strategy: usize) -> Query {
    map.field(&key.name).expect("field in default map").strategies[strategy]
        .query(key, &map.item_scope)
}

impl SimPage {
    pub fn standard() -> Self {
        let map = FormMap::default();
        let mut elements: Vec<SimElement> = Vec::new();

        let flat = |elements: &mut Vec<SimElement>, key: FieldKey| {
            let query = css(&map, &key, 0);
            elements.push(SimElement::new(key.to_string(), query.css));
        };
        for name in [
            keys::COMPANY_NAME,
            keys::COMPANY_NAME_KANA,
            keys::REP_LAST_NAME,
            keys::REP_FIRST_NAME,
            keys::REP_LAST_NAME_KANA,
            keys::REP_FIRST_NAME_KANA,
            keys::WORKER_COUNT,
            keys::CONTACT_LAST_NAME,
            keys::CONTACT_FIRST_NAME,
            keys::CONTACT_LAST_NAME_KANA,
            keys::CONTACT_FIRST_NAME_KANA,
            keys::CONTACT_PHONE,
            keys::CONTACT_EMAIL,
            keys::AGENT_NAME,
        ] {
            flat(&mut elements, FieldKey::new(name));
        }
        for index in [1, 2] {
            for name in [keys::POSTAL_CODE, keys::CITY, keys::STREET] {
                flat(&mut elements, FieldKey::new(name).indexed(index));
            }
        }
        elements[0].selectors.push(map.anchor.css.clone());

        for (group, labels) in [
            (keys::ENTITY_TYPE, ["法人", "個人事業主"]),
            (keys::APPLICATION_METHOD, ["紙申請", "電子申請"]),
        ] {
            for label in labels {
                let key = FieldKey::new(group).option(label);
                let mut el = SimElement::new(key.to_string(), css(&map, &key, 0).css);
                el.tag = "label".to_string();
                el.name = label.to_string();
                el.behavior = Behavior::Check;
                elements.push(el);
            }
        }

        // Composite widgets: input -> wrapper -> clickable surface.
        let composite = |elements: &mut Vec<SimElement>, key: FieldKey| -> usize {
            let surface = elements.len();
            elements.push(SimElement::new(format!("{key}.surface"), "div.surface"));
            let wrapper = elements.len();
            let mut wrap = SimElement::new(format!("{key}.wrapper"), "div.wrapper");
            wrap.parent = Some(surface);
            elements.push(wrap);
            let input = elements.len();
            let mut el = SimElement::new(key.to_string(), css(&map, &key, 1).css);
            el.parent = Some(wrapper);
            elements.push(el);
            input
        };
        for index in [1, 2] {
            let input = composite(&mut elements, FieldKey::new(keys::PREFECTURE).indexed(index));
            elements[input - 2].behavior = Behavior::OpensMenu { input };
        }
        let reason = composite(&mut elements, FieldKey::new(keys::APPLICATION_REASON));
        elements[reason].behavior = Behavior::Suggests;

        let mut menu = SimElement::new("menu", map.menu.css.clone());
        menu.kind = Kind::Menu;
        menu.visible = false;
        elements.push(menu);
        for prefecture in PREFECTURES {
            let mut option = SimElement::new(format!("menu={prefecture}"), map.menu_option.css.clone());
            option.kind = Kind::MenuOption;
            option.name = prefecture.to_string();
            option.visible = false;
            option.behavior = Behavior::PicksMenuOption;
            elements.push(option);
        }
        for reason_option in ApplicationReason::ALL {
            let label = reason_option.label();
            let mut item =
                SimElement::new(format!("suggestion={label}"), map.autocomplete_item.css.clone());
            item.kind = Kind::Suggestion;
            item.name = label.to_string();
            item.visible = false;
            item.behavior = Behavior::PicksSuggestion { input: reason };
            elements.push(item);
        }

        for (name, behavior) in [
            (keys::CONFIRM_BUTTON, Behavior::Confirms),
            (keys::SUBMIT_BUTTON, Behavior::Submits),
        ] {
            let key = FieldKey::new(name);
            let query = css(&map, &key, 0);
            let mut button = SimElement::new(name, query.css);
            button.tag = "button".to_string();
            button.name = query.text.unwrap_or_default();
            button.behavior = behavior;
            elements.push(button);
        }

        Self {
            state: Mutex::new(State {
                elements,
                text: "申請フォーム".to_string(),
                receipt_text: RECEIPT_PAGE.to_string(),
                ops: Vec::new(),
                menu_target: None,
                menu_enabled: true,
                suggestions_enabled: true,
                idle_fails: false,
            }),
        }
    }

    fn index_of(state: &State, id: &str) -> usize {
        state
            .elements
            .iter()
            .position(|el| el.id == id)
            .unwrap_or_else(|| panic!("no element {id}"))
    }

    pub fn handle(&self, id: &str) -> usize {
        Self::index_of(&self.state.lock().unwrap(), id)
    }

    pub fn value_of(&self, id: &str) -> String {
        let state = self.state.lock().unwrap();
        state.elements[Self::index_of(&state, id)].value.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    /// True when any recorded operation targeted `id`.
    pub fn touched(&self, id: &str) -> bool {
        self.ops().iter().any(|op| match op {
            Op::Navigate(_) => false,
            Op::Click(target)
            | Op::SetValue(target, _)
            | Op::Type(target, _)
            | Op::Key(target, _)
            | Op::Select(target, _) => target == id,
        })
    }

    /// Take the element out of the DOM; no query matches it anymore.
    pub fn remove(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        let index = Self::index_of(&state, id);
        state.elements[index].selectors.clear();
    }

    /// Add a second element indistinguishable from `id`.
    pub fn duplicate(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        let index = Self::index_of(&state, id);
        let mut copy = state.elements[index].clone();
        copy.id = format!("{id}#2");
        state.elements.push(copy);
    }

    /// Clicking a dropdown surface no longer opens its menu.
    pub fn disable_menu(&self) {
        self.state.lock().unwrap().menu_enabled = false;
    }

    /// Typing into the autocomplete no longer shows suggestions.
    pub fn disable_suggestions(&self) {
        self.state.lock().unwrap().suggestions_enabled = false;
    }

    /// Render the prefecture of address block `index` as a native `<select>`.
    pub fn use_native_prefecture_select(&self, index: usize) {
        let map = FormMap::default();
        let key = FieldKey::new(keys::PREFECTURE).indexed(index);
        let mut select = SimElement::new(format!("{key}.select"), css(&map, &key, 0).css);
        select.tag = "select".to_string();
        select.options = PREFECTURES.iter().map(|p| p.to_string()).collect();
        self.state.lock().unwrap().elements.push(select);
    }

    /// Mount a second, permanently hidden listbox holding the same options,
    /// as dropdown frameworks do for every widget on the page.
    pub fn mount_hidden_menu_copy(&self) {
        let map = FormMap::default();
        let mut state = self.state.lock().unwrap();
        for prefecture in PREFECTURES {
            let mut option = SimElement::new(
                format!("hidden-menu={prefecture}"),
                map.menu_option.css.clone(),
            );
            option.name = prefecture.to_string();
            option.visible = false;
            state.elements.push(option);
        }
    }

    pub fn set_receipt_text(&self, text: &str) {
        self.state.lock().unwrap().receipt_text = text.to_string();
    }

    pub fn fail_idle(&self) {
        self.state.lock().unwrap().idle_fails = true;
    }

    fn set_visible(state: &mut State, kind: Kind, visible: bool) {
        for el in state.elements.iter_mut().filter(|el| el.kind == kind) {
            el.visible = visible;
        }
    }

    fn with_element<T>(&self, handle: usize, f: impl FnOnce(&mut State, usize) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        if handle >= state.elements.len() {
            return Err(Error::ElementNotFound {
                key: format!("handle {handle}"),
            });
        }
        f(&mut state, handle)
    }
}

#[async_trait]
impl FormPage for SimPage {
    type Handle = usize;

    async fn navigate(&self, url: &str) -> Result<()> {
        self.state.lock().unwrap().ops.push(Op::Navigate(url.to_string()));
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<usize>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.selectors.contains(&query.css))
            .filter(|(_, el)| query.text.as_deref().map_or(true, |text| el.name == text))
            .map(|(index, _)| index)
            .collect())
    }

    async fn ancestor(&self, element: &usize, depth: usize) -> Result<usize> {
        self.with_element(*element, |state, mut index| {
            for _ in 0..depth {
                index = state.elements[index].parent.ok_or_else(|| Error::ElementNotFound {
                    key: format!("ancestor {depth} of {}", state.elements[*element].id),
                })?;
            }
            Ok(index)
        })
    }

    async fn tag_name(&self, element: &usize) -> Result<String> {
        self.with_element(*element, |state, index| Ok(state.elements[index].tag.clone()))
    }

    async fn is_visible(&self, element: &usize) -> Result<bool> {
        self.with_element(*element, |state, index| Ok(state.elements[index].visible))
    }

    async fn click(&self, element: &usize) -> Result<()> {
        self.with_element(*element, |state, index| {
            let id = state.elements[index].id.clone();
            state.ops.push(Op::Click(id));
            let behavior = state.elements[index].behavior;
            match behavior {
                Behavior::None | Behavior::Suggests => {}
                Behavior::Check => state.elements[index].value = "checked".to_string(),
                Behavior::OpensMenu { input } => {
                    if state.menu_enabled {
                        state.menu_target = Some(input);
                        Self::set_visible(state, Kind::Menu, true);
                        Self::set_visible(state, Kind::MenuOption, true);
                    }
                }
                Behavior::PicksMenuOption => {
                    if let Some(target) = state.menu_target.take() {
                        state.elements[target].value = state.elements[index].name.clone();
                    }
                    Self::set_visible(state, Kind::Menu, false);
                    Self::set_visible(state, Kind::MenuOption, false);
                }
                Behavior::PicksSuggestion { input } => {
                    state.elements[input].value = state.elements[index].name.clone();
                    Self::set_visible(state, Kind::Suggestion, false);
                }
                Behavior::Confirms => state.text = "確認画面".to_string(),
                Behavior::Submits => state.text = state.receipt_text.clone(),
            }
            Ok(())
        })
    }

    async fn set_value(&self, element: &usize, value: &str) -> Result<()> {
        self.with_element(*element, |state, index| {
            let id = state.elements[index].id.clone();
            state.ops.push(Op::SetValue(id, value.to_string()));
            state.elements[index].value = value.to_string();
            Ok(())
        })
    }

    async fn type_text(&self, element: &usize, text: &str) -> Result<()> {
        self.with_element(*element, |state, index| {
            let id = state.elements[index].id.clone();
            state.ops.push(Op::Type(id, text.to_string()));
            state.elements[index].value.push_str(text);
            if state.elements[index].behavior == Behavior::Suggests && state.suggestions_enabled {
                let typed = state.elements[index].value.clone();
                for el in state.elements.iter_mut().filter(|el| el.kind == Kind::Suggestion) {
                    el.visible = el.name.starts_with(&typed);
                }
            }
            Ok(())
        })
    }

    async fn press_key(&self, element: &usize, key: &str) -> Result<()> {
        self.with_element(*element, |state, index| {
            let id = state.elements[index].id.clone();
            state.ops.push(Op::Key(id, key.to_string()));
            Ok(())
        })
    }

    async fn select_option(&self, element: &usize, label: &str) -> Result<()> {
        self.with_element(*element, |state, index| {
            let id = state.elements[index].id.clone();
            if !state.elements[index].options.iter().any(|o| o == label) {
                return Err(Error::ElementNotFound {
                    key: format!("option {label:?} in {id}"),
                });
            }
            state.ops.push(Op::Select(id, label.to_string()));
            state.elements[index].value = label.to_string();
            Ok(())
        })
    }

    async fn value(&self, element: &usize) -> Result<String> {
        self.with_element(*element, |state, index| Ok(state.elements[index].value.clone()))
    }

    async fn wait_for_idle(&self, _quiet: Duration, timeout: Duration) -> Result<()> {
        if self.state.lock().unwrap().idle_fails {
            return Err(Error::Timeout(format!("page did not become idle within {timeout:?}")));
        }
        Ok(())
    }

    async fn text(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().text.clone())
    }
}

/// Hands out sessions over one shared [`SimPage`] and counts teardowns.
pub struct SimLauncher {
    pub page: Arc<SimPage>,
    pub launches: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub fail: bool,
}

impl SimLauncher {
    pub fn new(page: Arc<SimPage>) -> Self {
        Self {
            page,
            launches: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct SimSession {
    page: Arc<SimPage>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for SimSession {
    type Page = SimPage;

    fn page(&self) -> &SimPage {
        &self.page
    }

    async fn close(self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Launcher for SimLauncher {
    type Session = SimSession;

    async fn launch(&self) -> Result<SimSession> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::SessionError("browser launch failed".into()));
        }
        Ok(SimSession {
            page: self.page.clone(),
            closes: self.closes.clone(),
        })
    }
}

/// Gives the same answer every time and counts how often it was asked.
pub struct FixedGate {
    decision: Decision,
    pub asked: AtomicUsize,
}

impl FixedGate {
    pub fn new(decision: Decision) -> Arc<Self> {
        Arc::new(Self {
            decision,
            asked: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ConfirmationGate for FixedGate {
    async fn confirm(&self, _record: &ApplicantRecord) -> Result<Decision> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.decision)
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

#[derive(Default)]
pub struct RecordingSink {
    rows: Mutex<Vec<SubmissionRow>>,
    refuse: bool,
    pub checks: AtomicUsize,
}

impl RecordingSink {
    /// A sink that refuses every row when checked up front.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<SubmissionRow> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn check(&self, row: &SubmissionRow) -> Result<()> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(Error::Sink(format!("{} is already recorded", row.email())));
        }
        Ok(())
    }

    async fn deliver(&self, row: &SubmissionRow) -> Result<()> {
        self.rows.lock().unwrap().push(row.clone());
        Ok(())
    }
}
