//! One filler per logical section of the application form.
//!
//! Fillers only locate and interact; they never retry. A failure is
//! returned as-is and the engine attributes it to the section.

mod address;
mod reason;

use std::fmt;

use tracing::debug;

use crate::config::Timings;
use crate::error::Result;
use crate::form_map::{keys, FieldKey};
use crate::locator::FieldLocator;
use crate::page::FormPage;
use crate::record::{ApplicantRecord, PersonName};

pub use address::{fill_address, AddressSlot};
pub use reason::{fill_reason, ReasonPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    EntityType,
    Company,
    Representative,
    PrimaryAddress,
    SecondaryAddress,
    WorkerCount,
    ApplicationMethod,
    Contact,
    Agent,
    ApplicationReason,
}

impl Section {
    /// The order the hosted form requires: earlier choices reveal or
    /// change later fields.
    pub const ORDER: [Section; 10] = [
        Section::EntityType,
        Section::Company,
        Section::Representative,
        Section::PrimaryAddress,
        Section::SecondaryAddress,
        Section::WorkerCount,
        Section::ApplicationMethod,
        Section::Contact,
        Section::Agent,
        Section::ApplicationReason,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::EntityType => "entity_type",
            Section::Company => "company",
            Section::Representative => "representative",
            Section::PrimaryAddress => "primary_address",
            Section::SecondaryAddress => "secondary_address",
            Section::WorkerCount => "worker_count",
            Section::ApplicationMethod => "application_method",
            Section::Contact => "contact",
            Section::Agent => "agent",
            Section::ApplicationReason => "application_reason",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a filler did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    Completed { writes: usize },
    Skipped,
}

/// Everything a filler needs: the page, the locator and the timings.
pub struct FillContext<'a, P: FormPage> {
    pub page: &'a P,
    pub locator: FieldLocator<'a>,
    pub timings: Timings,
}

impl<'a, P: FormPage> FillContext<'a, P> {
    /// Locate a field and write `value` into it directly.
    pub async fn set_text(&self, key: FieldKey, value: &str) -> Result<()> {
        let located = self.locator.locate(self.page, &key).await?;
        self.page.set_value(&located.element, value).await?;
        debug!(%key, "value set");
        Ok(())
    }

    /// Click the radio option labelled `label`, then let the form settle.
    pub async fn choose_option(&self, group: &str, label: &str) -> Result<()> {
        let key = FieldKey::new(group).option(label);
        let located = self.locator.locate(self.page, &key).await?;
        self.page.click(&located.surface).await?;
        self.page.pause(self.timings.settle).await;
        debug!(%key, "option chosen");
        Ok(())
    }

    async fn set_person(&self, fields: [&str; 4], person: &PersonName) -> Result<usize> {
        let [last, first, last_kana, first_kana] = fields;
        self.set_text(FieldKey::new(last), &person.last_name).await?;
        self.set_text(FieldKey::new(first), &person.first_name).await?;
        self.set_text(FieldKey::new(last_kana), &person.last_name_kana).await?;
        self.set_text(FieldKey::new(first_kana), &person.first_name_kana).await?;
        Ok(4)
    }
}

/// Run the filler for `section`.
pub async fn fill_section<P: FormPage>(
    ctx: &FillContext<'_, P>,
    section: Section,
    record: &ApplicantRecord,
) -> Result<SectionOutcome> {
    let writes = match section {
        Section::EntityType => {
            ctx.choose_option(keys::ENTITY_TYPE, record.entity_type.label())
                .await?;
            1
        }
        Section::Company => {
            ctx.set_text(FieldKey::new(keys::COMPANY_NAME), &record.company.name)
                .await?;
            ctx.set_text(FieldKey::new(keys::COMPANY_NAME_KANA), &record.company.name_kana)
                .await?;
            2
        }
        Section::Representative => {
            ctx.set_person(
                [
                    keys::REP_LAST_NAME,
                    keys::REP_FIRST_NAME,
                    keys::REP_LAST_NAME_KANA,
                    keys::REP_FIRST_NAME_KANA,
                ],
                &record.representative,
            )
            .await?
        }
        Section::PrimaryAddress => {
            fill_address(ctx, AddressSlot::Primary, &record.primary_address).await?
        }
        Section::SecondaryAddress => match record.secondary_address() {
            Some(address) => fill_address(ctx, AddressSlot::Secondary, address).await?,
            None => return Ok(SectionOutcome::Skipped),
        },
        Section::WorkerCount => {
            ctx.set_text(
                FieldKey::new(keys::WORKER_COUNT),
                &record.worker_count.to_string(),
            )
            .await?;
            1
        }
        Section::ApplicationMethod => {
            ctx.choose_option(keys::APPLICATION_METHOD, record.application_method.label())
                .await?;
            1
        }
        Section::Contact => {
            let contact = &record.contact;
            let mut writes = ctx
                .set_person(
                    [
                        keys::CONTACT_LAST_NAME,
                        keys::CONTACT_FIRST_NAME,
                        keys::CONTACT_LAST_NAME_KANA,
                        keys::CONTACT_FIRST_NAME_KANA,
                    ],
                    &contact.name,
                )
                .await?;
            ctx.set_text(FieldKey::new(keys::CONTACT_PHONE), &contact.phone)
                .await?;
            ctx.set_text(FieldKey::new(keys::CONTACT_EMAIL), &contact.email)
                .await?;
            writes += 2;
            writes
        }
        Section::Agent => match record.agent_name() {
            Some(agent) => {
                ctx.set_text(FieldKey::new(keys::AGENT_NAME), agent).await?;
                1
            }
            None => return Ok(SectionOutcome::Skipped),
        },
        Section::ApplicationReason => {
            fill_reason(ctx, record.application_reason).await?;
            1
        }
    };
    Ok(SectionOutcome::Completed { writes })
}
