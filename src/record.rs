/// A row type with a fixed column order, written one file per batch.
pub trait Tabular {
    const COLUMNS: &'static [&'static str];

    /// Cell values in `COLUMNS` order; absent values are empty cells.
    fn cells(&self) -> Vec<&str>;
}

fn opt(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

/// Registry details for one visited result page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityRecord {
    pub keyword: String,
    pub legal_name: Option<String>,
    pub uei: Option<String>,
    pub legacy_duns: Option<String>,
    pub cage: Option<String>,
    pub physical_address: Option<String>,
    pub mailing_address: Option<String>,
    pub entity_url: Option<String>,
    pub start_date: Option<String>,
    pub contact1: Option<String>,
    pub contact2: Option<String>,
    pub state_country_incorporation: Option<String>,
    pub congressional_district: Option<String>,
}

impl EntityRecord {
    pub fn new(keyword: &str) -> Self {
        EntityRecord {
            keyword: keyword.to_string(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::LegalName => &mut self.legal_name,
            Field::Uei => &mut self.uei,
            Field::LegacyDuns => &mut self.legacy_duns,
            Field::Cage => &mut self.cage,
            Field::PhysicalAddress => &mut self.physical_address,
            Field::MailingAddress => &mut self.mailing_address,
            Field::EntityUrl => &mut self.entity_url,
            Field::StartDate => &mut self.start_date,
            Field::Contact1 => &mut self.contact1,
            Field::Contact2 => &mut self.contact2,
            Field::StateCountryIncorporation => &mut self.state_country_incorporation,
            Field::CongressionalDistrict => &mut self.congressional_district,
        };
        *slot = value;
    }

    /// True when nothing but the keyword was found.
    pub fn is_blank(&self) -> bool {
        self.cells().iter().skip(1).all(|c| c.is_empty())
    }
}

impl Tabular for EntityRecord {
    const COLUMNS: &'static [&'static str] = &[
        "keyword",
        "legal_name",
        "uei",
        "legacy_duns",
        "cage",
        "physical_address",
        "mailing_address",
        "entity_url",
        "start_date",
        "contact1",
        "contact2",
        "state_country_incorporation",
        "congressional_district",
    ];

    fn cells(&self) -> Vec<&str> {
        vec![
            self.keyword.as_str(),
            opt(&self.legal_name),
            opt(&self.uei),
            opt(&self.legacy_duns),
            opt(&self.cage),
            opt(&self.physical_address),
            opt(&self.mailing_address),
            opt(&self.entity_url),
            opt(&self.start_date),
            opt(&self.contact1),
            opt(&self.contact2),
            opt(&self.state_country_incorporation),
            opt(&self.congressional_district),
        ]
    }
}

/// Optional columns of [`EntityRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LegalName,
    Uei,
    LegacyDuns,
    Cage,
    PhysicalAddress,
    MailingAddress,
    EntityUrl,
    StartDate,
    Contact1,
    Contact2,
    StateCountryIncorporation,
    CongressionalDistrict,
}

/// One row of a sub-award listing, tied to its entity by keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FundingRecord {
    pub keyword: String,
    pub award_number: String,
    pub company_name: String,
    pub amount: String,
    pub date: String,
    pub award_id: String,
    pub recipient_name: String,
    pub awarding_agency: String,
    pub awarding_sub_agency: String,
}

impl Tabular for FundingRecord {
    const COLUMNS: &'static [&'static str] = &[
        "keyword",
        "award_number",
        "company_name",
        "amount",
        "date",
        "award_id",
        "recipient_name",
        "awarding_agency",
        "awarding_sub_agency",
    ];

    fn cells(&self) -> Vec<&str> {
        [
            &self.keyword,
            &self.award_number,
            &self.company_name,
            &self.amount,
            &self.date,
            &self.award_id,
            &self.recipient_name,
            &self.awarding_agency,
            &self.awarding_sub_agency,
        ]
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}
