use crate::driver::Locator;
use crate::normalize::normalize;
use crate::output::OutputLayout;
use crate::record::Field;

const SAM_HOME: &str = "https://sam.gov/content/home";
const SAM_ENTITY_SEARCH: &str = "https://sam.gov/search/?index=ei&page=1&pageSize=25&sort=-relevance&sfm%5BsimpleSearch%5D%5BkeywordRadio%5D=ALL&sfm%5BsimpleSearch%5D%5BkeywordEditorTextarea%5D=&sfm%5Bstatus%5D%5Bis_active%5D=true&sfm%5Bstatus%5D%5Bis_inactive%5D=false";
const USAS_RECIPIENTS: &str = "https://www.usaspending.gov/recipient";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Sam,
    Recipient,
    Funding,
}

/// How an identifier becomes a search token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Free-text company names go through the normalizer.
    CompanyName,
    /// Registry identifiers are searched verbatim.
    Identifier,
}

impl QueryMode {
    pub fn token(&self, identifier: &str) -> String {
        match self {
            QueryMode::CompanyName => normalize(identifier),
            QueryMode::Identifier => identifier.trim().to_string(),
        }
    }
}

/// One-time navigation before the first search.
#[derive(Debug, Clone)]
pub enum SetupStep {
    Navigate(String),
    /// Wait for an element to become clickable, then click it.
    Click { locator: Locator, wait: SetupWait },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupWait {
    Element,
    /// The operator has to sign in by hand before the element shows up.
    Login,
}

/// Rows whose marker cell must carry a given text to count as results.
#[derive(Debug, Clone)]
pub struct RowMarker {
    pub locator: Locator,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct SearchSelectors {
    pub input: Locator,
    pub submit: Locator,
    /// One element per result row.
    pub results: Locator,
    /// Anchor inside a result row; `None` when the row element is the anchor.
    pub link_within: Option<Locator>,
    pub marker: Option<RowMarker>,
    pub max_candidates: Option<usize>,
}

/// How a detail field is read from its element(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    Text,
    /// First line of the element text.
    FirstLine,
    Attribute(&'static str),
    /// Multi-line block flattened with `,` between lines.
    Block,
    /// Text of every match joined with `, `.
    JoinAll,
    /// "<uei> (UEI )\n<duns> (Legacy DUNS )" split into uei and legacy duns.
    IdentifierPair,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub field: Field,
    pub locator: Locator,
    pub read: Read,
}

#[derive(Debug, Clone)]
pub struct DetailSelectors {
    /// Present once the page has rendered; waited for, never required.
    pub ready: Option<Locator>,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone)]
pub struct ListingSelectors {
    /// Opens the award listing in a new context.
    pub award_link: Locator,
    pub filter_dropdown: Locator,
    pub filter_option: Locator,
    /// Rows of the results table, used to notice the filtered table render.
    pub table_rows: Locator,
    /// CSS selector of the results table body in the page source.
    pub table_body_css: String,
}

/// Everything that differs between the portals the pipeline can drive.
#[derive(Debug, Clone)]
pub struct Profile {
    pub kind: ProfileKind,
    pub name: &'static str,
    pub setup: Vec<SetupStep>,
    /// Loaded before every search so each one starts from a clean form.
    pub search_url: String,
    pub input_column: &'static str,
    pub query: QueryMode,
    pub search: SearchSelectors,
    pub detail: DetailSelectors,
    pub listing: Option<ListingSelectors>,
    pub output: OutputLayout,
}

fn field(field: Field, xpath: &str, read: Read) -> FieldSpec {
    FieldSpec {
        field,
        locator: Locator::xpath(xpath),
        read,
    }
}

impl Profile {
    pub fn for_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Sam => Profile::sam(),
            ProfileKind::Recipient => Profile::recipient(),
            ProfileKind::Funding => Profile::funding(),
        }
    }

    /// sam.gov entity registrations, searched by company name.
    pub fn sam() -> Self {
        Profile {
            kind: ProfileKind::Sam,
            name: "sam.gov",
            setup: vec![
                SetupStep::Navigate(SAM_HOME.to_string()),
                SetupStep::Click {
                    locator: Locator::xpath(r#"//a[@id="search"]"#),
                    wait: SetupWait::Login,
                },
                SetupStep::Click {
                    locator: Locator::xpath(
                        r#"//div[@class="sds-card sds-card--collapsible sds-card--collapsed ng-star-inserted"]"#,
                    ),
                    wait: SetupWait::Element,
                },
                SetupStep::Click {
                    locator: Locator::xpath(r#"(//li[@class="usa-sidenav__item ng-star-inserted"])[3]"#),
                    wait: SetupWait::Element,
                },
            ],
            search_url: SAM_ENTITY_SEARCH.to_string(),
            input_column: "Company_Name",
            query: QueryMode::CompanyName,
            search: SearchSelectors {
                input: Locator::xpath(r#"//input[@name="search"]"#),
                submit: Locator::xpath(r#"//button[@class="usa-button ng-star-inserted"]"#),
                results: Locator::xpath(r#"//div[@class="grid-row grid-gap"]//a"#),
                link_within: None,
                marker: None,
                max_candidates: Some(5),
            },
            detail: DetailSelectors {
                ready: Some(Locator::xpath(
                    r#"//h1[@class="grid-col margin-top-3 display-none tablet:display-block wrap"]"#,
                )),
                fields: vec![
                    field(
                        Field::LegalName,
                        r#"//h1[@class="grid-col margin-top-3 display-none tablet:display-block wrap"]"#,
                        Read::Text,
                    ),
                    field(
                        Field::Uei,
                        r#"(//span[@class="wrap font-sans-md tablet:font-sans-lg h2"])[1]"#,
                        Read::Text,
                    ),
                    field(
                        Field::Cage,
                        r#"(//span[@class="wrap font-sans-md tablet:font-sans-lg h2"])[2]"#,
                        Read::Text,
                    ),
                    field(
                        Field::PhysicalAddress,
                        r#"//ul[@class="sds-list sds-list--unstyled margin-top-1"]"#,
                        Read::Block,
                    ),
                    field(
                        Field::MailingAddress,
                        r#"(//ul[@class="sds-list sds-list--unstyled"])[2]"#,
                        Read::Block,
                    ),
                    field(Field::EntityUrl, r#"//a[@class="usa-link"]"#, Read::Attribute("href")),
                    field(
                        Field::StartDate,
                        r#"//span[contains(text(), "Entity Start Date")]/following-sibling::span"#,
                        Read::Text,
                    ),
                    field(
                        Field::Contact1,
                        r#"(//div[@class="sds-card__body padding-2"]//child::h3)[1]"#,
                        Read::Text,
                    ),
                    field(
                        Field::Contact2,
                        r#"(//div[@class="sds-card__body padding-2"]//child::h3)[2]"#,
                        Read::Text,
                    ),
                    field(
                        Field::StateCountryIncorporation,
                        r#"(//div[@class= "grid-col-6 sds-field ng-star-inserted"])[3]//span[2]"#,
                        Read::Text,
                    ),
                    field(
                        Field::CongressionalDistrict,
                        r#"(//div[@class= "grid-col-6 sds-field"])[3]//span[2]"#,
                        Read::Text,
                    ),
                ],
            },
            listing: None,
            output: OutputLayout {
                entity_dir: "output",
                entity_prefix: "batch_",
                funding_dir: "output",
                funding_prefix: "funding_batch_",
            },
        }
    }

    /// usaspending.gov recipient profiles, searched by UEI.
    pub fn recipient() -> Self {
        Profile {
            kind: ProfileKind::Recipient,
            name: "usaspending.gov recipients",
            setup: vec![SetupStep::Navigate(USAS_RECIPIENTS.to_string())],
            search_url: USAS_RECIPIENTS.to_string(),
            input_column: "UEI",
            query: QueryMode::Identifier,
            search: SearchSelectors {
                input: Locator::xpath(r#"//input[@class="search-section__input"]"#),
                submit: Locator::xpath(r#"//button[@class="search-section__button"]"#),
                results: Locator::xpath(r#"//td[@class="recipient-list__body-cell"]"#),
                link_within: Some(Locator::xpath("./a")),
                marker: None,
                max_candidates: None,
            },
            detail: DetailSelectors {
                ready: Some(Locator::xpath(r#"//h2[@class="recipient-overview__title"]"#)),
                fields: vec![
                    field(
                        Field::LegalName,
                        r#"//h2[@class="recipient-overview__title"]"#,
                        Read::FirstLine,
                    ),
                    field(
                        Field::Uei,
                        r#"//td[@class="recipient-section__details-table-first-td"]"#,
                        Read::IdentifierPair,
                    ),
                    field(
                        Field::Cage,
                        r#"(//span[@class="wrap font-sans-md tablet:font-sans-lg h2"])[2]"#,
                        Read::Text,
                    ),
                    field(
                        Field::PhysicalAddress,
                        r#"//tr[th[contains(text(), "Address")]]/td/div"#,
                        Read::JoinAll,
                    ),
                    field(
                        Field::CongressionalDistrict,
                        r#"//th[div[contains(text(), "Congressional District")]]/following-sibling::td/div"#,
                        Read::Text,
                    ),
                ],
            },
            listing: None,
            output: OutputLayout {
                entity_dir: "output",
                entity_prefix: "batch_",
                funding_dir: "output",
                funding_prefix: "funding_batch_",
            },
        }
    }

    /// Recipient profiles plus each recipient's sub-award listing.
    pub fn funding() -> Self {
        let mut profile = Profile::recipient();
        profile.kind = ProfileKind::Funding;
        profile.name = "usaspending.gov recipients with sub-awards";
        profile.search.marker = Some(RowMarker {
            locator: Locator::xpath("./span"),
            text: "R".to_string(),
        });
        profile.listing = Some(ListingSelectors {
            award_link: Locator::xpath(r#"//a[@class="recipient-section__award-button"]"#),
            filter_dropdown: Locator::xpath(
                r#"//button[@class="filter__dropdown-button-sm enabled subaward-dropdown__button"]"#,
            ),
            filter_option: Locator::xpath(r#"//button[contains(text(), "Subawards")]"#),
            table_rows: Locator::xpath(r#"//tbody[@class="usda-table__body"]/tr"#),
            table_body_css: "tbody.usda-table__body".to_string(),
        });
        profile.output = OutputLayout {
            entity_dir: "company_output",
            entity_prefix: "company_batch_",
            funding_dir: "funding_output",
            funding_prefix: "funding_output_",
        };
        profile
    }
}
