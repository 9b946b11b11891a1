#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use registry_scraper::driver::{ContextId, DriverError, Element, Locator, PageDriver};
use registry_scraper::portal::{
    DetailSelectors, ListingSelectors, Profile, ProfileKind, Read, SearchSelectors,
};
use registry_scraper::record::Field;

pub const SEARCH_URL: &str = "https://portal.test/search";
pub const RESULTS_PREFIX: &str = "https://portal.test/results?q=";

/// What a click on a node does to the fake browser.
#[derive(Debug, Clone)]
pub enum Action {
    /// Load `results_prefix` + whatever was typed since the last clear.
    /// With `in_place` the page is re-rendered without invalidating handles.
    SubmitSearch { results_prefix: String, in_place: bool },
    /// Open `url` in a new context without switching to it.
    OpenContext { url: String },
    Navigate(String),
    /// Swap in the content of `url` while every element keeps its handle,
    /// like a client-side re-render of the same list.
    Rerender(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub text: String,
    pub attrs: HashMap<String, String>,
    pub clickable: bool,
    pub children: HashMap<String, Vec<Node>>,
    pub on_click: Option<Action>,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            text: String::new(),
            attrs: HashMap::new(),
            clickable: true,
            children: HashMap::new(),
            on_click: None,
        }
    }
}

impl Node {
    pub fn new() -> Self {
        Node::default()
    }

    pub fn text(text: &str) -> Self {
        Node {
            text: text.to_string(),
            ..Node::default()
        }
    }

    pub fn link(href: &str) -> Self {
        Node::new().attr("href", href)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn child(mut self, locator: &Locator, node: Node) -> Self {
        self.children
            .entry(locator.expr().to_string())
            .or_default()
            .push(node);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.clickable = false;
        self
    }

    pub fn on_click(mut self, action: Action) -> Self {
        self.on_click = Some(action);
        self
    }
}

/// Nodes keyed by the locator expression that finds them.
#[derive(Debug, Clone, Default)]
pub struct Page {
    nodes: HashMap<String, Vec<Node>>,
    source: String,
}

impl Page {
    pub fn new() -> Self {
        Page::default()
    }

    pub fn with(mut self, locator: &Locator, node: Node) -> Self {
        self.nodes
            .entry(locator.expr().to_string())
            .or_default()
            .push(node);
        self
    }

    pub fn source(mut self, html: &str) -> Self {
        self.source = html.to_string();
        self
    }
}

struct Context {
    id: ContextId,
    url: Option<String>,
    generation: u64,
}

struct Handle {
    context: ContextId,
    generation: u64,
    path: Vec<(String, usize)>,
}

/// In-memory browser. Every navigation gets a new generation, so element
/// handles taken before it go stale. Re-renders keep the generation.
pub struct FakeDriver {
    pages: HashMap<String, Page>,
    contexts: Vec<Context>,
    active: Option<ContextId>,
    handles: HashMap<String, Handle>,
    generation: u64,
    opened: usize,
    typed: String,
    failing: HashSet<String>,
    /// Every token submitted through a search form.
    pub searches: Vec<String>,
    /// Every URL loaded, in order.
    pub visited: Vec<String>,
    pub quit: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        FakeDriver {
            pages: HashMap::new(),
            contexts: vec![Context {
                id: ContextId("ctx-0".to_string()),
                url: None,
                generation: 0,
            }],
            active: Some(ContextId("ctx-0".to_string())),
            handles: HashMap::new(),
            generation: 0,
            opened: 0,
            typed: String::new(),
            failing: HashSet::new(),
            searches: Vec::new(),
            visited: Vec::new(),
            quit: false,
        }
    }

    pub fn page(mut self, url: &str, page: Page) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn fail_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn context_ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|c| c.id.clone()).collect()
    }

    pub fn active(&self) -> Option<&ContextId> {
        self.active.as_ref()
    }

    /// Open a context the way a popup would, leaving focus where it is.
    pub fn open_context(&mut self, url: &str) -> ContextId {
        self.opened += 1;
        self.generation += 1;
        let id = ContextId(format!("ctx-{}", self.opened));
        self.contexts.push(Context {
            id: id.clone(),
            url: Some(url.to_string()),
            generation: self.generation,
        });
        id
    }

    fn active_context(&self) -> Result<&Context, DriverError> {
        let id = self.active.as_ref().ok_or(DriverError::NoSuchContext)?;
        self.contexts
            .iter()
            .find(|c| &c.id == id)
            .ok_or(DriverError::NoSuchContext)
    }

    fn active_page(&self) -> Result<Option<&Page>, DriverError> {
        let ctx = self.active_context()?;
        Ok(ctx.url.as_ref().and_then(|u| self.pages.get(u)))
    }

    fn go(&mut self, url: &str) -> Result<(), DriverError> {
        let id = self.active.clone().ok_or(DriverError::NoSuchContext)?;
        self.generation += 1;
        let generation = self.generation;
        let ctx = self
            .contexts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(DriverError::NoSuchContext)?;
        ctx.url = Some(url.to_string());
        ctx.generation = generation;
        self.visited.push(url.to_string());
        Ok(())
    }

    fn rerender(&mut self, url: &str) -> Result<(), DriverError> {
        let id = self.active.clone().ok_or(DriverError::NoSuchContext)?;
        let ctx = self
            .contexts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(DriverError::NoSuchContext)?;
        ctx.url = Some(url.to_string());
        Ok(())
    }

    fn register(&mut self, path: Vec<(String, usize)>) -> Result<Element, DriverError> {
        let ctx = self.active_context()?;
        let (context, generation) = (ctx.id.clone(), ctx.generation);
        let key: Vec<String> = path.iter().map(|(e, i)| format!("{e}[{i}]")).collect();
        let id = format!("{}@{}:{}", context, generation, key.join("/"));
        self.handles.insert(
            id.clone(),
            Handle {
                context,
                generation,
                path,
            },
        );
        Ok(Element(id))
    }

    fn resolve(&self, element: &Element) -> Result<&Node, DriverError> {
        let handle = self
            .handles
            .get(&element.0)
            .ok_or(DriverError::NoSuchElement)?;
        let ctx = self.active_context()?;
        if ctx.id != handle.context || ctx.generation != handle.generation {
            return Err(DriverError::StaleElement);
        }
        let page = self.active_page()?.ok_or(DriverError::StaleElement)?;

        let mut steps = handle.path.iter();
        let (expr, i) = steps.next().ok_or(DriverError::NoSuchElement)?;
        let mut node = page
            .nodes
            .get(expr)
            .and_then(|n| n.get(*i))
            .ok_or(DriverError::StaleElement)?;
        for (expr, i) in steps {
            node = node
                .children
                .get(expr)
                .and_then(|n| n.get(*i))
                .ok_or(DriverError::StaleElement)?;
        }
        Ok(node)
    }

    fn count(&self, locator: &Locator) -> Result<usize, DriverError> {
        Ok(self
            .active_page()?
            .and_then(|p| p.nodes.get(locator.expr()))
            .map_or(0, Vec::len))
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        if self.failing.contains(url) {
            return Err(DriverError::Protocol {
                error: "unknown error".to_string(),
                message: format!("net::ERR_NAME_NOT_RESOLVED at {url}"),
            });
        }
        self.go(url)
    }

    async fn find(&mut self, locator: &Locator) -> Result<Option<Element>, DriverError> {
        if self.count(locator)? == 0 {
            return Ok(None);
        }
        self.register(vec![(locator.expr().to_string(), 0)]).map(Some)
    }

    async fn find_all(&mut self, locator: &Locator) -> Result<Vec<Element>, DriverError> {
        let n = self.count(locator)?;
        (0..n)
            .map(|i| self.register(vec![(locator.expr().to_string(), i)]))
            .collect()
    }

    async fn find_within(
        &mut self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Option<Element>, DriverError> {
        let found = self
            .resolve(parent)?
            .children
            .get(locator.expr())
            .is_some_and(|n| !n.is_empty());
        if !found {
            return Ok(None);
        }
        let mut path = self.handles[&parent.0].path.clone();
        path.push((locator.expr().to_string(), 0));
        self.register(path).map(Some)
    }

    async fn click(&mut self, element: &Element) -> Result<(), DriverError> {
        let node = self.resolve(element)?;
        if !node.clickable {
            return Err(DriverError::Protocol {
                error: "element not interactable".to_string(),
                message: element.0.clone(),
            });
        }
        match node.on_click.clone() {
            Some(Action::SubmitSearch {
                results_prefix,
                in_place,
            }) => {
                let token = self.typed.clone();
                self.searches.push(token.clone());
                let url = format!("{results_prefix}{token}");
                if in_place {
                    self.rerender(&url)
                } else {
                    self.go(&url)
                }
            }
            Some(Action::OpenContext { url }) => {
                self.open_context(&url);
                Ok(())
            }
            Some(Action::Navigate(url)) => self.go(&url),
            Some(Action::Rerender(url)) => self.rerender(&url),
            None => Ok(()),
        }
    }

    async fn clear(&mut self, element: &Element) -> Result<(), DriverError> {
        self.resolve(element)?;
        self.typed.clear();
        Ok(())
    }

    async fn type_text(&mut self, element: &Element, text: &str) -> Result<(), DriverError> {
        self.resolve(element)?;
        self.typed.push_str(text);
        Ok(())
    }

    async fn text(&mut self, element: &Element) -> Result<String, DriverError> {
        Ok(self.resolve(element)?.text.clone())
    }

    async fn attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        Ok(self.resolve(element)?.attrs.get(name).cloned())
    }

    async fn is_clickable(&mut self, element: &Element) -> Result<bool, DriverError> {
        Ok(self.resolve(element)?.clickable)
    }

    async fn page_source(&mut self) -> Result<String, DriverError> {
        Ok(self
            .active_page()?
            .map(|p| p.source.clone())
            .unwrap_or_default())
    }

    async fn current_context(&mut self) -> Result<ContextId, DriverError> {
        Ok(self.active_context()?.id.clone())
    }

    async fn contexts(&mut self) -> Result<Vec<ContextId>, DriverError> {
        Ok(self.context_ids())
    }

    async fn switch_to(&mut self, context: &ContextId) -> Result<(), DriverError> {
        if !self.contexts.iter().any(|c| &c.id == context) {
            return Err(DriverError::NoSuchContext);
        }
        self.active = Some(context.clone());
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), DriverError> {
        let id = self.active.take().ok_or(DriverError::NoSuchContext)?;
        self.contexts.retain(|c| c.id != id);
        Ok(())
    }

    async fn quit(&mut self) -> Result<(), DriverError> {
        self.quit = true;
        Ok(())
    }
}

/// A profile whose setup is skipped and whose search form lives at [`SEARCH_URL`].
pub fn test_profile(kind: ProfileKind) -> Profile {
    let mut profile = Profile::for_kind(kind);
    profile.setup.clear();
    profile.search_url = SEARCH_URL.to_string();
    profile
}

pub fn results_url(token: &str) -> String {
    format!("{RESULTS_PREFIX}{token}")
}

fn search_form(sel: &SearchSelectors, in_place: bool) -> Page {
    Page::new().with(&sel.input, Node::new()).with(
        &sel.submit,
        Node::new().on_click(Action::SubmitSearch {
            results_prefix: RESULTS_PREFIX.to_string(),
            in_place,
        }),
    )
}

pub fn search_page(sel: &SearchSelectors) -> Page {
    search_form(sel, false)
}

/// A search form over a list that shows `shown` until a search re-renders it
/// in place.
pub fn in_place_search_page(sel: &SearchSelectors, shown: Vec<Node>) -> Page {
    shown
        .into_iter()
        .fold(search_form(sel, true), |page, row| page.with(&sel.results, row))
}

/// One result row pointing at `href`, with `marker` text when the profile filters rows.
pub fn result_row(sel: &SearchSelectors, href: &str, marker: Option<&str>) -> Node {
    let mut row = match &sel.link_within {
        Some(anchor) => Node::text(href).child(anchor, Node::link(href)),
        None => Node::text(href).attr("href", href),
    };
    if let (Some(m), Some(text)) = (&sel.marker, marker) {
        row = row.child(&m.locator, Node::text(text));
    }
    row
}

pub fn results_page(sel: &SearchSelectors, rows: Vec<Node>) -> Page {
    rows.into_iter()
        .fold(Page::new(), |page, row| page.with(&sel.results, row))
}

/// A detail page carrying `values` where the profile's selectors look for them.
pub fn detail_page(detail: &DetailSelectors, values: &[(Field, &str)]) -> Page {
    let mut page = Page::new();
    for (field, value) in values {
        let Some(spec) = detail.fields.iter().find(|f| f.field == *field) else {
            panic!("no selector for {field:?}");
        };
        let node = match spec.read {
            Read::Attribute(name) => Node::new().attr(name, value),
            _ => Node::text(value),
        };
        page = page.with(&spec.locator, node);
    }
    page
}

pub const SUB_AWARD_HEADERS: [&str; 8] = [
    "Sub-Award ID",
    "Recipient Name",
    "Sub-Award Amount",
    "Sub-Award Date",
    "Prime Award ID",
    "Prime Recipient Name",
    "Awarding Agency",
    "Awarding Sub Agency",
];

pub fn sub_award_table(headers: &[&str], rows: &[[&str; 8]]) -> String {
    let head: String = headers.iter().map(|h| format!("<th>{h}</th>")).collect();
    let body: String = rows
        .iter()
        .map(|r| {
            let cells: String = r.iter().map(|c| format!("<td>{c}</td>")).collect();
            format!("<tr>{cells}</tr>")
        })
        .collect();
    format!(
        "<html><body><table><thead><tr>{head}</tr></thead>\
         <tbody class=\"usda-table__body\">{body}</tbody></table></body></html>"
    )
}

/// Adds the award button to `detail` and registers the listing pages it leads to.
///
/// Picking the sub-award filter loads `filtered_url`, whose rows and source
/// come from `rows`.
pub fn with_listing(
    driver: FakeDriver,
    sel: &ListingSelectors,
    detail: Page,
    detail_url: &str,
    listing_url: &str,
    rows: &[[&str; 8]],
) -> FakeDriver {
    with_filtered_listing(driver, sel, detail, detail_url, listing_url, &[], rows, false)
}

fn table_page(sel: &ListingSelectors, rows: &[[&str; 8]]) -> Page {
    rows.iter()
        .fold(Page::new(), |page, row| page.with(&sel.table_rows, Node::text(row[0])))
        .source(&sub_award_table(&SUB_AWARD_HEADERS, rows))
}

/// Like [`with_listing`], but the listing first shows `unfiltered` rows, and
/// with `in_place` the filter re-renders that table instead of loading a page.
#[allow(clippy::too_many_arguments)]
pub fn with_filtered_listing(
    driver: FakeDriver,
    sel: &ListingSelectors,
    detail: Page,
    detail_url: &str,
    listing_url: &str,
    unfiltered: &[[&str; 8]],
    rows: &[[&str; 8]],
    in_place: bool,
) -> FakeDriver {
    let filtered_url = format!("{listing_url}#subawards");
    let detail = detail.with(
        &sel.award_link,
        Node::new().on_click(Action::OpenContext {
            url: listing_url.to_string(),
        }),
    );
    let apply = if in_place {
        Action::Rerender(filtered_url.clone())
    } else {
        Action::Navigate(filtered_url.clone())
    };
    let listing = table_page(sel, unfiltered)
        .with(&sel.filter_dropdown, Node::new())
        .with(&sel.filter_option, Node::new().on_click(apply));
    let mut filtered = table_page(sel, rows);
    if in_place {
        filtered = filtered
            .with(&sel.filter_dropdown, Node::new())
            .with(&sel.filter_option, Node::new());
    }

    driver
        .page(detail_url, detail)
        .page(listing_url, listing)
        .page(&filtered_url, filtered)
}
