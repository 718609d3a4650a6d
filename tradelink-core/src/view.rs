/// View synchronization: re-reads categories and links for every render and
/// derives what the page shows from the session. Holds no data of its own
/// beyond the last successfully built view.
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::session::{EditTarget, Mode, Session};
use crate::store::{LinkStore, StoreError};
use crate::types::*;

pub const ALL_FILTER_LABEL: &str = "All";

/// One entry of the category filter bar. `id: None` is the "all" entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFilter {
    pub id: Option<CategoryId>,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCard {
    #[serde(flatten)]
    pub link: Link,
    /// Name of the link's category; absent when uncategorized or the
    /// category no longer exists.
    pub badge: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewModel {
    pub mode: Mode,
    pub filters: Vec<CategoryFilter>,
    pub search_query: String,
    pub links: Vec<LinkCard>,
    /// Edit and delete controls are shown.
    pub can_edit: bool,
    /// Category management list, host mode only.
    pub host_panel: Option<Vec<Category>>,
    pub edit: EditTarget,
}

impl ViewModel {
    /// Nothing matches the current filter and search.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

fn fold(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

/// Case-insensitive substring match on title or description.
/// The query is trimmed first, so a whitespace-only query keeps every link
/// rather than matching titles that contain spaces.
pub fn filter_links(links: &[Link], query: &str) -> Vec<Link> {
    let needle = fold(query.trim());
    if needle.is_empty() {
        return links.to_vec();
    }
    links
        .iter()
        .filter(|link| {
            fold(&link.title).contains(&needle)
                || link
                    .description
                    .as_deref()
                    .is_some_and(|d| fold(d).contains(&needle))
        })
        .cloned()
        .collect()
}

/// Pure render step: same inputs always give the same view.
pub fn build_view(categories: &[Category], links: &[Link], session: &Session) -> ViewModel {
    let selected = session.selected_category();

    let mut filters = Vec::with_capacity(categories.len() + 1);
    filters.push(CategoryFilter {
        id: None,
        label: ALL_FILTER_LABEL.to_string(),
        active: selected.is_none(),
    });
    filters.extend(categories.iter().map(|c| CategoryFilter {
        id: Some(c.id.clone()),
        label: c.name.clone(),
        active: selected == Some(&c.id),
    }));

    let cards = filter_links(links, session.search_query())
        .into_iter()
        .map(|link| {
            let badge = link.category_id.as_ref().and_then(|id| {
                categories
                    .iter()
                    .find(|c| &c.id == id)
                    .map(|c| c.name.clone())
            });
            LinkCard { link, badge }
        })
        .collect();

    let host = session.is_host();
    ViewModel {
        mode: session.mode(),
        filters,
        search_query: session.search_query().to_string(),
        links: cards,
        can_edit: host,
        host_panel: host.then(|| categories.to_vec()),
        edit: if host {
            session.edit().clone()
        } else {
            EditTarget::Idle
        },
    }
}

#[derive(Default)]
pub struct ViewSynchronizer {
    last: Option<ViewModel>,
}

impl ViewSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last successfully built view. Survives failed refreshes.
    pub fn last(&self) -> Option<&ViewModel> {
        self.last.as_ref()
    }

    /// Fetch categories and links concurrently, wait for both, then render.
    pub async fn refresh(
        &mut self,
        store: &LinkStore,
        session: &Session,
    ) -> Result<&ViewModel, StoreError> {
        let fetched = tokio::try_join!(
            store.list_categories(),
            store.list_links(session.selected_category())
        );
        let (categories, links) = match fetched {
            Ok(data) => data,
            Err(e) => {
                log::warn!(target: "tradelink.view", "Refresh failed, keeping last view: {}", e);
                return Err(e);
            }
        };
        Ok(&*self.last.insert(build_view(&categories, &links, session)))
    }
}
