/// Per-client session state: host/public mode, current filter and search,
/// and which edit form (if any) is open. Mutating actions are dropped in
/// public mode before the store is touched.
use serde::{Deserialize, Serialize};

use crate::store::{LinkStore, StoreError};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    #[default]
    Public,
    Host,
}

/// Open edit form. `id: None` means a form for a new entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EditTarget {
    #[default]
    Idle,
    EditingLink { id: Option<LinkId> },
    EditingCategory { id: Option<CategoryId> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
    ToggleHostMode,
    /// `None` selects "all".
    SelectCategory(Option<CategoryId>),
    SetSearch(String),
    OpenNewLink,
    OpenEditLink(LinkId),
    OpenNewCategory,
    OpenEditCategory(CategoryId),
    Cancel,
    SubmitLink(LinkDraft),
    SubmitCategory(CategoryDraft),
    DeleteLink(LinkId),
    DeleteCategory(CategoryId),
    ReorderCategories(Vec<CategoryId>),
}

impl Action {
    /// Actions that open edit affordances or change stored data.
    pub fn requires_host(&self) -> bool {
        !matches!(
            self,
            Action::ToggleHostMode
                | Action::SelectCategory(_)
                | Action::SetSearch(_)
                | Action::Cancel
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    /// Dropped by the public-mode gate; nothing changed.
    Ignored,
    /// Session or data changed; the view must be refreshed.
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    mode: Mode,
    selected_category: Option<CategoryId>,
    search_query: String,
    edit: EditTarget,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_host(&self) -> bool {
        self.mode == Mode::Host
    }

    pub fn selected_category(&self) -> Option<&CategoryId> {
        self.selected_category.as_ref()
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn edit(&self) -> &EditTarget {
        &self.edit
    }

    pub async fn dispatch(&mut self, action: Action, store: &LinkStore) -> Result<Outcome, StoreError> {
        if !self.is_host() && action.requires_host() {
            log::debug!(target: "tradelink.session", "Ignored {:?} in public mode", action);
            return Ok(Outcome::Ignored);
        }

        match action {
            Action::ToggleHostMode => {
                self.mode = match self.mode {
                    Mode::Public => Mode::Host,
                    Mode::Host => Mode::Public,
                };
                if self.mode == Mode::Public {
                    self.edit = EditTarget::Idle;
                }
                log::info!(target: "tradelink.session", "Switched to {:?} mode", self.mode);
            }
            Action::SelectCategory(id) => self.selected_category = id,
            Action::SetSearch(query) => self.search_query = query,
            Action::OpenNewLink => self.edit = EditTarget::EditingLink { id: None },
            Action::OpenEditLink(id) => {
                store.get_link(&id).await?;
                self.edit = EditTarget::EditingLink { id: Some(id) };
            }
            Action::OpenNewCategory => self.edit = EditTarget::EditingCategory { id: None },
            Action::OpenEditCategory(id) => {
                store.get_category(&id).await?;
                self.edit = EditTarget::EditingCategory { id: Some(id) };
            }
            Action::Cancel => self.edit = EditTarget::Idle,
            Action::SubmitLink(draft) => {
                let result = match &self.edit {
                    EditTarget::EditingLink { id: Some(id) } => {
                        store.update_link(id, draft).await.map(|_| ())
                    }
                    EditTarget::EditingLink { id: None } => store.add_link(draft).await.map(|_| ()),
                    _ => Err(StoreError::Validation("No link form is open".to_string())),
                };
                self.finish_submit(result)?;
            }
            Action::SubmitCategory(draft) => {
                let result = match &self.edit {
                    EditTarget::EditingCategory { id: Some(id) } => {
                        store.update_category(id, draft).await.map(|_| ())
                    }
                    EditTarget::EditingCategory { id: None } => {
                        store.add_category(draft).await.map(|_| ())
                    }
                    _ => Err(StoreError::Validation("No category form is open".to_string())),
                };
                self.finish_submit(result)?;
            }
            Action::DeleteLink(id) => {
                store.delete_link(&id).await?;
                if self.edit == (EditTarget::EditingLink { id: Some(id) }) {
                    self.edit = EditTarget::Idle;
                }
            }
            Action::DeleteCategory(id) => {
                store.delete_category(&id).await?;
                if self.selected_category.as_ref() == Some(&id) {
                    self.selected_category = None;
                }
                if self.edit == (EditTarget::EditingCategory { id: Some(id) }) {
                    self.edit = EditTarget::Idle;
                }
            }
            Action::ReorderCategories(order) => store.reorder_categories(order).await?,
        }
        Ok(Outcome::Updated)
    }

    /// A rejected form stays open for correction; a vanished target closes it.
    fn finish_submit(&mut self, result: Result<(), StoreError>) -> Result<(), StoreError> {
        match result {
            Ok(()) => {
                self.edit = EditTarget::Idle;
                Ok(())
            }
            Err(e @ StoreError::NotFound(_)) => {
                self.edit = EditTarget::Idle;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::local::LocalStorage;
    use std::sync::Arc;

    fn store() -> LinkStore {
        LinkStore::new(Arc::new(LocalStorage::in_memory()))
    }

    async fn host_session(store: &LinkStore) -> Session {
        let mut session = Session::new();
        session.dispatch(Action::ToggleHostMode, store).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_public_mode_ignores_mutations() {
        let store = store();
        let mut session = Session::new();
        assert_eq!(session.mode(), Mode::Public);

        let outcome = session
            .dispatch(Action::SubmitCategory(CategoryDraft::new("News")), &store)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Ignored);

        let outcome = session.dispatch(Action::OpenNewLink, &store).await.unwrap();
        assert_eq!(outcome, Outcome::Ignored);
        assert_eq!(session.edit(), &EditTarget::Idle);
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_mode_still_browses() {
        let store = store();
        let mut session = Session::new();
        session
            .dispatch(Action::SelectCategory(Some(CategoryId::from("3"))), &store)
            .await
            .unwrap();
        session
            .dispatch(Action::SetSearch("Export".to_string()), &store)
            .await
            .unwrap();
        assert_eq!(session.selected_category(), Some(&CategoryId::from("3")));
        assert_eq!(session.search_query(), "Export");
    }

    #[tokio::test]
    async fn test_toggle_has_no_effect_on_data_and_closes_forms() {
        let store = store();
        let mut session = host_session(&store).await;
        assert!(session.is_host());
        session.dispatch(Action::OpenNewCategory, &store).await.unwrap();

        session.dispatch(Action::ToggleHostMode, &store).await.unwrap();
        assert_eq!(session.mode(), Mode::Public);
        assert_eq!(session.edit(), &EditTarget::Idle);
        assert!(store.list_categories().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_new_then_edit_category() {
        let store = store();
        let mut session = host_session(&store).await;

        session.dispatch(Action::OpenNewCategory, &store).await.unwrap();
        session
            .dispatch(Action::SubmitCategory(CategoryDraft::new("News")), &store)
            .await
            .unwrap();
        assert_eq!(session.edit(), &EditTarget::Idle);

        let news = store.list_categories().await.unwrap().remove(0);
        session
            .dispatch(Action::OpenEditCategory(news.id.clone()), &store)
            .await
            .unwrap();
        assert_eq!(
            session.edit(),
            &EditTarget::EditingCategory {
                id: Some(news.id.clone())
            }
        );
        session
            .dispatch(Action::SubmitCategory(CategoryDraft::new("Newsletters")), &store)
            .await
            .unwrap();
        assert_eq!(store.get_category(&news.id).await.unwrap().name, "Newsletters");
        assert_eq!(store.list_categories().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_submit_keeps_form_open() {
        let store = store();
        let mut session = host_session(&store).await;
        session.dispatch(Action::OpenNewLink, &store).await.unwrap();

        let result = session
            .dispatch(
                Action::SubmitLink(LinkDraft::new(
                    Some(CategoryId::from("9")),
                    "t",
                    "https://t.test",
                )),
                &store,
            )
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(session.edit(), &EditTarget::EditingLink { id: None });
    }

    #[tokio::test]
    async fn test_submit_without_open_form_rejected() {
        let store = store();
        let mut session = host_session(&store).await;
        let result = session
            .dispatch(
                Action::SubmitLink(LinkDraft::new(None, "t", "https://t.test")),
                &store,
            )
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert!(store.list_links(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_edit_for_missing_link_stays_idle() {
        let store = store();
        let mut session = host_session(&store).await;
        let result = session
            .dispatch(Action::OpenEditLink(LinkId::from("12")), &store)
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert_eq!(session.edit(), &EditTarget::Idle);
    }

    #[tokio::test]
    async fn test_deleting_selected_category_resets_filter() {
        let store = store();
        let mut session = host_session(&store).await;
        let news = store.add_category(CategoryDraft::new("News")).await.unwrap();
        session
            .dispatch(Action::SelectCategory(Some(news.id.clone())), &store)
            .await
            .unwrap();

        session
            .dispatch(Action::DeleteCategory(news.id.clone()), &store)
            .await
            .unwrap();
        assert_eq!(session.selected_category(), None);
    }

    #[test]
    fn test_action_wire_format() {
        let action: Action = serde_json::from_str(r#"{"type": "toggleHostMode"}"#).unwrap();
        assert_eq!(action, Action::ToggleHostMode);

        let action: Action =
            serde_json::from_str(r#"{"type": "deleteLink", "payload": "4"}"#).unwrap();
        assert_eq!(action, Action::DeleteLink(LinkId::from("4")));

        let action: Action = serde_json::from_str(
            r#"{"type": "submitLink", "payload": {"title": "t", "url": "https://t.test"}}"#,
        )
        .unwrap();
        assert_eq!(
            action,
            Action::SubmitLink(LinkDraft::new(None, "t", "https://t.test"))
        );
    }
}
