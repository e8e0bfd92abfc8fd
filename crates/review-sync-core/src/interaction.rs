/// What the user is doing with one review row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemMode {
    Menu,
    Editing { draft: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveItem {
    pub review_id: String,
    pub mode: ItemMode,
}

/// Per-view interaction state. At most one row has an open menu or editor;
/// opening another one closes the previous.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub active: Option<ActiveItem>,
    pub composer: String,
}

impl InteractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.review_id.as_str())
    }

    pub fn is_editing(&self, review_id: &str) -> bool {
        matches!(
            &self.active,
            Some(ActiveItem { review_id: id, mode: ItemMode::Editing { .. } }) if id == review_id
        )
    }

    /// Open the menu on `review_id`, or close it when it is already open
    pub fn toggle_menu(&mut self, review_id: &str) {
        let already_open = matches!(
            &self.active,
            Some(ActiveItem { review_id: id, mode: ItemMode::Menu }) if id == review_id
        );
        self.active = if already_open {
            None
        } else {
            Some(ActiveItem {
                review_id: review_id.to_string(),
                mode: ItemMode::Menu,
            })
        };
    }

    pub fn begin_edit(&mut self, review_id: &str, current_body: &str) {
        self.active = Some(ActiveItem {
            review_id: review_id.to_string(),
            mode: ItemMode::Editing {
                draft: current_body.to_string(),
            },
        });
    }

    /// Replace the edit draft. Ignored when nothing is being edited.
    pub fn set_draft(&mut self, text: &str) -> bool {
        match &mut self.active {
            Some(ActiveItem { mode: ItemMode::Editing { draft }, .. }) => {
                *draft = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Close the editor and hand back `(review_id, trimmed draft)`. An empty
    /// draft leaves the editor open and yields nothing.
    pub fn take_edit(&mut self) -> Option<(String, String)> {
        let draft = match &self.active {
            Some(ActiveItem { mode: ItemMode::Editing { draft }, .. }) => draft.trim().to_string(),
            _ => return None,
        };
        if draft.is_empty() {
            return None;
        }
        let active = self.active.take()?;
        Some((active.review_id, draft))
    }

    pub fn cancel(&mut self) {
        self.active = None;
    }

    pub fn set_composer(&mut self, text: &str) {
        self.composer = text.to_string();
    }

    /// Take the trimmed composer text, clearing it. Blank text is kept as is.
    pub fn take_composer(&mut self) -> Option<String> {
        let body = self.composer.trim().to_string();
        if body.is_empty() {
            return None;
        }
        self.composer.clear();
        Some(body)
    }

    pub fn clear_composer(&mut self) {
        self.composer.clear();
    }

    /// Close the active row when it is no longer in the list
    pub fn forget_missing<'a>(&mut self, mut present: impl Iterator<Item = &'a str>) {
        if let Some(id) = self.active_id() {
            if !present.any(|key| key == id) {
                self.active = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opening_one_menu_closes_another() {
        let mut state = InteractionState::new();
        state.toggle_menu("r1");
        state.toggle_menu("r2");
        assert_eq!(state.active_id(), Some("r2"));
        state.toggle_menu("r2");
        assert_eq!(state.active, None);
    }

    #[test]
    fn test_edit_flow() {
        let mut state = InteractionState::new();
        state.toggle_menu("r1");
        state.begin_edit("r1", "old");
        assert!(state.is_editing("r1"));

        assert!(state.set_draft("   "));
        assert_eq!(state.take_edit(), None);
        assert!(state.is_editing("r1"));

        state.set_draft(" new ");
        assert_eq!(state.take_edit(), Some(("r1".to_string(), "new".to_string())));
        assert_eq!(state.active, None);
        assert!(!state.set_draft("x"));
    }

    #[test]
    fn test_composer() {
        let mut state = InteractionState::new();
        state.set_composer("  ");
        assert_eq!(state.take_composer(), None);
        state.set_composer(" hello ");
        assert_eq!(state.take_composer().as_deref(), Some("hello"));
        assert!(state.composer.is_empty());
    }

    #[test]
    fn test_forget_missing() {
        let mut state = InteractionState::new();
        state.toggle_menu("r1");
        state.forget_missing(["r1", "r2"].into_iter());
        assert_eq!(state.active_id(), Some("r1"));
        state.forget_missing(["r2"].into_iter());
        assert_eq!(state.active_id(), None);
    }
}
