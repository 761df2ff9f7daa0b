//! Live selection state for one open surface instance

use std::collections::HashMap;

use serde_json::json;
use tether_types::{ConnectError, ConnectResult, ResourceReference};

/// The mutable set of chosen resources inside one open selection surface.
///
/// Created empty or hydrated from a caller-supplied pre-selection; mutated
/// only by user actions while the surface is open; destroyed with the
/// surface. It never outlives the surface.
#[derive(Debug, Default, Clone)]
pub struct SelectionState {
    selected: HashMap<String, ResourceReference>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate from a previous selection so reopening the picker to edit an
    /// existing connection does not lose prior choices
    pub fn from_preselection(pre_selected: HashMap<String, ResourceReference>) -> Self {
        Self {
            selected: pre_selected,
        }
    }

    /// Toggle one item; returns whether it is selected afterwards
    pub fn toggle(&mut self, resource: ResourceReference) -> bool {
        if self.selected.remove(&resource.id).is_some() {
            false
        } else {
            self.selected.insert(resource.id.clone(), resource);
            true
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains_key(id)
    }

    /// Select every currently-listed resource. Operates over the given
    /// listing only, never a server-side bulk operation.
    pub fn select_all(&mut self, listed: &[ResourceReference]) {
        for resource in listed {
            self.selected
                .insert(resource.id.clone(), resource.clone());
        }
    }

    /// Deselect the currently-listed resources, leaving selections that came
    /// from the pre-selection but are not in this listing untouched
    pub fn deselect_all(&mut self, listed: &[ResourceReference]) {
        for resource in listed {
            self.selected.remove(&resource.id);
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Convert to the generic map shape for delivery.
    ///
    /// An empty selection is rejected locally, without any network round
    /// trip, and leaves the surface open.
    pub fn finalize(&self) -> ConnectResult<HashMap<String, ResourceReference>> {
        if self.selected.is_empty() {
            return Err(ConnectError::selection_with(
                "No resources selected",
                json!({ "selectedCount": 0 }),
            ));
        }
        Ok(self.selected.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(id: &str, name: &str) -> ResourceReference {
        ResourceReference::new(id, name, "page")
    }

    #[test]
    fn test_hydrates_from_preselection() {
        let mut pre = HashMap::new();
        pre.insert(
            "f1".to_string(),
            ResourceReference::new("f1", "Doc", "application/pdf"),
        );

        let state = SelectionState::from_preselection(pre);
        assert_eq!(state.len(), 1);
        assert!(state.is_selected("f1"));

        let map = state.finalize().unwrap();
        assert_eq!(map["f1"].name, "Doc");
        assert_eq!(map["f1"].resource_type, "application/pdf");
    }

    #[test]
    fn test_toggle_adds_and_removes() {
        let mut state = SelectionState::new();
        assert!(state.toggle(resource("a", "A")));
        assert!(state.is_selected("a"));
        assert!(!state.toggle(resource("a", "A")));
        assert!(state.is_empty());
    }

    #[test]
    fn test_select_all_over_listing_only() {
        let listed = vec![resource("a", "A"), resource("b", "B")];

        let mut pre = HashMap::new();
        pre.insert("z".to_string(), resource("z", "Z"));
        let mut state = SelectionState::from_preselection(pre);

        state.select_all(&listed);
        assert_eq!(state.len(), 3);

        state.deselect_all(&listed);
        assert_eq!(state.len(), 1);
        assert!(state.is_selected("z"));
    }

    #[test]
    fn test_finalize_rejects_empty_selection() {
        let state = SelectionState::new();
        let err = state.finalize().unwrap_err();
        assert_eq!(err.code(), "SELECTION_ERROR");
        assert_eq!(err.details().unwrap()["selectedCount"], 0);
    }
}
