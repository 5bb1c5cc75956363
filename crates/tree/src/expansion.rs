use serde::{Deserialize, Serialize};

/// Expanded tree entries, independent of node ids.
///
/// Each path starts with a root identity followed by the display names of
/// the nodes below it. Serializes as a plain list of string lists so it can
/// be stored in the preferences file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpansionState {
    paths: Vec<Vec<String>>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(paths: Vec<Vec<String>>) -> Self {
        Self { paths }
    }

    pub fn push(&mut self, segments: Vec<String>) {
        if !segments.is_empty() {
            self.paths.push(segments);
        }
    }

    pub fn paths(&self) -> &[Vec<String>] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<Vec<String>> {
        self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl From<Vec<Vec<String>>> for ExpansionState {
    fn from(paths: Vec<Vec<String>>) -> Self {
        Self::from_paths(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_nested_lists() {
        let mut state = ExpansionState::new();
        state.push(vec!["/lib".to_string(), "sf".to_string()]);
        state.push(Vec::new());

        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"[["/lib","sf"]]"#);

        let back: ExpansionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
