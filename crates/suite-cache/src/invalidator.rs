//! Structural diff of method bodies against remembered snapshots.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use suite_core::{ClassBody, FileId, MethodBody, SourceStructure};
use tracing::debug;

use crate::snapshot::{ClassSnapshot, InvalidatorSnapshot, MethodRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodVerdict {
    Unchanged,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodChange {
    pub signature: String,
    pub verdict: MethodVerdict,
    /// Lines to evict; empty for unchanged methods.
    pub lines: BTreeSet<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MethodSnapshot {
    tokens: Vec<String>,
    first_line: u32,
    last_line: u32,
}

impl MethodSnapshot {
    fn capture(method: &MethodBody) -> Self {
        Self {
            tokens: method
                .significant_tokens()
                .map(|token| token.text.clone())
                .collect(),
            first_line: method.first_line,
            last_line: method.last_line,
        }
    }

    fn span(&self) -> impl Iterator<Item = u32> {
        self.first_line..=self.last_line
    }
}

/// Remembers the last seen body of every method, keyed by `file/class`.
#[derive(Debug, Default)]
pub struct StaticInvalidator {
    saved: Mutex<HashMap<String, HashMap<String, MethodSnapshot>>>,
}

impl StaticInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn class_key(file_id: &FileId, class_name: &str) -> String {
        format!("{file_id}/{class_name}")
    }

    /// Classifies every method of `class` and updates the snapshots.
    pub fn classify(&self, file_id: &FileId, class: &ClassBody) -> Vec<MethodChange> {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshots = saved
            .entry(Self::class_key(file_id, &class.name))
            .or_default();

        class
            .methods
            .iter()
            .map(|method| {
                let current = MethodSnapshot::capture(method);
                let change = match snapshots.get(&method.signature) {
                    None => MethodChange {
                        signature: method.signature.clone(),
                        verdict: MethodVerdict::Unchanged,
                        lines: BTreeSet::new(),
                    },
                    Some(previous) if previous.tokens == current.tokens => MethodChange {
                        signature: method.signature.clone(),
                        verdict: MethodVerdict::Unchanged,
                        lines: BTreeSet::new(),
                    },
                    Some(previous) => MethodChange {
                        signature: method.signature.clone(),
                        verdict: MethodVerdict::Changed,
                        lines: previous.span().chain(current.span()).collect(),
                    },
                };
                snapshots.insert(method.signature.clone(), current);
                change
            })
            .collect()
    }

    /// Lines of every changed method in `structure`.
    pub fn invalidate(&self, file_id: &FileId, structure: &SourceStructure) -> BTreeSet<u32> {
        let mut lines = BTreeSet::new();
        for class in &structure.classes {
            for change in self.classify(file_id, class) {
                if change.verdict == MethodVerdict::Changed {
                    debug!(file = %file_id, class = %class.name, method = %change.signature, "method changed");
                    lines.extend(change.lines);
                }
            }
        }
        lines
    }

    pub fn snapshot(&self) -> InvalidatorSnapshot {
        let saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        let mut classes: Vec<ClassSnapshot> = saved
            .iter()
            .map(|(key, methods)| {
                let mut methods: Vec<MethodRecord> = methods
                    .iter()
                    .map(|(signature, method)| MethodRecord {
                        signature: signature.clone(),
                        tokens: method.tokens.clone(),
                        first_line: method.first_line,
                        last_line: method.last_line,
                    })
                    .collect();
                methods.sort_by(|a, b| a.signature.cmp(&b.signature));
                ClassSnapshot {
                    key: key.clone(),
                    methods,
                }
            })
            .collect();
        classes.sort_by(|a, b| a.key.cmp(&b.key));
        InvalidatorSnapshot { classes }
    }

    /// Replaces the remembered bodies of every class in `snapshot`.
    pub fn restore(&self, snapshot: &InvalidatorSnapshot) {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        for class in &snapshot.classes {
            let methods = class
                .methods
                .iter()
                .map(|record| {
                    (
                        record.signature.clone(),
                        MethodSnapshot {
                            tokens: record.tokens.clone(),
                            first_line: record.first_line,
                            last_line: record.last_line,
                        },
                    )
                })
                .collect();
            saved.insert(class.key.clone(), methods);
        }
    }

    /// Drops all snapshots of `file_id`.
    pub fn forget(&self, file_id: &FileId) {
        let prefix = format!("{file_id}/");
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key, _| !key.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::{MethodVerdict, StaticInvalidator};
    use std::collections::BTreeSet;
    use suite_core::{ClassBody, FileId, LeafToken, MethodBody, SourceStructure};

    fn method(signature: &str, tokens: &[&str], first: u32, last: u32) -> MethodBody {
        MethodBody {
            signature: signature.to_string(),
            leaf_tokens: tokens.iter().map(|text| LeafToken::code(*text)).collect(),
            first_line: first,
            last_line: last,
        }
    }

    fn structure(methods: Vec<MethodBody>) -> SourceStructure {
        SourceStructure {
            classes: vec![ClassBody {
                name: "Pizza".to_string(),
                methods,
            }],
        }
    }

    #[test]
    fn first_sight_is_unchanged_and_second_call_is_idempotent() {
        let invalidator = StaticInvalidator::new();
        let file = FileId::new("Pizza.java");
        let source = structure(vec![method("bake()V", &["oven", "(", ")"], 3, 5)]);

        assert!(invalidator.invalidate(&file, &source).is_empty());
        assert!(invalidator.invalidate(&file, &source).is_empty());
    }

    #[test]
    fn changed_token_reports_previous_and_current_span() {
        let invalidator = StaticInvalidator::new();
        let file = FileId::new("Pizza.java");
        invalidator.invalidate(
            &file,
            &structure(vec![
                method("bake()V", &["oven", "(", ")"], 3, 5),
                method("slice()V", &["cut"], 7, 8),
            ]),
        );

        let lines = invalidator.invalidate(
            &file,
            &structure(vec![
                method("bake()V", &["grill", "(", ")"], 3, 6),
                method("slice()V", &["cut"], 8, 9),
            ]),
        );
        assert_eq!(lines, BTreeSet::from([3, 4, 5, 6]));

        // Snapshot replaced: same body again is unchanged.
        let again = invalidator.invalidate(
            &file,
            &structure(vec![method("bake()V", &["grill", "(", ")"], 3, 6)]),
        );
        assert!(again.is_empty());
    }

    #[test]
    fn token_count_change_is_a_change() {
        let invalidator = StaticInvalidator::new();
        let file = FileId::new("F");
        let class = ClassBody {
            name: "Pizza".to_string(),
            methods: vec![method("f()V", &["a", "b"], 1, 2)],
        };
        invalidator.classify(&file, &class);

        let grown = ClassBody {
            name: "Pizza".to_string(),
            methods: vec![method("f()V", &["a", "b", "c"], 1, 2)],
        };
        let changes = invalidator.classify(&file, &grown);
        assert_eq!(changes[0].verdict, MethodVerdict::Changed);
        assert_eq!(changes[0].lines, BTreeSet::from([1, 2]));
    }

    #[test]
    fn whitespace_and_annotation_edits_are_ignored() {
        let invalidator = StaticInvalidator::new();
        let file = FileId::new("F");
        let plain = method("f()V", &["return", "1"], 1, 1);
        let mut decorated = plain.clone();
        decorated.leaf_tokens = vec![
            LeafToken::annotation("@Deprecated"),
            LeafToken::code("return"),
            LeafToken::whitespace("   "),
            LeafToken::code("1"),
        ];

        invalidator.invalidate(&file, &structure(vec![plain]));
        assert!(invalidator
            .invalidate(&file, &structure(vec![decorated]))
            .is_empty());
    }

    #[test]
    fn snapshots_are_scoped_by_file_and_class() {
        let invalidator = StaticInvalidator::new();
        let a = FileId::new("A.java");
        let b = FileId::new("B.java");
        invalidator.invalidate(&a, &structure(vec![method("f()V", &["x"], 1, 1)]));

        // Same class and signature in another file has no snapshot yet.
        assert!(invalidator
            .invalidate(&b, &structure(vec![method("f()V", &["y"], 1, 1)]))
            .is_empty());

        let other_class = SourceStructure {
            classes: vec![ClassBody {
                name: "Crust".to_string(),
                methods: vec![method("f()V", &["z"], 1, 1)],
            }],
        };
        assert!(invalidator.invalidate(&a, &other_class).is_empty());
    }

    #[test]
    fn restored_snapshots_detect_changes_in_a_new_invalidator() {
        let file = FileId::new("Pizza.java");
        let first = StaticInvalidator::new();
        first.invalidate(
            &file,
            &structure(vec![
                method("bake()V", &["a"], 5, 7),
                method("slice()V", &["cut"], 9, 9),
            ]),
        );
        let snapshot = first.snapshot();
        assert_eq!(snapshot.classes.len(), 1);
        assert_eq!(snapshot.classes[0].key, "Pizza.java/Pizza");
        assert_eq!(snapshot.classes[0].methods[0].signature, "bake()V");

        let second = StaticInvalidator::new();
        second.restore(&snapshot);
        assert_eq!(second.snapshot(), snapshot);
        let lines = second.invalidate(
            &file,
            &structure(vec![
                method("bake()V", &["b"], 5, 7),
                method("slice()V", &["cut"], 9, 9),
            ]),
        );
        assert_eq!(lines, BTreeSet::from([5, 6, 7]));
    }

    #[test]
    fn forget_drops_file_snapshots() {
        let invalidator = StaticInvalidator::new();
        let file = FileId::new("F");
        invalidator.invalidate(&file, &structure(vec![method("f()V", &["x"], 1, 1)]));
        invalidator.forget(&file);
        assert!(invalidator
            .invalidate(&file, &structure(vec![method("f()V", &["y"], 1, 1)]))
            .is_empty());
    }
}
