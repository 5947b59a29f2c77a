//! Structural view of a source file as supplied by the editor integration.
//!
//! Parsing is done elsewhere; this crate only consumes the result.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeafKind {
    #[default]
    Code,
    Whitespace,
    Annotation,
    TypeArguments,
}

impl LeafKind {
    /// Leaves that never make a method "changed" on their own.
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            LeafKind::Whitespace | LeafKind::Annotation | LeafKind::TypeArguments
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeafToken {
    #[serde(default)]
    pub kind: LeafKind,
    pub text: String,
}

impl LeafToken {
    pub fn code(text: impl Into<String>) -> Self {
        Self {
            kind: LeafKind::Code,
            text: text.into(),
        }
    }

    pub fn whitespace(text: impl Into<String>) -> Self {
        Self {
            kind: LeafKind::Whitespace,
            text: text.into(),
        }
    }

    pub fn annotation(text: impl Into<String>) -> Self {
        Self {
            kind: LeafKind::Annotation,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Stable method identity, e.g. `bake(I)V`.
    pub signature: String,
    #[serde(default)]
    pub leaf_tokens: Vec<LeafToken>,
    /// 1-based, inclusive.
    pub first_line: u32,
    pub last_line: u32,
}

impl MethodBody {
    /// Tokens that take part in structural comparison.
    pub fn significant_tokens(&self) -> impl Iterator<Item = &LeafToken> {
        self.leaf_tokens
            .iter()
            .filter(|token| !token.kind.is_ignorable())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBody {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<MethodBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceStructure {
    #[serde(default)]
    pub classes: Vec<ClassBody>,
}

impl SourceStructure {
    pub fn from_json_str(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::{LeafKind, LeafToken, MethodBody, SourceStructure};

    #[test]
    fn significant_tokens_skip_whitespace_annotations_and_type_arguments() {
        let body = MethodBody {
            signature: "f()V".to_string(),
            leaf_tokens: vec![
                LeafToken::annotation("@Override"),
                LeafToken::code("return"),
                LeafToken::whitespace(" "),
                LeafToken {
                    kind: LeafKind::TypeArguments,
                    text: "<String>".to_string(),
                },
                LeafToken::code("1"),
            ],
            first_line: 3,
            last_line: 5,
        };
        let texts: Vec<&str> = body
            .significant_tokens()
            .map(|token| token.text.as_str())
            .collect();
        assert_eq!(texts, vec!["return", "1"]);
    }

    #[test]
    fn source_structure_parses_from_json_with_default_leaf_kind() {
        let parsed = SourceStructure::from_json_str(
            r#"{
                "classes": [{
                    "name": "Pizza",
                    "methods": [{
                        "signature": "bake()V",
                        "leaf_tokens": [{"text": "oven"}, {"kind": "whitespace", "text": " "}],
                        "first_line": 4,
                        "last_line": 9
                    }]
                }]
            }"#,
        )
        .expect("parse structure");

        let method = &parsed.classes[0].methods[0];
        assert_eq!(method.leaf_tokens[0].kind, LeafKind::Code);
        assert_eq!(method.leaf_tokens[1].kind, LeafKind::Whitespace);
        assert_eq!(method.last_line, 9);
    }
}
