use serde::{Deserialize, Serialize};

/// A submitted answer, as a closed tagged union keyed by question type.
///
/// Multiple choice submits an option id, true/false a boolean, numerical a
/// number, and the text kinds (short answer, essay, fill-in-the-blank) a
/// free string. Keeping the set closed makes the grader a total function
/// over (kind, value) pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Choice(String),
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AnswerValue {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn choice(option_id: impl Into<String>) -> Self {
        Self::Choice(option_id.into())
    }

    /// True for text answers that are empty after trimming.
    ///
    /// These grade like a missing submission rather than a wrong one.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(t) => t.trim().is_empty(),
            AnswerValue::Choice(id) => id.trim().is_empty(),
            AnswerValue::Bool(_) => false,
            AnswerValue::Number(n) => n.is_nan(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_detection() {
        assert!(AnswerValue::text("   ").is_blank());
        assert!(AnswerValue::choice("").is_blank());
        assert!(AnswerValue::Number(f64::NAN).is_blank());
        assert!(!AnswerValue::Bool(false).is_blank());
        assert!(!AnswerValue::text("Paris").is_blank());
    }

    #[test]
    fn serde_uses_tagged_representation() {
        let v = AnswerValue::choice("b");
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"kind":"choice","value":"b"}"#);
        let back: AnswerValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
