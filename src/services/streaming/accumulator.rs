//! Per-request text accumulation
//!
//! Fragment text is appended verbatim. The buffer is never parsed while the
//! stream is running: a property name or number split across two events is
//! simply an unfinished document until the finish signal arrives.

use super::DeltaFragment;

/// Accumulated response text for one in-flight request
#[derive(Debug, Clone, Default)]
pub struct AccumulationBuffer {
    /// Plain content deltas
    text: String,

    /// Arguments of the first tool call seen
    tool_text: String,

    /// Index of the tool call `tool_text` belongs to
    tool_index: Option<usize>,

    finalized: bool,
}

impl AccumulationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the fragment's text.
    ///
    /// Returns the cumulative snapshot when it changed, `None` when the
    /// fragment carried no text, the buffer is already finalized, or the text
    /// went to the channel the snapshot does not show.
    pub fn push(&mut self, fragment: &DeltaFragment) -> Option<&str> {
        if self.finalized {
            tracing::trace!("ignoring fragment after finalization");
            return None;
        }

        match fragment {
            DeltaFragment::Content { text, .. } if !text.is_empty() => {
                self.text.push_str(text);
                if self.uses_tool_channel() {
                    return None;
                }
            }
            DeltaFragment::ToolCallDelta { index, text, .. } if !text.is_empty() => {
                match self.tool_index {
                    Some(current) if current != *index => {
                        tracing::warn!(index, "ignoring arguments for additional tool call");
                        return None;
                    }
                    _ => self.tool_index = Some(*index),
                }
                self.tool_text.push_str(text);
            }
            _ => return None,
        }

        Some(self.snapshot())
    }

    /// Current cumulative text.
    ///
    /// Once tool-call arguments have arrived they are the response body;
    /// any prose before them is preamble.
    pub fn snapshot(&self) -> &str {
        if self.uses_tool_channel() {
            &self.tool_text
        } else {
            &self.text
        }
    }

    /// Whether the snapshot comes from tool-call arguments
    pub fn uses_tool_channel(&self) -> bool {
        self.tool_index.is_some()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Mark the buffer finalized; returns `false` if it already was
    pub(crate) fn mark_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> DeltaFragment {
        DeltaFragment::Content {
            text: text.to_string(),
            finish: None,
        }
    }

    fn tool(index: usize, text: &str) -> DeltaFragment {
        DeltaFragment::ToolCallDelta {
            index,
            text: text.to_string(),
            finish: None,
        }
    }

    #[test]
    fn test_split_tokens_are_appended_verbatim() {
        let mut buffer = AccumulationBuffer::new();

        assert_eq!(
            buffer.push(&content(r#"{"capital":"Paris", "popul"#)),
            Some(r#"{"capital":"Paris", "popul"#)
        );
        // intermediate state is not JSON and that is fine
        assert!(serde_json::from_str::<serde_json::Value>(buffer.snapshot()).is_err());

        buffer.push(&content(r#"ation":67"#));
        buffer.push(&content(r#".5, "languages":["French"]}"#));
        assert_eq!(
            buffer.snapshot(),
            r#"{"capital":"Paris", "population":67.5, "languages":["French"]}"#
        );
    }

    #[test]
    fn test_fragments_without_text_do_not_snapshot() {
        let mut buffer = AccumulationBuffer::new();
        assert!(buffer.push(&DeltaFragment::Ignored).is_none());
        assert!(buffer.push(&content("")).is_none());
        assert_eq!(buffer.snapshot(), "");
    }

    #[test]
    fn test_tool_channel_takes_over() {
        let mut buffer = AccumulationBuffer::new();
        buffer.push(&content("Let me fill that in."));
        buffer.push(&tool(0, r#"{"todos":"#));
        buffer.push(&tool(1, r#"{"other":true}"#));
        buffer.push(&tool(0, r#"["a"]}"#));

        assert!(buffer.uses_tool_channel());
        assert_eq!(buffer.snapshot(), r#"{"todos":["a"]}"#);
    }

    #[test]
    fn test_prose_after_tool_arguments_keeps_snapshot() {
        let mut buffer = AccumulationBuffer::new();
        assert_eq!(buffer.push(&tool(0, r#"{"a":1}"#)), Some(r#"{"a":1}"#));

        assert!(buffer.push(&content(" trailing prose")).is_none());
        assert!(buffer.push(&content(" more")).is_none());
        assert_eq!(buffer.snapshot(), r#"{"a":1}"#);
    }

    #[test]
    fn test_nothing_appended_after_finalization() {
        let mut buffer = AccumulationBuffer::new();
        buffer.push(&content("done"));
        assert!(buffer.mark_finalized());
        assert!(!buffer.mark_finalized());

        assert!(buffer.push(&content(" and more")).is_none());
        assert_eq!(buffer.snapshot(), "done");
    }
}
