use uuid::Uuid;

use crate::tools::{CallKind, ToolCallItem};

/// A fully reconstructed tool call, ready to be invoked exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub name: String,
    pub kind: CallKind,
    pub raw_arguments: String,
}

/// Rebuilds the single honored tool call of one streaming pass.
///
/// Only the first announced item is kept. Later announcements for other
/// items are counted and ignored, and so are their argument fragments.
#[derive(Debug, Default, Clone)]
pub struct ToolCallAccumulator {
    honored: Option<ToolCallItem>,
    buffer: String,
    ignored_calls: usize,
    dropped_fragments: usize,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announced (or finished) tool item.
    ///
    /// Returns `true` when the item is the honored call.
    pub fn announce(&mut self, item: ToolCallItem) -> bool {
        match &mut self.honored {
            None => {
                if let Some(arguments) = item.arguments.as_deref() {
                    if self.buffer.is_empty() {
                        self.buffer.push_str(arguments);
                    }
                }
                self.honored = Some(item);
                true
            }
            Some(current) if current.same_item(&item) => {
                if current.item_id.is_none() {
                    current.item_id = item.item_id;
                }
                if current.call_id.is_none() {
                    current.call_id = item.call_id;
                }
                if current.name.is_none() {
                    current.name = item.name;
                }
                if self.buffer.is_empty() {
                    if let Some(arguments) = item.arguments {
                        self.buffer = arguments;
                    }
                }
                true
            }
            Some(_) => {
                self.ignored_calls += 1;
                false
            }
        }
    }

    /// Append an argument fragment in arrival order.
    ///
    /// Fragments tagged with an item id that differs from the honored call
    /// are dropped.
    pub fn push_fragment(&mut self, item_id: Option<&str>, fragment: &str) {
        let foreign = match (
            item_id,
            self.honored.as_ref().and_then(|c| c.item_id.as_deref()),
        ) {
            (Some(incoming), Some(honored)) => incoming != honored,
            _ => false,
        };

        if foreign {
            self.dropped_fragments += 1;
            return;
        }

        self.buffer.push_str(fragment);
    }

    pub fn has_call(&self) -> bool {
        self.honored.is_some()
    }

    pub fn raw_arguments(&self) -> &str {
        &self.buffer
    }

    pub fn ignored_calls(&self) -> usize {
        self.ignored_calls
    }

    pub fn dropped_fragments(&self) -> usize {
        self.dropped_fragments
    }

    /// Close the pass.
    ///
    /// `fallback` is consulted only when no call was detected or the live
    /// buffer is empty. Its arguments replace the empty buffer; they are never
    /// appended to streamed content.
    pub fn finish<F>(self, fallback: F) -> Option<PendingToolCall>
    where
        F: FnOnce() -> Option<ToolCallItem>,
    {
        let Self {
            mut honored,
            mut buffer,
            ..
        } = self;

        if honored.is_none() || buffer.trim().is_empty() {
            if let Some(found) = fallback() {
                match &mut honored {
                    None => {
                        log::debug!("tool call recovered from finalized response");
                        buffer = found.arguments.clone().unwrap_or_default();
                        honored = Some(found);
                    }
                    Some(current) if current.same_item(&found) || current.call_id.is_none() => {
                        if current.call_id.is_none() {
                            current.call_id = found.call_id;
                        }
                        if current.name.is_none() {
                            current.name = found.name;
                        }
                        if let Some(arguments) = found.arguments {
                            buffer = arguments;
                        }
                    }
                    Some(_) => {}
                }
            }
        }

        let call = honored?;
        Some(PendingToolCall {
            call_id: call
                .call_id
                .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
            name: call.name.unwrap_or_else(|| "<unknown>".to_string()),
            kind: call.kind,
            raw_arguments: buffer,
        })
    }
}
