//! Pure context assembly.
//!
//! Turns an ancestor chain plus resolved references into the final message
//! sequence: chronological chain order, referenced nodes annotated inline
//! immediately before the message that first mentions them, then budget
//! trimming.
//!
//! Trim priority when over budget: reference annotations drop first (most
//! distant from the target first), then the oldest ancestors. The target
//! node is never dropped — if it alone exceeds the budget its content is
//! truncated instead. `truncated` is set whenever anything was dropped or
//! shortened.

use std::collections::{HashMap, HashSet};

use arbor_core::{ContextMessage, Node};
use arbor_tokens::TokenBudgeter;

use crate::resolver::{extract_references, ReferenceMatch, Resolution};

/// Inputs to one assembly.
pub struct AssemblyInput<'a> {
    /// Ancestor chain, root → target. Must be non-empty.
    pub chain: &'a [Node],
    /// Resolution results for every reference extracted from the chain.
    pub references: &'a [ReferenceMatch],
    /// Model whose encoder prices the budget.
    pub model: &'a str,
    /// Effective token budget (already clamped to the model limit).
    pub token_budget: u32,
}

/// Output of one assembly.
#[derive(Clone, Debug)]
pub struct AssemblyOutput {
    /// Ordered message sequence.
    pub messages: Vec<ContextMessage>,
    /// Token count of `messages` including per-message overhead.
    pub token_count: u32,
    /// Whether budget pressure dropped or shortened anything.
    pub truncated: bool,
    /// Non-fatal annotations (unresolved references).
    pub warnings: Vec<String>,
}

/// One slot of the pre-trim sequence.
enum Item {
    /// A reference annotation preceding its point of mention.
    Annotation(ContextMessage),
    /// A chain node's own message; the flag marks the target.
    Chain(ContextMessage, bool),
}

/// Assemble the message sequence for a chain and its references.
pub fn assemble(input: &AssemblyInput<'_>, budgeter: &TokenBudgeter) -> AssemblyOutput {
    debug_assert!(!input.chain.is_empty(), "chain includes at least the target");

    let chain_ids: HashSet<&str> = input.chain.iter().map(|n| n.id.as_str()).collect();

    // Token → resolved node, for references that point outside the chain.
    // In-chain references are already present chronologically and get no
    // annotation.
    let mut resolved: HashMap<&str, &Node> = HashMap::new();
    let mut warnings = Vec::new();
    for reference in input.references {
        match &reference.resolution {
            Resolution::Resolved(node) => {
                if !chain_ids.contains(node.id.as_str()) {
                    let _ = resolved.insert(reference.raw_token.as_str(), node);
                }
            }
            Resolution::NotFound => {
                warnings.push(format!(
                    "reference '{}' did not resolve to any node in the session",
                    reference.raw_token
                ));
            }
            // Ambiguity fails the request before assembly; tolerate it
            // here for direct callers by warning instead.
            Resolution::Ambiguous { matches } => {
                warnings.push(format!(
                    "reference '{}' is ambiguous ({} candidates)",
                    reference.raw_token,
                    matches.len()
                ));
            }
        }
    }

    // Chronological sequence with annotations at first point of mention.
    let mut items: Vec<Item> = Vec::new();
    let mut annotated: HashSet<&str> = HashSet::new();
    let target_idx = input.chain.len() - 1;
    for (i, node) in input.chain.iter().enumerate() {
        for token in extract_references(&node.content) {
            if let Some((key, ref_node)) = resolved.get_key_value(token.as_str()) {
                if annotated.insert(*key) {
                    items.push(Item::Annotation(annotation_message(ref_node)));
                }
            }
        }
        items.push(Item::Chain(ContextMessage::from_node(node), i == target_idx));
    }

    trim_and_finish(items, input, budgeter, warnings)
}

/// Render a referenced node as an inline annotation.
fn annotation_message(node: &Node) -> ContextMessage {
    ContextMessage::note(format!(
        "[ref {}] {}: {}",
        node.id.short(),
        node.role,
        node.content
    ))
}

fn trim_and_finish(
    mut items: Vec<Item>,
    input: &AssemblyInput<'_>,
    budgeter: &TokenBudgeter,
    warnings: Vec<String>,
) -> AssemblyOutput {
    let budget = input.token_budget;
    let cost = |m: &ContextMessage| budgeter.count_messages(std::slice::from_ref(m), input.model);

    let mut total: u32 = items
        .iter()
        .map(|item| match item {
            Item::Annotation(m) | Item::Chain(m, _) => cost(m),
        })
        .sum();
    let mut truncated = false;

    // 1. Annotations drop first, most distant from the target first.
    while total > budget {
        let Some(pos) = items
            .iter()
            .position(|item| matches!(item, Item::Annotation(_)))
        else {
            break;
        };
        let Item::Annotation(m) = items.remove(pos) else {
            unreachable!("position matched an annotation");
        };
        total -= cost(&m);
        truncated = true;
    }

    // 2. Then the oldest ancestors, never the target.
    while total > budget {
        let Some(pos) = items
            .iter()
            .position(|item| matches!(item, Item::Chain(_, false)))
        else {
            break;
        };
        let Item::Chain(m, _) = items.remove(pos) else {
            unreachable!("position matched a chain message");
        };
        total -= cost(&m);
        truncated = true;
    }

    let mut messages: Vec<ContextMessage> = items
        .into_iter()
        .map(|item| match item {
            Item::Annotation(m) | Item::Chain(m, _) => m,
        })
        .collect();

    // 3. Only the target remains and still over: truncate its content.
    if total > budget {
        debug_assert_eq!(messages.len(), 1, "only the target can remain here");
        if let Some(target) = messages.last_mut() {
            let overhead = budgeter.message_overhead(target);
            let content_budget = budget.saturating_sub(overhead);
            let trimmed =
                budgeter.truncate_to_limit(&target.content, input.model, Some(content_budget));
            target.content = trimmed.text;
            truncated = true;
        }
    }

    let token_count = budgeter.count_messages(&messages, input.model);
    AssemblyOutput {
        messages,
        token_count,
        truncated,
        warnings,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{NodeId, NodeRole, SessionId};

    fn node(id: &str, parent: Option<&str>, role: NodeRole, content: &str) -> Node {
        Node {
            id: NodeId::from(id),
            session_id: SessionId::from("sess-1"),
            parent_id: parent.map(NodeId::from),
            role,
            content: content.into(),
            model: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    fn resolved(token: &str, node: Node) -> ReferenceMatch {
        ReferenceMatch {
            raw_token: token.into(),
            resolution: Resolution::Resolved(node),
        }
    }

    fn budgeter() -> TokenBudgeter {
        TokenBudgeter::new(8)
    }

    fn simple_chain() -> Vec<Node> {
        vec![
            node("root0000", None, NodeRole::User, "first question"),
            node("mid00000", Some("root0000"), NodeRole::Assistant, "first answer"),
            node("leaf0000", Some("mid00000"), NodeRole::User, "follow-up question"),
        ]
    }

    #[test]
    fn chronological_order_no_references() {
        let chain = simple_chain();
        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &[],
                model: "claude-opus-4-6",
                token_budget: 100_000,
            },
            &budgeter(),
        );
        assert_eq!(out.messages.len(), 3);
        assert_eq!(out.messages[0].content, "first question");
        assert_eq!(out.messages[2].content, "follow-up question");
        assert!(!out.truncated);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn reference_annotated_before_mention() {
        let mut chain = simple_chain();
        chain[2].content = "compare with @aaaa1111bbbb2222 please".into();
        let side = node("aaaa1111bbbb2222", None, NodeRole::Assistant, "the side branch answer");
        let refs = vec![resolved("aaaa1111bbbb2222", side)];

        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &refs,
                model: "m",
                token_budget: 100_000,
            },
            &budgeter(),
        );
        assert_eq!(out.messages.len(), 4);
        // Annotation sits immediately before the mentioning message.
        assert_eq!(out.messages[2].role, NodeRole::Note);
        assert!(out.messages[2].content.contains("the side branch answer"));
        assert!(out.messages[2].content.contains("bbbb2222"));
        assert_eq!(out.messages[3].content, chain[2].content);
    }

    #[test]
    fn in_chain_reference_not_annotated() {
        let mut chain = vec![
            node("ab12cd34", None, NodeRole::User, "first question"),
            node("ef56ab78", Some("ab12cd34"), NodeRole::Assistant, "first answer"),
            node("cd90ef12", Some("ef56ab78"), NodeRole::User, "follow-up"),
        ];
        chain[2].content = "as I said in @ab12cd34".into();
        // ab12cd34 is inside the chain — already present chronologically.
        let refs = vec![resolved("ab12cd34", chain[0].clone())];

        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &refs,
                model: "m",
                token_budget: 100_000,
            },
            &budgeter(),
        );
        assert_eq!(out.messages.len(), 3);
        assert!(out.messages.iter().all(|m| m.role != NodeRole::Note));
    }

    #[test]
    fn reference_annotated_only_at_first_mention() {
        let mut chain = simple_chain();
        chain[1].content = "see @cafe0000dead0000".into();
        chain[2].content = "again @cafe0000dead0000".into();
        let side = node("cafe0000dead0000", None, NodeRole::Note, "shared note");
        let refs = vec![resolved("cafe0000dead0000", side)];

        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &refs,
                model: "m",
                token_budget: 100_000,
            },
            &budgeter(),
        );
        let notes = out
            .messages
            .iter()
            .filter(|m| m.role == NodeRole::Note)
            .count();
        assert_eq!(notes, 1);
        // And it precedes the first mention (index 1 in the original chain).
        assert_eq!(out.messages[1].role, NodeRole::Note);
    }

    #[test]
    fn unresolved_reference_becomes_warning() {
        let chain = simple_chain();
        let refs = vec![ReferenceMatch {
            raw_token: "feedc0de".into(),
            resolution: Resolution::NotFound,
        }];
        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &refs,
                model: "m",
                token_budget: 100_000,
            },
            &budgeter(),
        );
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("feedc0de"));
        assert_eq!(out.messages.len(), 3);
    }

    #[test]
    fn annotations_dropped_before_ancestors() {
        let b = budgeter();
        let mut chain = simple_chain();
        chain[2].content = "uses @aaaa1111bbbb2222 here".into();
        let side = node(
            "aaaa1111bbbb2222",
            None,
            NodeRole::Assistant,
            &"reference payload ".repeat(20),
        );
        let refs = vec![resolved("aaaa1111bbbb2222", side)];

        // Budget that fits the chain but not chain + annotation.
        let chain_only: u32 = chain
            .iter()
            .map(|n| b.count_messages(&[ContextMessage::from_node(n)], "m"))
            .sum();

        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &refs,
                model: "m",
                token_budget: chain_only,
            },
            &b,
        );
        assert!(out.truncated);
        assert_eq!(out.messages.len(), 3);
        assert!(out.messages.iter().all(|m| m.role != NodeRole::Note));
        assert!(out.token_count <= chain_only);
    }

    #[test]
    fn oldest_ancestors_dropped_after_annotations() {
        let b = budgeter();
        let chain = simple_chain();
        // Budget fits only the newest two messages.
        let newest_two: u32 = chain[1..]
            .iter()
            .map(|n| b.count_messages(&[ContextMessage::from_node(n)], "m"))
            .sum();

        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &[],
                model: "m",
                token_budget: newest_two,
            },
            &b,
        );
        assert!(out.truncated);
        assert_eq!(out.messages.len(), 2);
        assert_eq!(out.messages[0].content, "first answer");
        assert_eq!(out.messages[1].content, "follow-up question");
    }

    #[test]
    fn lone_target_content_truncated() {
        let b = budgeter();
        let chain = vec![node("solo0000", None, NodeRole::User, &"long text ".repeat(100))];
        let out = assemble(
            &AssemblyInput {
                chain: &chain,
                references: &[],
                model: "m",
                token_budget: 20,
            },
            &b,
        );
        assert!(out.truncated);
        assert_eq!(out.messages.len(), 1);
        assert!(out.token_count <= 20);
        assert!("long text ".repeat(100).starts_with(&out.messages[0].content));
    }

    #[test]
    fn token_count_never_exceeds_budget() {
        let b = budgeter();
        for budget in [5u32, 20, 50, 500] {
            let out = assemble(
                &AssemblyInput {
                    chain: &simple_chain(),
                    references: &[],
                    model: "claude-opus-4-6",
                    token_budget: budget,
                },
                &b,
            );
            assert!(
                out.token_count <= budget,
                "budget {budget} exceeded: {}",
                out.token_count
            );
        }
    }

    #[test]
    fn deterministic_output() {
        let chain = simple_chain();
        let input = AssemblyInput {
            chain: &chain,
            references: &[],
            model: "m",
            token_budget: 1_000,
        };
        let b = budgeter();
        let a = assemble(&input, &b);
        let c = assemble(&input, &b);
        assert_eq!(a.messages, c.messages);
        assert_eq!(a.token_count, c.token_count);
    }
}
