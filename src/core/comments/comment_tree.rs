// Reply tree assembly.
//
// Input is a flat list for one or more posts, already ordered by creation
// time. Output keeps that order at every level. A reply whose parent is not in
// the input (deleted, or filtered out because it is still pending) is dropped
// together with its own replies. It is never promoted to a root.
//
// Nesting stops at MAX_REPLY_DEPTH. Replies further down are listed flat, in
// thread order, as siblings on the deepest level. Serializing, cloning and
// dropping a node all recurse per level, so the cap keeps them bounded.

use super::comment_models::{Comment, CommentNode};
use std::collections::HashMap;

/// Deepest level a reply can sit at (roots are level 1).
pub const MAX_REPLY_DEPTH: usize = 64;

pub fn build_comment_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let index: HashMap<i64, usize> = comments
        .iter()
        .enumerate()
        .map(|(position, comment)| (comment.id, position))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();

    for (position, comment) in comments.iter().enumerate() {
        match comment.parent_id {
            None => roots.push(position),
            Some(parent_id) => {
                if let Some(&parent) = index.get(&parent_id) {
                    if parent != position {
                        children[parent].push(position);
                    }
                }
            }
        }
    }

    // Pre-order walk from the roots. Every node has at most one parent, so
    // nothing is visited twice and cycles are unreachable. `hosted[p]` lists
    // the nodes that end up in p's replies, in walk order.
    let mut depth = vec![0usize; comments.len()];
    let mut hosted: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut order = Vec::with_capacity(comments.len());
    let mut stack: Vec<(usize, Option<usize>)> = roots.iter().rev().map(|&r| (r, None)).collect();

    while let Some((position, host)) = stack.pop() {
        order.push(position);
        match host {
            Some(host) => {
                depth[position] = depth[host] + 1;
                hosted[host].push(position);
            }
            None => depth[position] = 1,
        }

        // At the cap, children move up to this node's host
        let child_host = match host {
            Some(host) if depth[position] >= MAX_REPLY_DEPTH => host,
            _ => position,
        };
        stack.extend(
            children[position]
                .iter()
                .rev()
                .map(|&child| (child, Some(child_host))),
        );
    }

    // Build bottom-up: a host always comes before its hosted nodes in the walk.
    let mut slots: Vec<Option<Comment>> = comments.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..slots.len()).map(|_| None).collect();

    for &position in order.iter().rev() {
        let replies = hosted[position]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();

        if let Some(comment) = slots[position].take() {
            built[position] = Some(CommentNode { comment, replies });
        }
    }

    roots
        .into_iter()
        .filter_map(|position| built[position].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comments::CommentStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn comment(id: i64, parent_id: Option<i64>) -> Comment {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::seconds(id);
        Comment {
            id,
            content_item_id: 1,
            parent_id,
            author: format!("author {id}"),
            body: format!("body {id}"),
            status: CommentStatus::Approved,
            created_at,
            updated_at: created_at,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.comment.id).collect()
    }

    #[test]
    fn test_depth_three_chain() {
        let tree = build_comment_tree(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, Some(2)),
            comment(4, None),
        ]);

        assert_eq!(ids(&tree), vec![1, 4]);
        assert_eq!(ids(&tree[0].replies), vec![2]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![3]);
        assert!(tree[1].replies.is_empty());
        assert_eq!(tree[0].size(), 3);
    }

    #[test]
    fn test_children_keep_creation_order() {
        let tree = build_comment_tree(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(1)),
            comment(5, Some(1)),
        ]);

        assert_eq!(ids(&tree), vec![1, 3]);
        assert_eq!(ids(&tree[0].replies), vec![2, 4, 5]);
    }

    #[test]
    fn test_orphans_are_hidden_not_promoted() {
        // 2 is missing (pending or deleted): 3 and its reply 5 disappear
        let tree = build_comment_tree(vec![
            comment(1, None),
            comment(3, Some(2)),
            comment(4, Some(1)),
            comment(5, Some(3)),
        ]);

        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].replies), vec![4]);
        assert_eq!(tree[0].size(), 2);
    }

    #[test]
    fn test_cycles_and_self_parents_are_dropped() {
        let tree = build_comment_tree(vec![
            comment(1, None),
            comment(2, Some(3)),
            comment(3, Some(2)),
            comment(4, Some(4)),
        ]);

        assert_eq!(ids(&tree), vec![1]);
        assert!(tree[0].replies.is_empty());
    }

    fn max_depth(nodes: &[CommentNode]) -> usize {
        let mut deepest = 0;
        let mut pending: Vec<(&CommentNode, usize)> = nodes.iter().map(|n| (n, 1)).collect();
        while let Some((node, level)) = pending.pop() {
            deepest = deepest.max(level);
            pending.extend(node.replies.iter().map(|child| (child, level + 1)));
        }
        deepest
    }

    #[test]
    fn test_deep_thread_is_capped_and_serializes() {
        let mut flat = vec![comment(1, None)];
        for id in 2..=20_000 {
            flat.push(comment(id, Some(id - 1)));
        }

        let tree = build_comment_tree(flat);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].size(), 20_000);
        assert_eq!(max_depth(&tree), MAX_REPLY_DEPTH);

        // Everything past the cap hangs flat off the last nested reply, in order
        let mut node = &tree[0];
        for _ in 2..MAX_REPLY_DEPTH {
            assert_eq!(node.replies.len(), 1);
            node = &node.replies[0];
        }
        let flattened = ids(&node.replies);
        assert_eq!(flattened.len(), 20_000 - (MAX_REPLY_DEPTH - 1));
        assert_eq!(flattened.first(), Some(&(MAX_REPLY_DEPTH as i64)));
        assert!(flattened.windows(2).all(|pair| pair[0] < pair[1]));

        let json = serde_json::to_string(&tree).unwrap();
        assert!(json.contains("\"id\":20000"));
    }

    #[test]
    fn test_cap_keeps_branches_in_thread_order() {
        // 1 -> 2 -> ... -> MAX, then two branches below the deepest node
        let mut flat: Vec<Comment> = (1..=MAX_REPLY_DEPTH as i64)
            .map(|id| comment(id, (id > 1).then(|| id - 1)))
            .collect();
        let deepest = MAX_REPLY_DEPTH as i64;
        flat.push(comment(100, Some(deepest)));
        flat.push(comment(101, Some(deepest)));
        flat.push(comment(102, Some(100)));

        let tree = build_comment_tree(flat);
        assert_eq!(max_depth(&tree), MAX_REPLY_DEPTH);

        let mut node = &tree[0];
        for _ in 2..MAX_REPLY_DEPTH {
            node = &node.replies[0];
        }
        assert_eq!(ids(&node.replies), vec![deepest, 100, 102, 101]);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_comment_tree(Vec::new()).is_empty());
    }
}
