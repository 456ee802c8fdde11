//! `InspectTrie`: a resumable, bounded breadth-first walk that
//! finds dangling child references in a persisted trie. This is healing's
//! plan B, used when `Decompose` alone can't tell whether an allocated but
//! unprocessed envelope is actually complete underneath.

use std::collections::VecDeque;

use snapsync_trie::{Nibbles, Node, NodeRef, Trie, TrieError};

use crate::envelope::NodeSpecs;

/// Opaque continuation handed back by a suspended walk; pass it to the next
/// call to pick up exactly where the last one left off.
#[derive(Debug, Default)]
pub struct ResumeCtx {
    queue: VecDeque<(NodeRef, Nibbles)>,
    level: usize,
}

#[derive(Debug)]
pub struct InspectOutcome {
    pub dangling: Vec<NodeSpecs>,
    pub level: usize,
    pub visited: usize,
    pub resume_ctx: Option<ResumeCtx>,
    /// True if the walk stopped early because `dangling` hit `max_dangling`,
    /// as opposed to suspending because `batch_limit` reads were spent.
    pub stopped: bool,
}

/// Maximum trie depth (64 nibbles = a full 32-byte key); exceeding it while
/// walking down extensions can only mean a malformed or cyclic reference.
const MAX_DEPTH: usize = 64;

pub fn inspect_trie(
    trie: &Trie,
    root: &NodeRef,
    seed_paths: &[Nibbles],
    resume_ctx: Option<ResumeCtx>,
    batch_limit: usize,
    max_dangling: usize,
) -> Result<InspectOutcome, TrieError> {
    let (mut queue, mut level) = match resume_ctx {
        Some(ctx) => (ctx.queue, ctx.level),
        None => (seed_queue(trie, root, seed_paths)?, 0),
    };

    let mut dangling = Vec::new();
    let mut visited = 0usize;

    while let Some((node_ref, path)) = queue.pop_front() {
        if visited >= batch_limit {
            queue.push_front((node_ref, path));
            return Ok(InspectOutcome {
                dangling,
                level,
                visited,
                resume_ctx: Some(ResumeCtx { queue, level }),
                stopped: false,
            });
        }
        if path.len() > MAX_DEPTH {
            return Err(TrieError::TrieLoopAlert);
        }

        visited += 1;
        level = level.max(path.len());

        match trie.get_node(&node_ref)? {
            None => {
                if let Some(node_key) = node_ref.as_hash() {
                    dangling.push(NodeSpecs { partial_path: path, node_key, data: None });
                    if dangling.len() >= max_dangling {
                        return Ok(InspectOutcome {
                            dangling,
                            level,
                            visited,
                            resume_ctx: (!queue.is_empty()).then_some(ResumeCtx { queue, level }),
                            stopped: true,
                        });
                    }
                }
            }
            Some(Node::Leaf(_)) => {}
            Some(Node::Extension(ext)) => queue.push_back((ext.child, path.append(&ext.prefix))),
            Some(Node::Branch(branch)) => {
                for (nibble, child) in branch.children.iter().enumerate() {
                    if !child.is_empty() {
                        queue.push_back((child.clone(), path.push(nibble as u8)));
                    }
                }
            }
        }
    }

    Ok(InspectOutcome { dangling, level, visited, resume_ctx: None, stopped: false })
}

fn seed_queue(trie: &Trie, root: &NodeRef, seed_paths: &[Nibbles]) -> Result<VecDeque<(NodeRef, Nibbles)>, TrieError> {
    if seed_paths.is_empty() {
        return Ok(VecDeque::from([(root.clone(), Nibbles::empty())]));
    }
    let mut queue = VecDeque::new();
    for seed in seed_paths {
        if let Some(found) = resolve_path(trie, root, seed)? {
            queue.push_back((found, seed.clone()));
        }
    }
    Ok(queue)
}

/// Walks down from `root` following `target` nibble-by-nibble, returning the
/// node reference located exactly there (or `None` if the path runs off the
/// edge of what's resolvable/allocated).
fn resolve_path(trie: &Trie, root: &NodeRef, target: &Nibbles) -> Result<Option<NodeRef>, TrieError> {
    let mut current = root.clone();
    let mut remaining = target.clone();
    loop {
        if remaining.is_empty() {
            return Ok(Some(current));
        }
        let Some(node) = trie.get_node(&current)? else { return Ok(None) };
        match node {
            Node::Leaf(_) => return Ok(None),
            Node::Extension(ext) => {
                if !remaining.starts_with(&ext.prefix) {
                    return Ok(None);
                }
                remaining = remaining.skip_prefix(ext.prefix.len());
                current = ext.child;
            }
            Node::Branch(branch) => {
                let nibble = remaining.at(0) as usize;
                remaining = remaining.skip_prefix(1);
                current = branch.children[nibble].clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ethereum_types::H256;
    use snapsync_trie::InMemoryTrieDB;

    fn key(byte: u8) -> H256 {
        H256::repeat_byte(byte)
    }

    #[test]
    fn finds_no_dangling_links_in_a_fully_resolved_trie() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        for i in 0u8..10 {
            trie.insert(key(i), vec![i]).unwrap();
        }
        let root = trie.root_ref().unwrap().clone();
        let outcome = inspect_trie(&trie, &root, &[], None, 1000, 1000).unwrap();
        assert!(outcome.dangling.is_empty());
        assert!(outcome.resume_ctx.is_none());
    }

    #[test]
    fn finds_the_dangling_root_of_a_detached_trie() {
        let db = Arc::new(InMemoryTrieDB::new());
        let mut trie = Trie::new(db);
        trie.insert(key(1), vec![1]).unwrap();
        let root_hash = trie.hash();

        let detached = Trie::open(Arc::new(InMemoryTrieDB::new()), root_hash);
        let root = detached.root_ref().unwrap().clone();
        let outcome = inspect_trie(&detached, &root, &[], None, 1000, 1000).unwrap();
        assert_eq!(outcome.dangling.len(), 1);
        assert_eq!(outcome.dangling[0].node_key, root_hash);
    }

    #[test]
    fn suspends_after_batch_limit_and_resumes() {
        let mut trie = Trie::new(Arc::new(InMemoryTrieDB::new()));
        for i in 0u8..40 {
            trie.insert(key(i), vec![i]).unwrap();
        }
        let root = trie.root_ref().unwrap().clone();

        let first = inspect_trie(&trie, &root, &[], None, 1, 1000).unwrap();
        assert!(!first.stopped);
        assert!(first.resume_ctx.is_some());
        assert_eq!(first.visited, 1);

        let mut total_visited = first.visited;
        let mut resume = first.resume_ctx;
        loop {
            let step = inspect_trie(&trie, &root, &[], resume.take(), 4, 1000).unwrap();
            total_visited += step.visited;
            if step.resume_ctx.is_none() {
                break;
            }
            resume = step.resume_ctx;
        }
        assert!(total_visited > 1);
    }
}
