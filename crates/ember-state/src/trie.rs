//! # Persistent Merkle Trie
//!
//! Insert, get, and remove over the staged node store. The trie is
//! persistent: mutations build new nodes and leave every old root
//! readable, so a reorg positions a fresh world state at the common
//! ancestor's root without replaying history.
//!
//! ## Invariants
//!
//! - The same key/value set produces the same root, regardless of the
//!   order mutations were applied in.
//! - A node referenced by any reachable root resolves through the store;
//!   a miss during traversal is [`StateError::MissingNode`].

use shared_crypto::keccak256;
use shared_types::Hash;

use crate::error::StateError;
use crate::nibbles::Nibbles;
use crate::node::TrieNode;
use crate::store::StagedNodeStore;

/// Root of the empty trie.
pub const EMPTY_ROOT: Hash = Hash::ZERO;

/// A trie positioned at a root, writing through a staged node store.
pub struct MerkleTrie {
    store: StagedNodeStore,
    root: Hash,
}

/// Result of a subtree removal.
enum Removal {
    /// Key absent; nothing changed.
    NotFound,
    /// The subtree is now empty.
    Empty,
    /// The subtree was rebuilt into this node.
    Replaced(TrieNode),
}

impl MerkleTrie {
    #[must_use]
    pub fn new(store: StagedNodeStore, root: Hash) -> Self {
        Self { store, root }
    }

    #[must_use]
    pub fn root(&self) -> Hash {
        self.root
    }

    pub fn store(&self) -> &StagedNodeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StagedNodeStore {
        &mut self.store
    }

    /// Reposition at `root`, e.g. after discarding staged writes.
    pub fn reset_root(&mut self, root: Hash) {
        self.root = root;
    }

    /// Read `key` at the current root.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        self.get_at(self.root, key)
    }

    /// Read `key` at an arbitrary root. Old roots remain valid, which is
    /// how previous-value reads work for lazy diffs.
    pub fn get_at(&self, root: Hash, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        if root == EMPTY_ROOT {
            return Ok(None);
        }
        let mut path = Nibbles::from_bytes(key);
        let mut node = self.load(&root)?;

        loop {
            match node {
                TrieNode::Leaf {
                    path: leaf_path,
                    value,
                } => {
                    return Ok(if leaf_path == path { Some(value) } else { None });
                }
                TrieNode::Extension {
                    path: ext_path,
                    child,
                } => {
                    if path.len() < ext_path.len() || path.prefix(ext_path.len()) != ext_path {
                        return Ok(None);
                    }
                    path = path.suffix(ext_path.len());
                    node = self.load(&child)?;
                }
                TrieNode::Branch { children, value } => {
                    if path.is_empty() {
                        return Ok(value);
                    }
                    let idx = path.at(0) as usize;
                    match children[idx] {
                        Some(child) => {
                            path = path.suffix(1);
                            node = self.load(&child)?;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Insert or overwrite `key`.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StateError> {
        let path = Nibbles::from_bytes(key);
        let root = if self.root == EMPTY_ROOT {
            None
        } else {
            Some(self.root)
        };
        let node = self.insert_at(root, path, value)?;
        self.root = self.put_node(&node);
        Ok(())
    }

    /// Remove `key` if present. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &[u8]) -> Result<(), StateError> {
        if self.root == EMPTY_ROOT {
            return Ok(());
        }
        let path = Nibbles::from_bytes(key);
        match self.remove_at(self.root, path)? {
            Removal::NotFound => Ok(()),
            Removal::Empty => {
                self.root = EMPTY_ROOT;
                Ok(())
            }
            Removal::Replaced(node) => {
                self.root = self.put_node(&node);
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn load(&self, hash: &Hash) -> Result<TrieNode, StateError> {
        let bytes = self
            .store
            .get(hash)?
            .ok_or(StateError::MissingNode { hash: *hash })?;
        Ok(TrieNode::decode(&bytes)?)
    }

    fn put_node(&mut self, node: &TrieNode) -> Hash {
        let bytes = node.encode();
        let hash = keccak256(&bytes);
        self.store.put(hash, bytes);
        hash
    }

    fn insert_at(
        &mut self,
        node_hash: Option<Hash>,
        path: Nibbles,
        value: Vec<u8>,
    ) -> Result<TrieNode, StateError> {
        let Some(hash) = node_hash else {
            return Ok(TrieNode::Leaf { path, value });
        };

        match self.load(&hash)? {
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path == path {
                    return Ok(TrieNode::Leaf { path, value });
                }
                let common = path.common_prefix_len(&leaf_path);
                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                let mut branch_value = None;

                let leaf_rest = leaf_path.suffix(common);
                if leaf_rest.is_empty() {
                    branch_value = Some(leaf_value);
                } else {
                    let node = TrieNode::Leaf {
                        path: leaf_rest.suffix(1),
                        value: leaf_value,
                    };
                    children[leaf_rest.at(0) as usize] = Some(self.put_node(&node));
                }

                let new_rest = path.suffix(common);
                if new_rest.is_empty() {
                    branch_value = Some(value);
                } else {
                    let node = TrieNode::Leaf {
                        path: new_rest.suffix(1),
                        value,
                    };
                    children[new_rest.at(0) as usize] = Some(self.put_node(&node));
                }

                let branch = TrieNode::Branch {
                    children,
                    value: branch_value,
                };
                self.wrap_with_prefix(path.prefix(common), branch)
            }

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let common = path.common_prefix_len(&ext_path);
                if common == ext_path.len() {
                    let new_child = self.insert_at(Some(child), path.suffix(common), value)?;
                    let child_hash = self.put_node(&new_child);
                    return Ok(TrieNode::Extension {
                        path: ext_path,
                        child: child_hash,
                    });
                }

                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                let mut branch_value = None;

                // Remainder of the split extension keeps pointing at its
                // old child, through a shorter extension if needed.
                let ext_rest = ext_path.suffix(common);
                let ext_idx = ext_rest.at(0) as usize;
                if ext_rest.len() == 1 {
                    children[ext_idx] = Some(child);
                } else {
                    let node = TrieNode::Extension {
                        path: ext_rest.suffix(1),
                        child,
                    };
                    children[ext_idx] = Some(self.put_node(&node));
                }

                let new_rest = path.suffix(common);
                if new_rest.is_empty() {
                    branch_value = Some(value);
                } else {
                    let node = TrieNode::Leaf {
                        path: new_rest.suffix(1),
                        value,
                    };
                    children[new_rest.at(0) as usize] = Some(self.put_node(&node));
                }

                let branch = TrieNode::Branch {
                    children,
                    value: branch_value,
                };
                self.wrap_with_prefix(path.prefix(common), branch)
            }

            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    return Ok(TrieNode::Branch {
                        children,
                        value: Some(value),
                    });
                }
                let idx = path.at(0) as usize;
                let new_child = self.insert_at(children[idx], path.suffix(1), value)?;
                children[idx] = Some(self.put_node(&new_child));
                Ok(TrieNode::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    /// Prefix a freshly built branch with an extension when the split
    /// point sits below the node's start.
    fn wrap_with_prefix(
        &mut self,
        prefix: Nibbles,
        branch: TrieNode,
    ) -> Result<TrieNode, StateError> {
        if prefix.is_empty() {
            return Ok(branch);
        }
        let child = self.put_node(&branch);
        Ok(TrieNode::Extension {
            path: prefix,
            child,
        })
    }

    fn remove_at(&mut self, node_hash: Hash, path: Nibbles) -> Result<Removal, StateError> {
        match self.load(&node_hash)? {
            TrieNode::Leaf {
                path: leaf_path, ..
            } => Ok(if leaf_path == path {
                Removal::Empty
            } else {
                Removal::NotFound
            }),

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                if path.len() < ext_path.len() || path.prefix(ext_path.len()) != ext_path {
                    return Ok(Removal::NotFound);
                }
                match self.remove_at(child, path.suffix(ext_path.len()))? {
                    Removal::NotFound => Ok(Removal::NotFound),
                    Removal::Empty => Ok(Removal::Empty),
                    Removal::Replaced(node) => Ok(Removal::Replaced(match node {
                        // Collapse chains so the trie stays in canonical
                        // form; a non-canonical trie hashes differently.
                        TrieNode::Leaf {
                            path: child_path,
                            value,
                        } => TrieNode::Leaf {
                            path: child_path.prepend(&ext_path),
                            value,
                        },
                        TrieNode::Extension {
                            path: child_path,
                            child,
                        } => TrieNode::Extension {
                            path: child_path.prepend(&ext_path),
                            child,
                        },
                        branch @ TrieNode::Branch { .. } => {
                            let child = self.put_node(&branch);
                            TrieNode::Extension {
                                path: ext_path,
                                child,
                            }
                        }
                    })),
                }
            }

            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if path.is_empty() {
                    if branch_value.is_none() {
                        return Ok(Removal::NotFound);
                    }
                    return self.normalize_branch(children, None);
                }

                let idx = path.at(0) as usize;
                let Some(child) = children[idx] else {
                    return Ok(Removal::NotFound);
                };
                match self.remove_at(child, path.suffix(1))? {
                    Removal::NotFound => Ok(Removal::NotFound),
                    Removal::Empty => {
                        children[idx] = None;
                        self.normalize_branch(children, branch_value)
                    }
                    Removal::Replaced(node) => {
                        children[idx] = Some(self.put_node(&node));
                        Ok(Removal::Replaced(TrieNode::Branch {
                            children,
                            value: branch_value,
                        }))
                    }
                }
            }
        }
    }

    /// Rebuild a branch after a slot or value vanished. A branch with one
    /// remaining referent collapses into its child.
    fn normalize_branch(
        &mut self,
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    ) -> Result<Removal, StateError> {
        let occupied: Vec<usize> = children
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|_| i))
            .collect();

        if occupied.is_empty() {
            return Ok(match value {
                None => Removal::Empty,
                Some(v) => Removal::Replaced(TrieNode::Leaf {
                    path: Nibbles(vec![]),
                    value: v,
                }),
            });
        }

        if occupied.len() == 1 && value.is_none() {
            let idx = occupied[0];
            let child_hash = children[idx].expect("occupied slot");
            let nibble = Nibbles(vec![idx as u8]);
            return Ok(Removal::Replaced(match self.load(&child_hash)? {
                TrieNode::Leaf { path, value } => TrieNode::Leaf {
                    path: path.prepend(&nibble),
                    value,
                },
                TrieNode::Extension { path, child } => TrieNode::Extension {
                    path: path.prepend(&nibble),
                    child,
                },
                TrieNode::Branch { .. } => TrieNode::Extension {
                    path: nibble,
                    child: child_hash,
                },
            }));
        }

        Ok(Removal::Replaced(TrieNode::Branch { children, value }))
    }
}
