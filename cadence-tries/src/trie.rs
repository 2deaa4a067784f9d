//! Rolling-frecency crit-bit trie
//!
//! A binary radix trie in the classic crit-bit layout: internal nodes store
//! the index of the first differing byte and a mask isolating the critical
//! bit; leaves hold the key and its recency value. Lookups and inserts touch
//! O(key length) nodes and need no rebalancing.
//!
//! Navigation runs over an augmented key (8-byte big-endian length prefix
//! followed by the key bytes), which keeps the key space prefix-free for
//! variable-length keys. The augmentation is internal; callers see only the
//! raw key, and iteration order is not part of the contract.

use prost::Message;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrieError {
    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Recency value for one key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Frecency {
    /// Lowest frame number this key was seen at.
    pub earliest_frame: u64,
    /// Highest frame number this key was seen at.
    pub latest_frame: u64,
    /// How many times the key was added.
    pub count: u64,
}

#[derive(Clone, Debug)]
enum Node {
    Internal {
        /// Index into the augmented key of the first differing byte.
        byte: usize,
        /// All bits set except the critical one (djb convention).
        otherbits: u8,
        children: Box<[Node; 2]>,
    },
    Leaf {
        key: Vec<u8>,
        value: Frecency,
    },
}

/// Serialized leaf row. The canonical image is the in-order leaf list, which
/// makes serialize/deserialize a byte-exact round trip.
#[derive(Clone, PartialEq, Message)]
struct LeafRow {
    #[prost(bytes = "vec", tag = "1")]
    key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    earliest_frame: u64,
    #[prost(uint64, tag = "3")]
    latest_frame: u64,
    #[prost(uint64, tag = "4")]
    count: u64,
}

#[derive(Clone, PartialEq, Message)]
struct TrieImage {
    #[prost(message, repeated, tag = "1")]
    leaves: Vec<LeafRow>,
}

/// Crit-bit trie mapping prover identities to their observed recency.
#[derive(Clone, Debug, Default)]
pub struct RollingFrecencyCritbitTrie {
    root: Option<Node>,
    len: usize,
}

#[inline]
fn augmented_byte(key: &[u8], index: usize) -> u8 {
    if index < 8 {
        (key.len() as u64).to_be_bytes()[index]
    } else if index - 8 < key.len() {
        key[index - 8]
    } else {
        0
    }
}

#[inline]
fn direction(key: &[u8], byte: usize, otherbits: u8) -> usize {
    ((1 + (otherbits | augmented_byte(key, byte)) as usize) >> 8) & 1
}

impl RollingFrecencyCritbitTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record `key` at `frame_number`, folding the recency value:
    /// earliest/latest are min/max over all adds, count increments.
    pub fn add(&mut self, key: &[u8], frame_number: u64) {
        let Some(root) = self.root.as_mut() else {
            self.root = Some(Node::Leaf {
                key: key.to_vec(),
                value: Frecency {
                    earliest_frame: frame_number,
                    latest_frame: frame_number,
                    count: 1,
                },
            });
            self.len = 1;
            return;
        };

        // Walk to the closest leaf and find the critical bit, with the
        // shared borrow scoped so the mutation below can re-borrow.
        let crit = {
            let mut probe: &Node = &*root;
            loop {
                match probe {
                    Node::Internal {
                        byte,
                        otherbits,
                        children,
                    } => probe = &children[direction(key, *byte, *otherbits)],
                    Node::Leaf { key: leaf_key, .. } => break critical_bit(key, leaf_key),
                }
            }
        };

        match crit {
            None => {
                // Exact match: fold into the existing value.
                if let Some(value) = find_value_mut(root, key) {
                    value.earliest_frame = value.earliest_frame.min(frame_number);
                    value.latest_frame = value.latest_frame.max(frame_number);
                    value.count += 1;
                }
            }
            Some((crit_byte, crit_otherbits)) => {
                Self::insert_split(root, key, frame_number, crit_byte, crit_otherbits);
                self.len += 1;
            }
        }
    }

    /// Recency of `key`; all-zero (`count == 0`) when absent.
    pub fn get(&self, key: &[u8]) -> Frecency {
        let mut probe = match &self.root {
            Some(node) => node,
            None => return Frecency::default(),
        };
        loop {
            match probe {
                Node::Internal {
                    byte,
                    otherbits,
                    children,
                } => probe = &children[direction(key, *byte, *otherbits)],
                Node::Leaf {
                    key: leaf_key,
                    value,
                } => {
                    return if leaf_key == key {
                        *value
                    } else {
                        Frecency::default()
                    };
                }
            }
        }
    }

    /// Cheap deep clone for batch isolation: mutations of the snapshot are
    /// invisible to the source and vice versa.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Canonical byte image: leaves in trie order.
    pub fn serialize(&self) -> Vec<u8> {
        let mut leaves = Vec::with_capacity(self.len);
        if let Some(root) = &self.root {
            collect(root, &mut leaves);
        }
        TrieImage { leaves }.encode_to_vec()
    }

    /// Rebuild from a serialized image. Round-tripping is byte-exact.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TrieError> {
        let image = TrieImage::decode(bytes)?;
        let mut trie = Self::new();
        for row in image.leaves {
            trie.insert_row(row);
        }
        Ok(trie)
    }

    fn insert_row(&mut self, row: LeafRow) {
        // First add establishes the row, then the folded value is overwritten
        // so counts survive the round trip.
        self.add(&row.key, row.earliest_frame);
        if let Some(root) = self.root.as_mut() {
            if let Some(value) = find_value_mut(root, &row.key) {
                *value = Frecency {
                    earliest_frame: row.earliest_frame,
                    latest_frame: row.latest_frame,
                    count: row.count,
                };
            }
        }
    }

    fn insert_split(
        root: &mut Node,
        key: &[u8],
        frame_number: u64,
        crit_byte: usize,
        crit_otherbits: u8,
    ) {
        let new_dir = direction(key, crit_byte, crit_otherbits);

        // Find the insertion point: the first node whose critical bit sorts
        // after the new one, walking the same path a lookup would take.
        let mut slot: &mut Node = root;
        loop {
            let dir = match &*slot {
                Node::Internal {
                    byte, otherbits, ..
                } if (*byte, *otherbits) < (crit_byte, crit_otherbits) => {
                    direction(key, *byte, *otherbits)
                }
                _ => break,
            };
            slot = match slot {
                Node::Internal { children, .. } => &mut children[dir],
                Node::Leaf { .. } => break,
            };
        }

        let new_leaf = Node::Leaf {
            key: key.to_vec(),
            value: Frecency {
                earliest_frame: frame_number,
                latest_frame: frame_number,
                count: 1,
            },
        };
        let displaced = std::mem::replace(
            slot,
            Node::Leaf {
                key: Vec::new(),
                value: Frecency::default(),
            },
        );
        let children = if new_dir == 1 {
            Box::new([displaced, new_leaf])
        } else {
            Box::new([new_leaf, displaced])
        };
        *slot = Node::Internal {
            byte: crit_byte,
            otherbits: crit_otherbits,
            children,
        };
    }
}

/// First differing augmented-key position between two keys, as
/// `(byte index, otherbits mask)`; `None` when the keys are equal.
fn critical_bit(a: &[u8], b: &[u8]) -> Option<(usize, u8)> {
    let span = 8 + a.len().max(b.len());
    for index in 0..span {
        let diff = augmented_byte(a, index) ^ augmented_byte(b, index);
        if diff != 0 {
            // Isolate the most significant set bit of the difference.
            let mut bits = diff;
            bits |= bits >> 1;
            bits |= bits >> 2;
            bits |= bits >> 4;
            let crit = bits & !(bits >> 1);
            return Some((index, !crit));
        }
    }
    None
}

fn find_value_mut<'a>(node: &'a mut Node, key: &[u8]) -> Option<&'a mut Frecency> {
    match node {
        Node::Internal {
            byte,
            otherbits,
            children,
        } => {
            let dir = direction(key, *byte, *otherbits);
            find_value_mut(&mut children[dir], key)
        }
        Node::Leaf {
            key: leaf_key,
            value,
        } => {
            if leaf_key == key {
                Some(value)
            } else {
                None
            }
        }
    }
}

fn collect(node: &Node, out: &mut Vec<LeafRow>) {
    match node {
        Node::Internal { children, .. } => {
            collect(&children[0], out);
            collect(&children[1], out);
        }
        Node::Leaf { key, value } => out.push(LeafRow {
            key: key.clone(),
            earliest_frame: value.earliest_frame,
            latest_frame: value.latest_frame,
            count: value.count,
        }),
    }
}
