//! Ordered sequence of blocks, starting at genesis.

use serde::{Deserialize, Serialize};

use super::block::Block;

/// A chain of blocks. Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blockchain {
    blocks: Vec<Block>,
}

impl Blockchain {
    /// A chain holding only the genesis block.
    pub fn genesis() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Wraps an existing block sequence without validating it.
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Appends a block to the chain tip. Validation is the caller's job.
    pub fn append(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Returns the latest block, if any.
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Block at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

impl<'a> IntoIterator for &'a Blockchain {
    type Item = &'a Block;
    type IntoIter = std::slice::Iter<'a, Block>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_chain_has_one_block() {
        let chain = Blockchain::genesis();
        assert_eq!(chain.len(), 1);
        assert!(chain.tip().unwrap().is_genesis());
    }

    #[test]
    fn serializes_as_plain_array() {
        let chain = Blockchain::genesis();
        let json = serde_json::to_string(&chain).unwrap();
        assert!(json.starts_with("[{\"Index\":0"));
        assert!(json.ends_with("}]"));

        let back: Blockchain = serde_json::from_str(&json).unwrap();
        assert_eq!(back, chain);
    }

    #[test]
    fn append_moves_the_tip() {
        let mut chain = Blockchain::genesis();
        let next = Block::new(chain.tip().unwrap(), String::new(), 1, vec![]).unwrap();
        chain.append(next.clone());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.tip(), Some(&next));
    }
}
