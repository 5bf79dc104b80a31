use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{Seek, Write};

use log::trace;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{Error, Result};

/// Longest code a DHT segment can describe.
pub const MAX_CODE_LENGTH: usize = 16;

/// One slot per possible 8-bit symbol.
const HEAP_CAPACITY: usize = 256;

#[derive(Debug, PartialEq, Copy, Clone, Hash, Eq)]
pub enum HuffmanClass {
    DC = 0,
    AC = 1,
}

impl HuffmanClass {
    pub(crate) fn from(ht_class: u8) -> Result<Self> {
        match ht_class {
            0 => Ok(HuffmanClass::DC),
            1 => Ok(HuffmanClass::AC),
            _ => Err(Error::segment(
                "DHT",
                format!("table class {ht_class} is neither DC nor AC"),
            )),
        }
    }
}

#[derive(Debug)]
pub(crate) enum HuffmanNode {
    Leaf { symbol: u8, code: u16, length: u8 },
    Branch {
        left: Option<Box<HuffmanNode>>,
        right: Option<Box<HuffmanNode>>,
    },
}

impl HuffmanNode {
    fn branch() -> Self {
        HuffmanNode::Branch {
            left: None,
            right: None,
        }
    }

    /// Pushes `bit` in front of the code of every leaf below this node.
    fn prepend(&mut self, bit: u16) {
        match self {
            HuffmanNode::Leaf { code, length, .. } => {
                // depths past 16 only matter for their length
                *code |= bit.checked_shl(*length as u32).unwrap_or(0);
                *length += 1;
            }
            HuffmanNode::Branch { left, right } => {
                for child in [left, right].into_iter().flatten() {
                    child.prepend(bit);
                }
            }
        }
    }

    fn collect_leaves(&self, out: &mut Vec<(u8, u16, u8)>) {
        match self {
            HuffmanNode::Leaf {
                symbol,
                code,
                length,
            } => out.push((*symbol, *code, *length)),
            HuffmanNode::Branch { left, right } => {
                for child in [left, right].into_iter().flatten() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    fn find(&self, target: u8) -> Option<(u16, u8)> {
        match self {
            HuffmanNode::Leaf {
                symbol,
                code,
                length,
            } => (*symbol == target).then_some((*code, *length)),
            HuffmanNode::Branch { left, right } => [left, right]
                .into_iter()
                .flatten()
                .find_map(|child| child.find(target)),
        }
    }

    /// Places `symbol` at the leftmost free position `length` levels below the root, filling
    /// left children before right ones. `depth` and `code` describe this node.
    fn insert(&mut self, depth: u8, code: u16, symbol: u8, length: u8) -> bool {
        let HuffmanNode::Branch { left, right } = self else {
            return false;
        };

        for (bit, child) in [(0u16, left), (1u16, right)] {
            let code = (code << 1) | bit;

            match child {
                None if depth + 1 == length => {
                    *child = Some(Box::new(HuffmanNode::Leaf {
                        symbol,
                        code,
                        length,
                    }));
                    return true;
                }
                None => {
                    let mut branch = Box::new(HuffmanNode::branch());
                    let placed = branch.insert(depth + 1, code, symbol, length);
                    *child = Some(branch);
                    return placed;
                }
                Some(node) if depth + 1 < length => {
                    if node.insert(depth + 1, code, symbol, length) {
                        return true;
                    }
                }
                Some(_) => {}
            }
        }

        false
    }
}

#[derive(Debug)]
pub(crate) struct HeapItem {
    freq: usize,
    node: HuffmanNode,
}

impl HeapItem {
    fn from(freq: usize, node: HuffmanNode) -> Self {
        HeapItem { freq, node }
    }
}

// Reversed so that `BinaryHeap` pops the lowest frequency first.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        other.freq.cmp(&self.freq)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.freq == other.freq
    }
}

impl Eq for HeapItem {}

/// A Huffman code table kept as a binary tree: a 0 bit walks left, a 1 bit walks right.
///
/// Leaves carry their own `(code, length)` so the table can be re-serialized and used for
/// emission without rebuilding a lookup structure.
#[derive(Debug)]
pub struct HuffmanTree {
    /// Table class - 0 = DC table, 1 = AC table.
    pub(crate) class: HuffmanClass,

    /// Specifies one of four possible destinations where the huffman table will be used.
    pub(crate) destination_id: u8,

    pub(crate) root: HuffmanNode,
}

impl HuffmanTree {
    /// Builds a table from the DHT layout: `counts[l]` codes of length `l + 1`, followed by the
    /// symbols in increasing code order.
    pub fn from_canonical(
        class: HuffmanClass,
        destination_id: u8,
        counts: &[u8; MAX_CODE_LENGTH],
        symbols: &[u8],
    ) -> Result<Self> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total > 255 {
            return Err(Error::MalformedHuffmanTable("more than 255 codes"));
        }
        if symbols.len() != total {
            return Err(Error::MalformedHuffmanTable(
                "symbol count does not match the length counts",
            ));
        }

        let mut tree = HuffmanTree {
            class,
            destination_id,
            root: HuffmanNode::branch(),
        };

        let mut symbols = symbols.iter();
        for (idx, &count) in counts.iter().enumerate() {
            let length = idx as u8 + 1;
            for _ in 0..count {
                let symbol = *symbols
                    .next()
                    .ok_or(Error::MalformedHuffmanTable("missing symbol"))?;
                if !tree.root.insert(0, 0, symbol, length) {
                    return Err(Error::MalformedHuffmanTable(
                        "codes exceed the space of their length",
                    ));
                }
            }
        }

        Ok(tree)
    }

    /// Reads one table body (16 length counts then the symbols) from a DHT segment.
    ///
    /// Returns the table and the number of bytes it occupied.
    pub fn load_table(
        reader: &mut BitReader,
        class: HuffmanClass,
        destination_id: u8,
    ) -> Result<(Self, usize)> {
        let mut counts = [0u8; MAX_CODE_LENGTH];
        counts.copy_from_slice(reader.read_slice(MAX_CODE_LENGTH)?);

        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total > 255 {
            return Err(Error::MalformedHuffmanTable("more than 255 codes"));
        }
        let symbols = reader.read_slice(total)?;

        let tree = Self::from_canonical(class, destination_id, &counts, symbols)?;
        Ok((tree, MAX_CODE_LENGTH + total))
    }

    /// Builds an optimal table for the observed symbol frequencies.
    ///
    /// The two least frequent subtrees are merged until one remains, prepending a 0 bit to the
    /// left subtree and a 1 bit to the right one at every merge. Equal frequencies are ordered
    /// by heap position, which is deterministic for a given frequency array. The resulting code
    /// lengths are then limited to 16 bits and the codes re-assigned canonically in
    /// (length, symbol) order, so that the exported DHT body describes exactly the codes
    /// that are emitted.
    ///
    /// An unused symbol takes part in the build with a count of one and is dropped at the end,
    /// which keeps the all-ones code of the longest length free (ITU-T T.81 Annex K.2).
    pub fn from_frequencies(
        class: HuffmanClass,
        destination_id: u8,
        freqs: &[u32; 256],
    ) -> Result<Self> {
        let mut min_heap = BinaryHeap::with_capacity(HEAP_CAPACITY);
        let reserved = freqs.iter().position(|&freq| freq == 0).map(|s| s as u8);

        for (symbol, &freq) in freqs.iter().enumerate() {
            let freq = if Some(symbol as u8) == reserved { 1 } else { freq };
            if freq > 0 {
                let leaf = HuffmanNode::Leaf {
                    symbol: symbol as u8,
                    code: 0,
                    length: 0,
                };
                min_heap.push(HeapItem::from(freq as usize, leaf));
            }
        }

        while min_heap.len() > 1 {
            match (min_heap.pop(), min_heap.pop()) {
                (Some(mut left_item), Some(mut right_item)) => {
                    left_item.node.prepend(0);
                    right_item.node.prepend(1);

                    let sum_freq = left_item.freq + right_item.freq;
                    let node = HuffmanNode::Branch {
                        left: Some(Box::new(left_item.node)),
                        right: Some(Box::new(right_item.node)),
                    };
                    min_heap.push(HeapItem::from(sum_freq, node));
                }
                _ => break,
            }
        }

        let root = min_heap
            .pop()
            .ok_or(Error::MalformedHuffmanTable("no symbols to encode"))?;

        let mut leaves = vec![];
        root.node.collect_leaves(&mut leaves);

        let mut lengths: Vec<(u8, u8)> = leaves
            .iter()
            .map(|&(symbol, _, length)| (symbol, length.max(1)))
            .collect();

        // the reserved symbol trades lengths with a longest code and sorts last among them
        if let Some(reserved) = reserved {
            let longest = lengths.iter().map(|&(_, length)| length).max().unwrap_or(1);
            let deepest = lengths.iter().position(|&(_, length)| length == longest);
            let own = lengths.iter().position(|&(symbol, _)| symbol == reserved);
            if let (Some(deepest), Some(own)) = (deepest, own) {
                let own_length = lengths[own].1;
                lengths[deepest].1 = own_length;
                lengths[own].1 = longest;
            }
        }
        lengths.sort_by_key(|&(symbol, length)| (length, Some(symbol) == reserved, symbol));

        let mut counts = limit_code_lengths(&lengths);
        let mut symbols: Vec<u8> = lengths.iter().map(|&(symbol, _)| symbol).collect();

        if reserved.is_some() {
            symbols.pop();
            if let Some(count) = counts.iter_mut().rev().find(|count| **count > 0) {
                *count -= 1;
            }
        }

        trace!(
            "built {:?} table {} for {} symbols, length counts {:?}",
            class,
            destination_id,
            symbols.len(),
            counts
        );

        Self::from_canonical(class, destination_id, &counts, &symbols)
    }

    /// Walks the tree one stuffed bit at a time until a leaf is reached.
    pub fn decode_symbol(&self, reader: &mut BitReader) -> Result<u8> {
        let mut node = &self.root;

        loop {
            match node {
                HuffmanNode::Leaf { symbol, .. } => return Ok(*symbol),
                HuffmanNode::Branch { left, right } => {
                    let bit = reader.read_bit()?.ok_or(Error::TruncatedEntropyData)?;
                    let next = if bit == 0 { left } else { right };
                    node = next.as_deref().ok_or(Error::InvalidHuffmanCode)?;
                }
            }
        }
    }

    /// Emits the code of `symbol` with byte stuffing.
    pub fn encode_symbol<W: Write + Seek>(
        &self,
        symbol: u8,
        writer: &mut BitWriter<W>,
    ) -> Result<()> {
        let (code, length) = self.code_of(symbol)?;
        writer.write_bits(code as u32, length, true)
    }

    pub fn code_of(&self, symbol: u8) -> Result<(u16, u8)> {
        self.root
            .find(symbol)
            .ok_or(Error::SymbolNotFound(self.class, symbol))
    }

    /// `(symbol, code, length)` for every leaf, ordered by length then code.
    pub fn codes(&self) -> Vec<(u8, u16, u8)> {
        let mut leaves = vec![];
        self.root.collect_leaves(&mut leaves);
        leaves.sort_by_key(|&(_, code, length)| (length, code));
        leaves
    }

    /// Serializes the table as a DHT body: 16 length counts then the symbols by length.
    pub fn export_canonical(&self) -> Vec<u8> {
        let codes = self.codes();

        let mut out = vec![0u8; MAX_CODE_LENGTH];
        for &(_, _, length) in &codes {
            out[length as usize - 1] += 1;
        }
        out.extend(codes.iter().map(|&(symbol, _, _)| symbol));

        out
    }

    pub fn class(&self) -> HuffmanClass {
        self.class
    }

    pub fn destination_id(&self) -> u8 {
        self.destination_id
    }
}

/// Folds code lengths above 16 back into range (ITU-T T.81 Annex K.3). `lengths` must be
/// sorted by length.
fn limit_code_lengths(lengths: &[(u8, u8)]) -> [u8; MAX_CODE_LENGTH] {
    let max_len = lengths.last().map_or(0, |&(_, l)| l as usize);
    let mut bits = vec![0usize; max_len.max(MAX_CODE_LENGTH) + 1];
    for &(_, length) in lengths {
        bits[length as usize] += 1;
    }

    let mut i = max_len;
    while i > MAX_CODE_LENGTH {
        while bits[i] > 0 {
            let mut j = i - 2;
            while bits[j] == 0 {
                j -= 1;
            }

            bits[i] -= 2;
            bits[i - 1] += 1;
            bits[j + 1] += 2;
            bits[j] -= 1;
        }
        i -= 1;
    }

    let mut counts = [0u8; MAX_CODE_LENGTH];
    for (idx, count) in counts.iter_mut().enumerate() {
        *count = bits[idx + 1] as u8;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;

    // ITU-T T.81 Table K.3
    const DC_LUMINANCE_COUNTS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
    const DC_LUMINANCE_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

    fn assert_prefix_free(codes: &[(u8, u16, u8)]) {
        for (i, &(_, a, a_len)) in codes.iter().enumerate() {
            for (j, &(_, b, b_len)) in codes.iter().enumerate() {
                if i != j && a_len <= b_len {
                    assert_ne!(b >> (b_len - a_len), a, "code {a:b} prefixes {b:b}");
                }
            }
        }
    }

    #[test]
    fn test_canonical_codes() -> Result<()> {
        let tree = HuffmanTree::from_canonical(
            HuffmanClass::DC,
            0,
            &DC_LUMINANCE_COUNTS,
            &DC_LUMINANCE_SYMBOLS,
        )?;

        assert_eq!(tree.code_of(0)?, (0b00, 2));
        assert_eq!(tree.code_of(1)?, (0b010, 3));
        assert_eq!(tree.code_of(5)?, (0b110, 3));
        assert_eq!(tree.code_of(6)?, (0b1110, 4));
        assert_eq!(tree.code_of(11)?, (0b1_1111_1110, 9));
        assert!(matches!(
            tree.code_of(12),
            Err(Error::SymbolNotFound(HuffmanClass::DC, 12))
        ));

        Ok(())
    }

    #[test]
    fn test_load_export_round_trip() -> Result<()> {
        let mut body = DC_LUMINANCE_COUNTS.to_vec();
        body.extend_from_slice(&DC_LUMINANCE_SYMBOLS);
        body.push(0xAA);

        let mut reader = BitReader::new(&body);
        let (tree, consumed) = HuffmanTree::load_table(&mut reader, HuffmanClass::DC, 1)?;
        assert_eq!(consumed, 28);
        assert_eq!(reader.tell(), 28);
        assert_eq!(tree.destination_id(), 1);

        let exported = tree.export_canonical();
        assert_eq!(exported, body[..28].to_vec());

        let mut reader = BitReader::new(&exported);
        let (reloaded, _) = HuffmanTree::load_table(&mut reader, HuffmanClass::DC, 1)?;
        assert_eq!(reloaded.export_canonical(), exported);

        Ok(())
    }

    #[test]
    fn test_overfull_table_is_rejected() {
        // three codes of length 1 cannot exist
        let mut counts = [0u8; 16];
        counts[0] = 3;

        let tree = HuffmanTree::from_canonical(HuffmanClass::AC, 0, &counts, &[1, 2, 3]);
        assert!(matches!(tree, Err(Error::MalformedHuffmanTable(_))));
    }

    #[test]
    fn test_too_many_codes_is_rejected() {
        let mut counts = [0u8; 16];
        counts[8] = 255;
        counts[9] = 1;

        let mut body = counts.to_vec();
        body.extend(std::iter::repeat(0).take(256));

        let mut reader = BitReader::new(&body);
        let tree = HuffmanTree::load_table(&mut reader, HuffmanClass::AC, 0);
        assert!(matches!(tree, Err(Error::MalformedHuffmanTable(_))));
    }

    #[test]
    fn test_frequency_tree_is_canonical_and_prefix_free() -> Result<()> {
        let mut freqs = [0u32; 256];
        for (symbol, freq) in [(1, 5), (2, 9), (3, 12), (4, 13), (5, 16), (6, 45)] {
            freqs[symbol] = freq;
        }

        let tree = HuffmanTree::from_frequencies(HuffmanClass::AC, 0, &freqs)?;
        let codes = tree.codes();
        assert_eq!(codes.len(), 6);
        assert_prefix_free(&codes);

        // the most frequent symbol gets the shortest code
        assert_eq!(tree.code_of(6)?.1, 1);

        // the exported DHT body reproduces the emitted codes exactly
        let exported = tree.export_canonical();
        let mut reader = BitReader::new(&exported);
        let (reloaded, _) = HuffmanTree::load_table(&mut reader, HuffmanClass::AC, 0)?;
        assert_eq!(reloaded.codes(), codes);

        Ok(())
    }

    #[test]
    fn test_single_symbol_gets_one_bit() -> Result<()> {
        let mut freqs = [0u32; 256];
        freqs[0x00] = 40;

        let tree = HuffmanTree::from_frequencies(HuffmanClass::AC, 1, &freqs)?;
        assert_eq!(tree.code_of(0x00)?, (0, 1));

        Ok(())
    }

    #[test]
    fn test_all_ones_code_is_never_assigned() -> Result<()> {
        let mut freqs = [0u32; 256];
        for (symbol, freq) in [(0, 7), (1, 7), (2, 7), (3, 7)] {
            freqs[symbol] = freq;
        }

        let tree = HuffmanTree::from_frequencies(HuffmanClass::DC, 0, &freqs)?;
        let codes = tree.codes();
        assert_eq!(codes.len(), 4);
        for &(_, code, length) in &codes {
            assert_ne!(code as u32, (1u32 << length) - 1, "all-ones code of length {length}");
        }

        Ok(())
    }

    #[test]
    fn test_lengths_are_limited_to_sixteen_bits() -> Result<()> {
        // fibonacci frequencies produce a maximally skewed tree
        let mut freqs = [0u32; 256];
        let (mut a, mut b) = (1u32, 1u32);
        for freq in freqs.iter_mut().take(24) {
            *freq = a;
            (a, b) = (b, a + b);
        }

        let tree = HuffmanTree::from_frequencies(HuffmanClass::AC, 0, &freqs)?;
        let codes = tree.codes();
        assert_eq!(codes.len(), 24);
        assert!(codes.iter().all(|&(_, _, length)| length as usize <= MAX_CODE_LENGTH));
        assert_prefix_free(&codes);

        Ok(())
    }

    #[test]
    fn test_symbol_stream_round_trip() -> Result<()> {
        let message: Vec<u8> = b"abracadabra, a stuffed 0xFF \xFF\xFF\xFF test"
            .iter()
            .copied()
            .collect();

        let mut freqs = [0u32; 256];
        for &symbol in &message {
            freqs[symbol as usize] += 1;
        }
        let tree = HuffmanTree::from_frequencies(HuffmanClass::AC, 0, &freqs)?;
        assert_prefix_free(&tree.codes());

        let mut writer = BitWriter::new(Cursor::new(vec![]));
        for &symbol in &message {
            tree.encode_symbol(symbol, &mut writer)?;
        }
        writer.flush()?;
        let bytes = writer.into_inner().into_inner();

        let mut reader = BitReader::new(&bytes);
        for &symbol in &message {
            assert_eq!(tree.decode_symbol(&mut reader)?, symbol);
        }

        Ok(())
    }

    #[test]
    fn test_decode_past_marker_is_truncation() -> Result<()> {
        let tree = HuffmanTree::from_canonical(
            HuffmanClass::DC,
            0,
            &DC_LUMINANCE_COUNTS,
            &DC_LUMINANCE_SYMBOLS,
        )?;

        let data = vec![0xFF, 0xD9];
        let mut reader = BitReader::new(&data);
        assert!(matches!(
            tree.decode_symbol(&mut reader),
            Err(Error::TruncatedEntropyData)
        ));

        Ok(())
    }

    #[test]
    fn test_min_heap() -> Result<()> {
        let mut min_heap = BinaryHeap::new();

        for i in (1..=36).rev() {
            min_heap.push(HeapItem::from(
                i,
                HuffmanNode::Leaf {
                    symbol: i as u8,
                    code: 0,
                    length: 0,
                },
            ))
        }

        let mut expected = 1;
        while let Some(HeapItem { freq, .. }) = min_heap.pop() {
            assert_eq!(expected, freq);
            expected += 1;
        }
        assert_eq!(expected, 37);

        Ok(())
    }
}
