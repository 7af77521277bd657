//! Multi-bitstring text splitting.
//!
//! Input text is a sequence of blocks. Each block starts with a marker line
//! `Bitstring <N>:` and continues with hex payload lines up to the next
//! marker or end of input. Whitespace inside a payload is not content.

use std::iter::{Enumerate, Peekable};
use std::str::Lines;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Bitstring\s+(\S*?)\s*:\s*$").expect("invalid bitstring marker regex")
});

/// Rule for declared block indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPolicy {
    /// Indices must be 1, 2, 3, ... with no gaps.
    #[default]
    Consecutive,
    /// Indices must be positive and strictly increasing; gaps are allowed.
    Increasing,
}

impl std::str::FromStr for IndexPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "consecutive" => Ok(IndexPolicy::Consecutive),
            "increasing" => Ok(IndexPolicy::Increasing),
            other => Err(Error::Config(format!("unknown index policy '{other}'"))),
        }
    }
}

/// One labeled block of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Index from the marker line.
    pub declared_index: u32,
    /// 1-based line number of the marker.
    pub line: usize,
    /// Hex payload with whitespace removed.
    pub payload: String,
}

/// Lazy iterator over the blocks of an input text.
///
/// The first structural error is yielded once, after which the iterator is
/// exhausted: block boundaries past a malformed marker cannot be trusted.
#[derive(Debug)]
pub struct BlockSplitter<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
    policy: IndexPolicy,
    last_index: Option<u32>,
    done: bool,
}

/// Splits `input` into blocks.
#[must_use]
pub fn split(input: &str, policy: IndexPolicy) -> BlockSplitter<'_> {
    BlockSplitter::new(input, policy)
}

impl<'a> BlockSplitter<'a> {
    /// Creates a splitter positioned at the start of `input`.
    #[must_use]
    pub fn new(input: &'a str, policy: IndexPolicy) -> Self {
        Self {
            lines: input.lines().enumerate().peekable(),
            policy,
            last_index: None,
            done: false,
        }
    }

    fn next_block(&mut self) -> Option<Result<Block>> {
        // Skip blank lines up to the next marker.
        let (line_no, marker) = loop {
            let (i, line) = self.lines.next()?;
            if line.trim().is_empty() {
                continue;
            }
            break (i + 1, line);
        };

        let Some(captures) = MARKER.captures(marker) else {
            return Some(Err(malformed(
                line_no,
                "expected a 'Bitstring <N>:' marker line",
            )));
        };
        let digits = &captures[1];
        let parsed = if digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse::<u32>().ok()
        } else {
            None
        };
        let declared_index = match parsed {
            Some(index) if index > 0 => index,
            _ => {
                return Some(Err(malformed(
                    line_no,
                    format!("invalid bitstring index '{}'", &captures[1]),
                )))
            }
        };
        if let Err(reason) = self.check_index(declared_index) {
            return Some(Err(malformed(line_no, reason)));
        }
        self.last_index = Some(declared_index);

        let mut payload = String::new();
        while let Some((_, line)) = self
            .lines
            .next_if(|(_, line)| !MARKER.is_match(line))
        {
            payload.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
        if payload.is_empty() {
            return Some(Err(malformed(
                line_no,
                format!("bitstring {declared_index} has no payload"),
            )));
        }

        Some(Ok(Block {
            declared_index,
            line: line_no,
            payload,
        }))
    }

    fn check_index(&self, index: u32) -> std::result::Result<(), String> {
        match (self.policy, self.last_index) {
            (IndexPolicy::Consecutive, None) if index != 1 => {
                Err(format!("first bitstring must be 1, found {index}"))
            }
            (IndexPolicy::Consecutive, Some(last)) if Some(index) != last.checked_add(1) => Err(
                format!("bitstring {index} does not follow {last} consecutively"),
            ),
            (IndexPolicy::Increasing, Some(last)) if index <= last => {
                Err(format!("bitstring {index} does not increase past {last}"))
            }
            _ => Ok(()),
        }
    }
}

impl Iterator for BlockSplitter<'_> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.next_block();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> Error {
    Error::MalformedBlock {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str, policy: IndexPolicy) -> Result<Vec<Block>> {
        split(input, policy).collect()
    }

    #[test]
    fn test_splits_blocks_and_strips_whitespace() {
        let input = "Bitstring 1:\n00ff\n  aa BB\n\nBitstring 2:\n0102\n\n";
        let blocks = collect(input, IndexPolicy::Consecutive).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].declared_index, 1);
        assert_eq!(blocks[0].payload, "00ffaaBB");
        assert_eq!(blocks[0].line, 1);
        assert_eq!(blocks[1].declared_index, 2);
        assert_eq!(blocks[1].payload, "0102");
        assert_eq!(blocks[1].line, 5);
    }

    #[test]
    fn test_empty_input_has_no_blocks() {
        assert!(collect("", IndexPolicy::Consecutive).unwrap().is_empty());
        assert!(collect("\n \n", IndexPolicy::Consecutive).unwrap().is_empty());
    }

    #[test]
    fn test_gap_rejected_when_consecutive() {
        let input = "Bitstring 1:\n00\nBitstring 3:\n00\n";
        let mut splitter = split(input, IndexPolicy::Consecutive);
        assert!(splitter.next().unwrap().is_ok());
        let err = splitter.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { line: 3, .. }));
        assert!(splitter.next().is_none());
    }

    #[test]
    fn test_gap_accepted_when_increasing() {
        let input = "Bitstring 1:\n00\nBitstring 3:\n00\n";
        let blocks = collect(input, IndexPolicy::Increasing).unwrap();
        let indices: Vec<u32> = blocks.iter().map(|b| b.declared_index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_repeated_index_rejected_under_both_policies() {
        let input = "Bitstring 2:\n00\nBitstring 2:\n00\n";
        assert!(collect(input, IndexPolicy::Increasing).is_err());
        assert!(collect(input, IndexPolicy::Consecutive).is_err());
    }

    #[test]
    fn test_marker_without_payload() {
        let input = "Bitstring 1:\n\nBitstring 2:\n00\n";
        let err = collect(input, IndexPolicy::Consecutive).unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { line: 1, .. }));

        let trailing = "Bitstring 1:\n00\nBitstring 2:\n";
        assert!(collect(trailing, IndexPolicy::Consecutive).is_err());
    }

    #[test]
    fn test_content_before_first_marker() {
        let err = collect("deadbeef\nBitstring 1:\n00\n", IndexPolicy::Consecutive).unwrap_err();
        assert!(matches!(err, Error::MalformedBlock { line: 1, .. }));
    }

    #[test]
    fn test_invalid_marker_index() {
        assert!(collect("Bitstring x:\n00\n", IndexPolicy::Increasing).is_err());
        assert!(collect("Bitstring 0:\n00\n", IndexPolicy::Increasing).is_err());
    }

    #[test]
    fn test_signed_marker_index_rejected() {
        for marker in ["Bitstring +1:", "Bitstring -1:", "Bitstring 1e0:"] {
            let err = collect(&format!("{marker}\n00\n"), IndexPolicy::Consecutive).unwrap_err();
            match err {
                Error::MalformedBlock { line, reason } => {
                    assert_eq!(line, 1);
                    assert!(reason.contains("invalid bitstring index"), "{reason}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_splitting_is_restartable() {
        let input = "Bitstring 1:\nab\n";
        let first = collect(input, IndexPolicy::Consecutive).unwrap();
        let second = collect(input, IndexPolicy::Consecutive).unwrap();
        assert_eq!(first, second);
    }
}
