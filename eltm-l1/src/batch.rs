//! Batch decoding of multi-bitstring input.
//!
//! Blocks are decoded independently; a failure is scoped to its own
//! bitstring and reported alongside the successes. Results are always
//! returned in ascending declared index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eltm_core::{Dataset, ErrorKind};
use log::{info, warn};
use rayon::prelude::*;

use crate::splitter::{split, Block};
use crate::{DecoderConfig, Error, Result, TelemetryDecoder};

/// Result of decoding one block.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// Declared index of the block.
    pub index: u32,
    /// Line of the block's marker.
    pub line: usize,
    /// Decoded dataset or the error that rejected it.
    pub result: Result<Dataset>,
}

impl DecodeOutcome {
    /// Failure category, if decoding failed.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(Error::kind)
    }
}

/// Outcome of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-block outcomes in ascending declared index.
    pub outcomes: Vec<DecodeOutcome>,
    /// Structural error that stopped splitting, if any.
    pub split_error: Option<Error>,
    /// Whether the run stopped early on request.
    pub cancelled: bool,
}

impl BatchReport {
    /// Successfully decoded datasets.
    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &DecodeOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Number of successfully decoded bitstrings.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.datasets().count()
    }

    /// Number of failed bitstrings.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    /// True if every block decoded and the input split cleanly.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.split_error.is_none() && !self.cancelled && self.failed() == 0
    }

    /// Consumes the report, keeping only decoded datasets.
    #[must_use]
    pub fn into_datasets(self) -> Vec<Dataset> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .collect()
    }
}

/// Splits input text and decodes every block.
#[derive(Debug)]
pub struct BatchDecoder {
    decoder: TelemetryDecoder,
    config: DecoderConfig,
    cancel: Arc<AtomicBool>,
}

impl BatchDecoder {
    /// Creates a batch decoder.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configured layout is inconsistent.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        Ok(Self {
            decoder: TelemetryDecoder::from_config(&config)?,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops further blocks from starting once set.
    ///
    /// A block already being decoded always runs to completion.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Underlying single-record decoder.
    #[must_use]
    pub fn decoder(&self) -> &TelemetryDecoder {
        &self.decoder
    }

    /// Splits `input` and decodes its blocks.
    #[must_use]
    pub fn decode_text(&self, input: &str) -> BatchReport {
        let mut blocks = Vec::new();
        let mut split_error = None;
        for item in split(input, self.config.index_policy) {
            match item {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    warn!("stopped splitting input: {e}");
                    split_error = Some(e);
                }
            }
        }

        let mut outcomes: Vec<DecodeOutcome> = if self.config.parallel {
            blocks
                .par_iter()
                .filter_map(|block| self.decode_block(block))
                .collect()
        } else {
            blocks
                .iter()
                .filter_map(|block| self.decode_block(block))
                .collect()
        };
        outcomes.sort_by_key(|o| o.index);

        let cancelled = outcomes.len() < blocks.len();
        for failure in outcomes.iter().filter(|o| o.result.is_err()) {
            if let Err(e) = &failure.result {
                warn!("bitstring {} failed ({}): {e}", failure.index, e.kind());
            }
        }
        let report = BatchReport {
            outcomes,
            split_error,
            cancelled,
        };
        info!(
            "decoded {} of {} bitstrings ({} failed{})",
            report.succeeded(),
            blocks.len(),
            report.failed(),
            if cancelled { ", cancelled" } else { "" }
        );
        report
    }

    fn decode_block(&self, block: &Block) -> Option<DecodeOutcome> {
        if self.cancel.load(Ordering::Relaxed) {
            return None;
        }
        Some(DecodeOutcome {
            index: block.declared_index,
            line: block.line,
            result: self.decoder.decode(&block.payload, block.declared_index),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutVersion;

    fn zero_block(index: u32) -> String {
        let bytes = LayoutVersion::V2.layout().total_bytes();
        format!("Bitstring {index}:\n{}\n\n", "00".repeat(bytes))
    }

    #[test]
    fn test_failure_scoped_to_one_bitstring() {
        let input = format!("{}Bitstring 2:\n00zz\n\n{}", zero_block(1), zero_block(3));
        let config = DecoderConfig::new()
            .with_layout(LayoutVersion::V2)
            .with_index_policy(crate::IndexPolicy::Increasing);
        let report = BatchDecoder::new(config).unwrap().decode_text(&input);

        let indices: Vec<u32> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[1].error_kind(), Some(ErrorKind::InvalidHex));
        assert!(!report.is_complete());
    }

    #[test]
    fn test_split_error_keeps_earlier_blocks() {
        let input = format!("{}{}", zero_block(1), zero_block(5));
        let config = DecoderConfig::new().with_layout(LayoutVersion::V2);
        let report = BatchDecoder::new(config).unwrap().decode_text(&input);
        assert_eq!(report.succeeded(), 1);
        assert!(matches!(report.split_error, Some(Error::MalformedBlock { .. })));
    }

    #[test]
    fn test_cancelled_before_start() {
        let input = format!("{}{}", zero_block(1), zero_block(2));
        let batch = BatchDecoder::new(DecoderConfig::new().with_layout(LayoutVersion::V2)).unwrap();
        batch.cancel_handle().store(true, Ordering::Relaxed);
        let report = batch.decode_text(&input);
        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let input = format!("{}{}{}", zero_block(1), zero_block(2), zero_block(3));
        let config = DecoderConfig::new().with_layout(LayoutVersion::V2);
        let parallel = BatchDecoder::new(config.clone()).unwrap().decode_text(&input);
        let sequential = BatchDecoder::new(config.with_parallel(false))
            .unwrap()
            .decode_text(&input);
        assert!(parallel.is_complete());
        assert_eq!(parallel.into_datasets(), sequential.into_datasets());
    }
}
