//! Test doubles for the pipeline's external workers.

mod mock_fetcher;
mod mock_segmenter;

pub use mock_fetcher::{MockFetchFailure, MockFetcher, RecordedFetch};
pub use mock_segmenter::{MockSegmentFailure, MockSegmenter, RecordedSegmentation};
