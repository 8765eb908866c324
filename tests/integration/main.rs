//! Integration tests for the lamprey binary and pipeline.
//!
//! These tests drive the compiled `lamprey` executable end to end over small
//! synthetic BAM files, and exercise the pipeline nodes in-process where
//! thread-count sweeps need direct access to the sinks.

mod helpers;
mod test_demux_command;
mod test_duplex_command;
mod test_error_paths;
mod test_pair_command;
mod test_pipeline_concurrency;
mod test_polya_command;
